//! Launch configuration, derived from the environment once at startup.

use std::path::PathBuf;

use config::{Config as ConfigLoader, ConfigError, Environment};
use serde::Deserialize;

/// Immutable launch configuration for the gateway and its worker.
///
/// Every field maps to one environment variable (`PORT`, `UPSTREAM_HOST`,
/// `LLAMA_CPP_ARGS`, ...). Empty strings in the optional fields are treated
/// as unset; use the accessor methods rather than reading them directly.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bind host for the public gateway.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port for the public gateway.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Loopback host the worker is reachable on.
    #[serde(default = "default_upstream_host")]
    pub upstream_host: String,
    /// Loopback port the worker binds to.
    #[serde(default = "default_upstream_port")]
    pub upstream_port: u16,
    /// Worker binary name, resolved through PATH at spawn time.
    #[serde(default = "default_server_binary")]
    pub server_binary: String,
    /// Extra llama-server arguments as one shell-style string. Appended after
    /// the fixed flags so they win under last-wins argument parsing.
    #[serde(default)]
    pub llama_cpp_args: String,
    /// Directory models are downloaded into and resolved from.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    /// Directory holding the llama.cpp conversion script.
    #[serde(default = "default_llamacpp_dir")]
    pub llamacpp_dir: PathBuf,
    /// Specific GGUF file to serve (relative to the model root).
    #[serde(default)]
    pub model_filename: Option<String>,
    /// Quantization type to apply after conversion (e.g. q4_k_m).
    #[serde(default)]
    pub quantization: Option<String>,
    /// Hugging Face repo to download (e.g. "arcee-ai/AFM-4.5B").
    #[serde(default)]
    pub hf_model_id: Option<String>,
    /// S3 URI to download (s3://bucket/prefix).
    #[serde(default)]
    pub hf_model_uri: Option<String>,
    /// Hugging Face token for gated/private repos.
    #[serde(default)]
    pub hf_token: Option<String>,
    /// Alternative token variable, checked when HF_TOKEN is unset.
    #[serde(default)]
    pub huggingface_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upstream_host: default_upstream_host(),
            upstream_port: default_upstream_port(),
            server_binary: default_server_binary(),
            llama_cpp_args: String::new(),
            models_dir: default_models_dir(),
            llamacpp_dir: default_llamacpp_dir(),
            model_filename: None,
            quantization: None,
            hf_model_id: None,
            hf_model_uri: None,
            hf_token: None,
            huggingface_token: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_upstream_host() -> String {
    "127.0.0.1".to_string()
}
fn default_upstream_port() -> u16 {
    8081
}
fn default_server_binary() -> String {
    "llama-server".to_string()
}
fn default_models_dir() -> PathBuf {
    PathBuf::from("/opt/models")
}
fn default_llamacpp_dir() -> PathBuf {
    PathBuf::from("/opt/llama.cpp")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(Environment::default().try_parsing(true))
            .build()?;
        config.try_deserialize()
    }

    /// Base URL of the worker, e.g. "http://127.0.0.1:8081".
    pub fn upstream_base(&self) -> String {
        format!("http://{}:{}", self.upstream_host, self.upstream_port)
    }

    pub fn model_filename(&self) -> Option<&str> {
        non_empty(&self.model_filename)
    }

    pub fn quantization(&self) -> Option<&str> {
        non_empty(&self.quantization)
    }

    pub fn hf_model_id(&self) -> Option<&str> {
        non_empty(&self.hf_model_id)
    }

    pub fn hf_model_uri(&self) -> Option<&str> {
        non_empty(&self.hf_model_uri)
    }

    pub fn hf_token(&self) -> Option<&str> {
        non_empty(&self.hf_token).or_else(|| non_empty(&self.huggingface_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.upstream_host, "127.0.0.1");
        assert_eq!(config.upstream_port, 8081);
        assert_eq!(config.server_binary, "llama-server");
        assert_eq!(config.models_dir, PathBuf::from("/opt/models"));
        assert!(config.llama_cpp_args.is_empty());
    }

    #[test]
    fn test_upstream_base() {
        let config = Config {
            upstream_host: "127.0.0.1".to_string(),
            upstream_port: 9090,
            ..Config::default()
        };
        assert_eq!(config.upstream_base(), "http://127.0.0.1:9090");
    }

    #[test]
    fn test_empty_strings_are_unset() {
        let config = Config {
            model_filename: Some("  ".to_string()),
            quantization: Some(String::new()),
            hf_model_id: Some("arcee-ai/AFM-4.5B".to_string()),
            ..Config::default()
        };
        assert_eq!(config.model_filename(), None);
        assert_eq!(config.quantization(), None);
        assert_eq!(config.hf_model_id(), Some("arcee-ai/AFM-4.5B"));
    }

    #[test]
    fn test_token_fallback() {
        let config = Config {
            huggingface_token: Some("tok2".to_string()),
            ..Config::default()
        };
        assert_eq!(config.hf_token(), Some("tok2"));

        let config = Config {
            hf_token: Some("tok1".to_string()),
            huggingface_token: Some("tok2".to_string()),
            ..Config::default()
        };
        assert_eq!(config.hf_token(), Some("tok1"));
    }
}
