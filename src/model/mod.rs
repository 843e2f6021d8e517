//! Model artifact preparation.
//!
//! Resolves a ready-to-load GGUF file from configuration, downloading from
//! Hugging Face or S3 and shelling out to the llama.cpp conversion and
//! quantization tools when needed. Everything here is a sequence of blocking
//! steps that either yields a path or fails fatally before the gateway
//! accepts traffic.

pub mod hf;
pub mod s3;

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::config::Config;
use crate::error::{Error, Result};

/// Resolve a usable model path, downloading and converting as required.
///
/// A previously prepared model under `{models_dir}/current` is reused;
/// otherwise the configured source is fetched into `{models_dir}/download`
/// and renamed into place once complete, so a partial download never
/// masquerades as a prepared model.
pub async fn prepare_model_and_get_path(config: &Config) -> Result<PathBuf> {
    tokio::fs::create_dir_all(&config.models_dir)
        .await
        .map_err(|e| {
            Error::Configuration(format!(
                "cannot create models dir {}: {e}",
                config.models_dir.display()
            ))
        })?;

    let model_root = config.models_dir.join("current");
    if !model_root.exists() {
        let tmp_root = config.models_dir.join("download");
        if tmp_root.exists() {
            let _ = tokio::fs::remove_dir_all(&tmp_root).await;
        }
        tokio::fs::create_dir_all(&tmp_root)
            .await
            .map_err(|e| Error::Configuration(format!("cannot create download dir: {e}")))?;

        if let Some(repo_id) = config.hf_model_id() {
            hf::download_hf(repo_id, &tmp_root, config.hf_token(), config.model_filename()).await?;
        } else if let Some(uri) = config.hf_model_uri() {
            match s3::detect_model_type(uri).await {
                s3::ModelType::Gguf if config.model_filename().is_none() => {
                    return Err(Error::Configuration(
                        "MODEL_FILENAME is required for GGUF downloads from S3".to_string(),
                    ));
                }
                s3::ModelType::Unknown if config.model_filename().is_none() => {
                    tracing::warn!(
                        "could not detect model type from S3 URI, assuming safetensors format"
                    );
                }
                _ => {}
            }
            s3::download_s3(uri, &tmp_root).await?;
        } else {
            return Err(Error::Configuration(
                "either HF_MODEL_ID or HF_MODEL_URI must be provided".to_string(),
            ));
        }

        tokio::fs::rename(&tmp_root, &model_root)
            .await
            .map_err(|e| Error::Configuration(format!("cannot move download into place: {e}")))?;
    }

    if let Some(filename) = config.model_filename() {
        let gguf_path = model_root.join(filename);
        if gguf_path.exists() && has_gguf_extension(&gguf_path) {
            return Ok(gguf_path);
        }
        return Err(Error::Configuration(format!(
            "specified MODEL_FILENAME {filename} not found or not a GGUF file"
        )));
    }

    if looks_like_hf_repo(&model_root) {
        let f16_path = convert_hf_to_gguf(&config.llamacpp_dir, &model_root, &model_root).await?;
        if let Some(qtype) = config.quantization() {
            return quantize_gguf(&f16_path, qtype).await;
        }
        return Ok(f16_path);
    }

    Err(Error::Configuration(
        "no usable model found; set MODEL_FILENAME for GGUF files or provide a \
         Hugging Face safetensors model"
            .to_string(),
    ))
}

fn has_gguf_extension(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("gguf"))
}

/// True when the directory contains Hugging Face model files.
fn looks_like_hf_repo(dir: &Path) -> bool {
    if dir.join("config.json").exists() {
        return true;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        entry
            .path()
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("safetensors"))
    })
}

/// Convert a Hugging Face safetensors model to an f16 GGUF file.
async fn convert_hf_to_gguf(
    llamacpp_dir: &Path,
    source_dir: &Path,
    out_dir: &Path,
) -> Result<PathBuf> {
    let script = llamacpp_dir.join("convert_hf_to_gguf.py");
    if !script.exists() {
        return Err(Error::Configuration(format!(
            "convert_hf_to_gguf.py not found in {}",
            llamacpp_dir.display()
        )));
    }

    let outfile = out_dir.join("model-f16.gguf");
    tracing::info!(
        "converting {} to GGUF with {}",
        source_dir.display(),
        script.display()
    );

    let status = Command::new("python3")
        .arg(&script)
        .args(["--outtype", "f16", "--outfile"])
        .arg(&outfile)
        .arg(source_dir)
        .status()
        .await
        .map_err(|e| Error::Preparation(format!("failed to run conversion script: {e}")))?;

    if !status.success() {
        return Err(Error::Preparation(format!(
            "model conversion exited with {status}"
        )));
    }
    Ok(outfile)
}

/// Quantize a GGUF file to the given type, e.g. q4_k_m.
async fn quantize_gguf(src_path: &Path, qtype: &str) -> Result<PathBuf> {
    let quant_bin = which::which("llama-quantize")
        .map_err(|_| Error::Configuration("llama-quantize binary not found".to_string()))?;

    let stem = src_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model");
    let out_path = src_path.with_file_name(format!("{stem}.{qtype}.gguf"));

    tracing::info!("quantizing {} to {qtype}", src_path.display());

    let status = Command::new(&quant_bin)
        .arg(src_path)
        .arg(&out_path)
        .arg(qtype)
        .status()
        .await
        .map_err(|e| Error::Preparation(format!("failed to run llama-quantize: {e}")))?;

    if !status.success() {
        return Err(Error::Preparation(format!(
            "quantization exited with {status}"
        )));
    }
    Ok(out_path)
}
