//! S3 download collaborator.

use std::path::Path;

use aws_sdk_s3::Client;

use crate::error::{Error, Result};

/// Artifact format inferred from the object listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    Gguf,
    Safetensors,
    Unknown,
}

/// Split `s3://bucket/prefix` into bucket and prefix. The prefix may be empty.
pub fn parse_s3_uri(s3_uri: &str) -> Result<(String, String)> {
    let rest = s3_uri
        .strip_prefix("s3://")
        .ok_or_else(|| Error::Configuration(format!("invalid S3 URI: {s3_uri}")))?;
    let (bucket, prefix) = match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix),
        None => (rest, ""),
    };
    if bucket.is_empty() {
        return Err(Error::Configuration(format!("invalid S3 URI: {s3_uri}")));
    }
    Ok((bucket.to_string(), prefix.to_string()))
}

async fn client() -> Client {
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    Client::new(&sdk_config)
}

async fn list_keys(client: &Client, bucket: &str, prefix: &str) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut pages = client
        .list_objects_v2()
        .bucket(bucket)
        .prefix(prefix)
        .into_paginator()
        .send();

    while let Some(page) = pages.next().await {
        let page = page
            .map_err(|e| Error::Download(format!("failed to list s3://{bucket}/{prefix}: {e}")))?;
        for object in page.contents() {
            if let Some(key) = object.key() {
                if !key.ends_with('/') {
                    keys.push(key.to_string());
                }
            }
        }
    }
    Ok(keys)
}

/// Classify the artifact behind an S3 URI from a few listed keys. Any listing
/// failure degrades to `Unknown` rather than failing the caller.
pub async fn detect_model_type(s3_uri: &str) -> ModelType {
    let Ok((bucket, prefix)) = parse_s3_uri(s3_uri) else {
        return ModelType::Unknown;
    };
    let client = client().await;
    let Ok(keys) = list_keys(&client, &bucket, &prefix).await else {
        return ModelType::Unknown;
    };
    for key in &keys {
        if key.ends_with(".gguf") {
            return ModelType::Gguf;
        }
        if key.ends_with(".safetensors") {
            return ModelType::Safetensors;
        }
    }
    ModelType::Unknown
}

/// Download everything under an S3 URI into `dest_dir`.
///
/// A URI addressing a single object lands flat in the destination; listings
/// with multiple objects keep their layout relative to the prefix.
pub async fn download_s3(s3_uri: &str, dest_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| Error::Download(format!("cannot create {}: {e}", dest_dir.display())))?;

    let (bucket, prefix) = parse_s3_uri(s3_uri)?;
    let client = client().await;

    tracing::info!("downloading from S3: bucket={bucket}, prefix={prefix}");

    let keys = list_keys(&client, &bucket, &prefix).await?;
    if keys.is_empty() {
        return Err(Error::Download(format!("no files found in S3 URI: {s3_uri}")));
    }
    tracing::info!("found {} object(s) to download", keys.len());

    if keys.len() == 1 && keys[0] == prefix {
        let filename = prefix
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("model.gguf");
        fetch_object(&client, &bucket, &prefix, &dest_dir.join(filename)).await?;
    } else {
        for key in &keys {
            let rel = key
                .strip_prefix(prefix.as_str())
                .unwrap_or(key.as_str())
                .trim_start_matches('/');
            let target = dest_dir.join(rel);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::Download(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
            fetch_object(&client, &bucket, key, &target).await?;
        }
    }

    Ok(())
}

async fn fetch_object(client: &Client, bucket: &str, key: &str, target: &Path) -> Result<()> {
    tracing::info!("downloading s3://{bucket}/{key} to {}", target.display());

    let response = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| Error::Download(format!("failed to fetch s3://{bucket}/{key}: {e}")))?;

    let mut reader = response.body.into_async_read();
    let mut file = tokio::fs::File::create(target)
        .await
        .map_err(|e| Error::Download(format!("cannot create {}: {e}", target.display())))?;
    tokio::io::copy(&mut reader, &mut file)
        .await
        .map_err(|e| Error::Download(format!("failed writing {}: {e}", target.display())))?;
    Ok(())
}
