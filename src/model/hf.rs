//! Hugging Face Hub download collaborator.

use std::path::Path;

use hf_hub::api::tokio::ApiBuilder;

use crate::error::{Error, Result};

/// Download a model repo (or one file of it) into `dest_dir`.
///
/// Files land in the hub cache first and are copied into the destination so
/// the caller sees one self-contained directory.
pub async fn download_hf(
    repo_id: &str,
    dest_dir: &Path,
    token: Option<&str>,
    filename: Option<&str>,
) -> Result<()> {
    tracing::info!("downloading model from Hugging Face: {repo_id}");

    let api = ApiBuilder::new()
        .with_token(token.map(str::to_owned))
        .with_progress(false)
        .build()
        .map_err(|e| Error::Download(format!("failed to initialize Hugging Face client: {e}")))?;
    let repo = api.model(repo_id.to_string());

    let files: Vec<String> = match filename {
        Some(file) => vec![file.to_string()],
        None => {
            let info = repo
                .info()
                .await
                .map_err(|e| Error::Download(format!("failed to query repo {repo_id}: {e}")))?;
            info.siblings.into_iter().map(|s| s.rfilename).collect()
        }
    };

    if files.is_empty() {
        return Err(Error::Download(format!("repo {repo_id} lists no files")));
    }

    for file in &files {
        let cached = repo.get(file).await.map_err(|e| {
            Error::Download(format!("failed to download {file} from {repo_id}: {e}"))
        })?;

        let target = dest_dir.join(file);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Download(format!("cannot create {}: {e}", parent.display())))?;
        }
        tokio::fs::copy(&cached, &target)
            .await
            .map_err(|e| Error::Download(format!("cannot copy {file} into place: {e}")))?;
    }

    tracing::info!("downloaded {} file(s) from {repo_id}", files.len());
    Ok(())
}
