/*!
 * Storage Module
 * Media storage: CDN storage-zone uploads for streaming assets and
 * local-disk storage for small images served from /uploads.
 */
use std::path::PathBuf;
use thiserror::Error;

/// Storage client errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("CDN storage is not configured")]
    NotConfigured,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file name")]
    InvalidFileName,
}

/// CDN storage-zone configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct CdnConfig {
    pub endpoint: String,
    pub storage_zone: String,
    pub api_key: String,
    pub pull_zone: String,
}

impl CdnConfig {
    pub fn from_env() -> Option<Self> {
        let storage_zone = non_empty_env("CDN_STORAGE_ZONE")?;
        let api_key = non_empty_env("CDN_API_KEY")?;
        let pull_zone = non_empty_env("CDN_PULL_ZONE")?;

        Some(Self {
            endpoint: std::env::var("CDN_STORAGE_ENDPOINT")
                .unwrap_or_else(|_| "https://storage.bunnycdn.com".to_string()),
            storage_zone,
            api_key,
            pull_zone,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn cdn_is_configured() -> bool {
    CdnConfig::from_env().is_some()
}

/// Upload a blob to the CDN storage zone under `path` (e.g.
/// "categories/img.png") and return the public pull-zone URL.
pub async fn upload_to_cdn(path: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
    let config = CdnConfig::from_env().ok_or(StorageError::NotConfigured)?;

    let upload_url = format!(
        "{}/{}/{}",
        config.endpoint.trim_end_matches('/'),
        config.storage_zone,
        path
    );

    let client = reqwest::Client::new();
    let resp = client
        .put(&upload_url)
        .header("AccessKey", &config.api_key)
        .header("Content-Type", "application/octet-stream")
        .body(bytes)
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(StorageError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(format!("https://{}/{}", config.pull_zone, path))
}

/// Reject path traversal and separator characters in client-supplied names.
pub fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains('\0')
}

/// Write a blob under `uploads/<dir>/<filename>` and return the URL path
/// it will be served from.
pub async fn save_local(dir: &str, filename: &str, bytes: &[u8]) -> Result<String, StorageError> {
    if !is_safe_filename(filename) {
        return Err(StorageError::InvalidFileName);
    }

    let upload_path = PathBuf::from("uploads").join(dir);
    tokio::fs::create_dir_all(&upload_path).await?;
    tokio::fs::write(upload_path.join(filename), bytes).await?;

    Ok(format!("/uploads/{}/{}", dir, filename))
}

/// Delete a previously saved local file given its `/uploads/...` URL path.
/// Returns true when a file was actually removed.
pub async fn delete_local(url_path: &str) -> bool {
    let Some(relative) = url_path.strip_prefix("/uploads/") else {
        return false;
    };
    if relative.contains("..") || relative.contains('\\') {
        return false;
    }

    let file_path = PathBuf::from("uploads").join(relative);
    match tokio::fs::remove_file(&file_path).await {
        Ok(()) => true,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to delete file {}: {}", file_path.display(), e);
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_filename_rejects_traversal() {
        assert!(is_safe_filename("thumb-1.png"));
        assert!(!is_safe_filename("../etc/passwd"));
        assert!(!is_safe_filename("a/b.png"));
        assert!(!is_safe_filename("a\\b.png"));
        assert!(!is_safe_filename(""));
    }

    #[tokio::test]
    async fn test_delete_local_ignores_foreign_paths() {
        assert!(!delete_local("/etc/passwd").await);
        assert!(!delete_local("/uploads/../secret").await);
        assert!(!delete_local("/uploads/avatars/missing.png").await);
    }

    #[test]
    fn test_cdn_not_configured_without_env() {
        if std::env::var("CDN_STORAGE_ZONE").is_err() {
            assert!(!cdn_is_configured());
        }
    }
}
