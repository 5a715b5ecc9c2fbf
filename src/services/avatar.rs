//! Avatar uploads.
//!
//! DESIGN
//! ======
//! Uploads are checked (content type, size) before any bytes are written,
//! then the write is raced against the configured upload timeout. Storage is
//! behind [`AvatarStore`] so tests can substitute slow or failing stores.
//! The local implementation writes under `AVATAR_DIR`; the router serves that
//! directory at `/avatars`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use crate::config::UploadLimits;
use crate::frame::ErrorCode;

/// URL path prefix that the router mounts the avatar directory under.
pub const AVATAR_URL_PREFIX: &str = "/avatars";

const MAX_FILE_STEM_LEN: usize = 64;

/// A file received from the claim form.
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    #[error("avatar must be an image (got {0})")]
    UnsupportedType(String),
    #[error("avatar is empty")]
    Empty,
    #[error("avatar is {len} bytes, limit is {max}")]
    TooLarge { max: usize, len: usize },
    #[error("avatar upload timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("avatar url not owned by this store: {0}")]
    ForeignUrl(String),
    #[error("avatar storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorCode for AvatarError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedType(_) => "E_AVATAR_TYPE",
            Self::Empty => "E_AVATAR_EMPTY",
            Self::TooLarge { .. } => "E_AVATAR_TOO_LARGE",
            Self::Timeout(_) => "E_AVATAR_TIMEOUT",
            Self::ForeignUrl(_) => "E_AVATAR_URL",
            Self::Io(_) => "E_AVATAR_STORAGE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Io(_))
    }
}

/// Object storage for avatar images.
#[async_trait::async_trait]
pub trait AvatarStore: Send + Sync {
    /// Store `bytes` under `key` and return the public URL.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::Io`] if the write fails.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, AvatarError>;

    /// Remove a previously stored avatar by its public URL.
    ///
    /// # Errors
    ///
    /// Returns [`AvatarError::ForeignUrl`] for URLs this store did not issue.
    async fn delete(&self, url: &str) -> Result<(), AvatarError>;
}

// =============================================================================
// LOCAL STORE
// =============================================================================

/// Filesystem-backed store. Files are served back by `ServeDir`.
pub struct LocalAvatarStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalAvatarStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self { root: root.into(), url_prefix: format!("{}{AVATAR_URL_PREFIX}/", public_base_url.trim_end_matches('/')) }
    }

    fn key_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(&self.url_prefix)
            .filter(|key| !key.is_empty() && is_safe_key(key))
    }
}

#[async_trait::async_trait]
impl AvatarStore for LocalAvatarStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, AvatarError> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(key), bytes).await?;
        Ok(format!("{}{key}", self.url_prefix))
    }

    async fn delete(&self, url: &str) -> Result<(), AvatarError> {
        let Some(key) = self.key_from_url(url) else {
            return Err(AvatarError::ForeignUrl(url.to_owned()));
        };
        match tokio::fs::remove_file(self.root.join(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// UPLOAD
// =============================================================================

/// Validate and store an avatar, returning its public URL.
///
/// # Errors
///
/// Returns [`AvatarError`] if the upload is not an image, is empty or too
/// large, the store fails, or the write outlives `limits.timeout`.
pub async fn upload_avatar(
    store: &dyn AvatarStore,
    upload: AvatarUpload,
    limits: UploadLimits,
) -> Result<String, AvatarError> {
    let content_type = upload.content_type.as_deref().unwrap_or("");
    if !content_type.starts_with("image/") {
        return Err(AvatarError::UnsupportedType(if content_type.is_empty() {
            "unknown".to_owned()
        } else {
            content_type.to_owned()
        }));
    }
    if upload.bytes.is_empty() {
        return Err(AvatarError::Empty);
    }
    if upload.bytes.len() > limits.max_bytes {
        return Err(AvatarError::TooLarge { max: limits.max_bytes, len: upload.bytes.len() });
    }

    let key = object_key(&upload.file_name);
    let len = upload.bytes.len();
    let url = tokio::time::timeout(limits.timeout, store.put(&key, upload.bytes))
        .await
        .map_err(|_| AvatarError::Timeout(limits.timeout))??;

    info!(%key, bytes = len, "avatar stored");
    Ok(url)
}

/// Unique object key: `<uuid>-<sanitized file name>`.
#[must_use]
pub fn object_key(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let mut clean: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .take(MAX_FILE_STEM_LEN)
        .collect();
    if clean.trim_matches('.').is_empty() {
        clean = "avatar".to_owned();
    }
    format!("{}-{clean}", Uuid::new_v4())
}

fn is_safe_key(key: &str) -> bool {
    !key.contains("..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

#[cfg(test)]
#[path = "avatar_test.rs"]
mod tests;
