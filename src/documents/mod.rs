//! Document storage for proof-of-visit pictures and agreement letters

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to write document: {0}")]
    WriteError(String),

    #[error("Failed to delete document: {0}")]
    DeleteError(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist `content` and return the path token identifying it
    async fn store(&self, content: &[u8], filename: &str) -> Result<String, DocumentError>;

    fn url_for(&self, path_token: &str) -> String;

    async fn delete(&self, path_token: &str) -> Result<(), DocumentError>;
}

/// Documents kept on the local filesystem and served from `base_url`
pub struct LocalDocumentStore {
    base_path: PathBuf,
    base_url: String,
}

impl LocalDocumentStore {
    pub async fn new(
        base_path: impl Into<PathBuf>,
        base_url: impl Into<String>,
    ) -> Result<Self, DocumentError> {
        let base_path = base_path.into();
        tokio::fs::create_dir_all(&base_path)
            .await
            .map_err(|e| DocumentError::WriteError(format!("{}: {}", base_path.display(), e)))?;

        Ok(Self {
            base_path,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

/// Keep only the final path component and a conservative character set.
pub fn sanitize_filename(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn store(&self, content: &[u8], filename: &str) -> Result<String, DocumentError> {
        let token = format!(
            "{}_{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            sanitize_filename(filename)
        );
        let path = self.base_path.join(&token);

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| DocumentError::WriteError(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(path = %path.display(), bytes = content.len(), "Document stored");
        Ok(token)
    }

    fn url_for(&self, path_token: &str) -> String {
        format!("{}/{}", self.base_url, path_token)
    }

    async fn delete(&self, path_token: &str) -> Result<(), DocumentError> {
        let path = self.base_path.join(sanitize_filename(path_token));
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| DocumentError::DeleteError(format!("{}: {}", path.display(), e)))
    }
}
