use crate::config::AppConfig;
use crate::services::storage::ObjectStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IssueError {
    /// Bad caller input; fixed by the caller, never retried automatically.
    #[error("{0}")]
    Validation(String),

    /// The credential dependency is unreachable or rejected the request.
    /// Surfaced to the caller; retry policy belongs to the caller.
    #[error("failed to create upload credential: {0}")]
    Upstream(#[source] anyhow::Error),
}

/// A single-use, time-bounded write credential for one object.
///
/// Never persisted; the expiry baked into `upload_url` makes a stale value
/// useless anyway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCredential {
    /// Presigned PUT URL, valid only for a short window.
    pub upload_url: String,
    /// Where the object will be publicly readable once the PUT lands.
    pub public_url: String,
    /// Canonical storage key of the eventual object.
    pub key: String,
}

/// Issues upload credentials: sanitizes the caller-supplied name, picks a
/// collision-resistant key under `uploads/`, and asks the object store for a
/// presigned PUT scoped to exactly that key and content type.
pub struct PresignService {
    store: Arc<dyn ObjectStore>,
    config: AppConfig,
}

impl PresignService {
    pub fn new(store: Arc<dyn ObjectStore>, config: AppConfig) -> Self {
        Self { store, config }
    }

    pub async fn issue(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<UploadCredential, IssueError> {
        if file_name.trim().is_empty() || content_type.trim().is_empty() {
            return Err(IssueError::Validation(
                "fileName and fileType are required".to_string(),
            ));
        }

        let safe_name = sanitize_file_name(file_name);
        let key = format!("uploads/{}-{}", Utc::now().timestamp_millis(), safe_name);

        let upload_url = self
            .store
            .presign_put(
                &key,
                content_type,
                Duration::from_secs(self.config.presign_expiry_secs),
            )
            .await
            .map_err(IssueError::Upstream)?;

        Ok(UploadCredential {
            upload_url,
            public_url: self.config.public_object_url(&key),
            key,
        })
    }
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
