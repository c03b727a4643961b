use crate::services::presign::UploadCredential;
use crate::services::transfer::{ObjectTransfer, ProgressFn};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

/// Obtains a write credential for one file, typically by calling the intake
/// API's upload-url endpoint.
#[async_trait]
pub trait CredentialClient: Send + Sync {
    async fn request_credential(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<UploadCredential>;
}

/// A file selected for upload, before any state is attached to it.
#[derive(Debug, Clone)]
pub struct FileSpec {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

impl FileSpec {
    /// Build a spec from a path on disk, inferring the content type from the
    /// extension (the portal accepts PDF, JPEG and PNG; anything else goes up
    /// as an opaque stream).
    pub async fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))?
            .to_string();
        let size = tokio::fs::metadata(path).await?.len();
        let mime_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("pdf") => mime::APPLICATION_PDF.to_string(),
            Some("jpg") | Some("jpeg") => mime::IMAGE_JPEG.to_string(),
            Some("png") => mime::IMAGE_PNG.to_string(),
            _ => mime::APPLICATION_OCTET_STREAM.to_string(),
        };
        Ok(Self {
            path: path.to_path_buf(),
            name,
            size,
            mime_type,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Requesting,
    Uploading,
    Uploaded,
    Error,
}

/// One file in a batch. Owned and mutated exclusively by the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct UploadItem {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub status: UploadStatus,
    /// 0-100; never regresses while uploading, pinned to 100 once uploaded.
    pub progress: u8,
    /// Set once a credential was successfully issued for this item.
    pub remote_key: Option<String>,
    /// Set once the transfer landed.
    pub public_url: Option<String>,
    /// Set only in the error state; cleared on retry.
    pub last_error: Option<String>,
    #[serde(skip)]
    path: PathBuf,
}

impl UploadItem {
    fn new(spec: FileSpec) -> Self {
        Self {
            name: spec.name,
            size: spec.size,
            mime_type: spec.mime_type,
            status: UploadStatus::Pending,
            progress: 0,
            remote_key: None,
            public_url: None,
            last_error: None,
            path: spec.path,
        }
    }
}

/// Snapshot of one uploaded object, in original selection order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub public_url: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadManifest {
    pub files: Vec<ManifestEntry>,
}

#[derive(Debug, Error)]
pub enum UploadBatchError {
    /// Every item in the batch errored; partial success is not an error.
    #[error("no files were uploaded successfully")]
    NoSuccessfulUploads,
}

/// Observable state changes, for progress rendering.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    Status { index: usize, status: UploadStatus },
    Progress { index: usize, progress: u8 },
}

/// Drives a batch of files through pending → requesting → uploading →
/// uploaded | error, isolating per-item failures and emitting the manifest of
/// everything that landed.
pub struct UploadCoordinator {
    credentials: Arc<dyn CredentialClient>,
    transfer: Arc<dyn ObjectTransfer>,
    items: Vec<UploadItem>,
    events: Option<mpsc::UnboundedSender<UploadEvent>>,
}

impl UploadCoordinator {
    pub fn new(credentials: Arc<dyn CredentialClient>, transfer: Arc<dyn ObjectTransfer>) -> Self {
        Self {
            credentials,
            transfer,
            items: Vec::new(),
            events: None,
        }
    }

    /// Start streaming state changes to the returned receiver.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<UploadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    /// Add files to the batch. A file whose name matches an existing item is
    /// silently dropped; first seen wins. Returns how many items were added.
    pub fn add_files(&mut self, specs: impl IntoIterator<Item = FileSpec>) -> usize {
        let mut added = 0;
        for spec in specs {
            if self.items.iter().any(|item| item.name == spec.name) {
                continue;
            }
            self.items.push(UploadItem::new(spec));
            added += 1;
        }
        added
    }

    pub fn remove(&mut self, index: usize) -> Option<UploadItem> {
        if index < self.items.len() {
            Some(self.items.remove(index))
        } else {
            None
        }
    }

    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    /// Mean progress across the batch, with uploaded items counting as 100
    /// regardless of their last reported byte progress.
    pub fn overall_progress(&self) -> u8 {
        if self.items.is_empty() {
            return 0;
        }
        let sum: u32 = self
            .items
            .iter()
            .map(|item| {
                if item.status == UploadStatus::Uploaded {
                    100u32
                } else {
                    u32::from(item.progress)
                }
            })
            .sum();
        ((sum as f64 / self.items.len() as f64).round()) as u8
    }

    /// Process every item not already uploaded, one at a time, and return the
    /// manifest of everything that reached `uploaded`, in selection order.
    ///
    /// Items in the error state are retried; already-uploaded items are never
    /// re-issued a credential or re-transferred. A failed item never aborts
    /// its siblings.
    pub async fn start_upload(&mut self) -> Result<UploadManifest, UploadBatchError> {
        for index in 0..self.items.len() {
            if self.items[index].status == UploadStatus::Uploaded {
                continue;
            }
            if let Err(err) = self.upload_item(index).await {
                warn!("upload failed for {}: {err:#}", self.items[index].name);
            }
        }

        let files: Vec<ManifestEntry> = self
            .items
            .iter()
            .filter(|item| item.status == UploadStatus::Uploaded)
            .map(|item| ManifestEntry {
                name: item.name.clone(),
                size: item.size,
                mime_type: item.mime_type.clone(),
                public_url: item.public_url.clone().unwrap_or_default(),
                key: item.remote_key.clone().unwrap_or_default(),
            })
            .collect();

        if files.is_empty() {
            return Err(UploadBatchError::NoSuccessfulUploads);
        }
        Ok(UploadManifest { files })
    }

    async fn upload_item(&mut self, index: usize) -> Result<()> {
        self.items[index].last_error = None;
        self.set_status(index, UploadStatus::Requesting);

        let (name, mime_type, path) = {
            let item = &self.items[index];
            (item.name.clone(), item.mime_type.clone(), item.path.clone())
        };

        let credential = match self.credentials.request_credential(&name, &mime_type).await {
            Ok(credential) => credential,
            Err(err) => {
                self.fail_item(index, &format!("{err:#}"));
                return Err(err);
            }
        };
        if credential.upload_url.is_empty() || credential.public_url.is_empty() {
            let message = "upload service returned an invalid response";
            self.fail_item(index, message);
            return Err(anyhow!(message));
        }

        self.items[index].remote_key = Some(credential.key.clone());
        self.set_status(index, UploadStatus::Uploading);

        // Byte progress arrives from inside the transfer; the cell keeps it
        // monotonic and the observer channel carries it out.
        let reported = Arc::new(AtomicU8::new(self.items[index].progress));
        let progress: ProgressFn = {
            let reported = reported.clone();
            let events = self.events.clone();
            Arc::new(move |sent, total| {
                let pct = if total == 0 {
                    100
                } else {
                    (sent.saturating_mul(100) / total).min(100) as u8
                };
                let previous = reported.fetch_max(pct, Ordering::SeqCst);
                if pct > previous {
                    if let Some(tx) = &events {
                        let _ = tx.send(UploadEvent::Progress {
                            index,
                            progress: pct,
                        });
                    }
                }
            })
        };

        match self
            .transfer
            .put_file(&credential.upload_url, &path, &mime_type, progress)
            .await
        {
            Ok(()) => {
                let item = &mut self.items[index];
                item.progress = 100;
                item.public_url = Some(credential.public_url);
                self.set_status(index, UploadStatus::Uploaded);
                self.emit(UploadEvent::Progress {
                    index,
                    progress: 100,
                });
                Ok(())
            }
            Err(err) => {
                self.fail_item(index, &format!("{err:#}"));
                Err(err)
            }
        }
    }

    fn fail_item(&mut self, index: usize, message: &str) {
        let item = &mut self.items[index];
        item.progress = 0;
        item.last_error = Some(message.to_string());
        self.set_status(index, UploadStatus::Error);
    }

    fn set_status(&mut self, index: usize, status: UploadStatus) {
        self.items[index].status = status;
        self.emit(UploadEvent::Status { index, status });
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
