use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::io::ReaderStream;

/// Progress sink invoked with (bytes sent, total bytes) as a transfer advances.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Moves one file to a presigned destination. Success is any 2xx status;
/// everything else, including transport failures, is a transfer failure.
#[async_trait]
pub trait ObjectTransfer: Send + Sync {
    async fn put_file(
        &self,
        upload_url: &str,
        path: &Path,
        content_type: &str,
        progress: ProgressFn,
    ) -> Result<()>;
}

pub struct HttpObjectTransfer {
    client: reqwest::Client,
}

impl HttpObjectTransfer {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpObjectTransfer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectTransfer for HttpObjectTransfer {
    async fn put_file(
        &self,
        upload_url: &str,
        path: &Path,
        content_type: &str,
        progress: ProgressFn,
    ) -> Result<()> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        let total = file.metadata().await?.len();

        let counter = Arc::new(AtomicU64::new(0));
        let stream = ReaderStream::new(file).inspect(move |chunk: &std::io::Result<Bytes>| {
            if let Ok(bytes) = chunk {
                let so_far = counter.fetch_add(bytes.len() as u64, Ordering::Relaxed)
                    + bytes.len() as u64;
                progress(so_far, total);
            }
        });

        let response = self
            .client
            .put(upload_url)
            .header(CONTENT_TYPE, content_type)
            // Presigned PUTs refuse chunked bodies without a length.
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await
            .context("network error during upload")?;

        if !response.status().is_success() {
            bail!("upload failed with status {}", response.status().as_u16());
        }
        Ok(())
    }
}
