use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use std::time::Duration;

/// Write access to the upload bucket. The service never moves bytes itself;
/// it only mints single-use write credentials consumed directly by clients.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Presign a PUT for `key` with the given content type. The returned URL
    /// authorizes exactly one object and expires after `expires_in`.
    async fn presign_put(&self, key: &str, content_type: &str, expires_in: Duration)
    -> Result<String>;
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(PresigningConfig::expires_in(expires_in)?)
            .await?;
        Ok(presigned.uri().to_string())
    }
}
