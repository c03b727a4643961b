use crate::config::AppConfig;
use crate::services::storage::S3ObjectStore;
use aws_config::SdkConfig;
use std::sync::Arc;
use tracing::info;

pub fn setup_storage(sdk_config: &SdkConfig, config: &AppConfig) -> Arc<S3ObjectStore> {
    info!(
        "☁️  S3 storage: bucket {} ({})",
        config.s3_bucket, config.aws_region
    );

    let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);
    if config.endpoint_url.is_some() {
        // Local stacks (MinIO/LocalStack) only answer path-style requests.
        builder = builder.force_path_style(true);
    }

    let client = aws_sdk_s3::Client::from_conf(builder.build());
    Arc::new(S3ObjectStore::new(client, config.s3_bucket.clone()))
}
