pub mod records;
pub mod storage;

use crate::config::AppConfig;
use aws_config::SdkConfig;
use aws_sdk_s3::config::Region;

/// Load the shared AWS SDK configuration once at process start; both clients
/// are derived from it.
pub async fn load_aws_config(config: &AppConfig) -> SdkConfig {
    let mut loader = aws_config::from_env().region(Region::new(config.aws_region.clone()));
    if let Some(endpoint) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint.clone());
    }
    loader.load().await
}
