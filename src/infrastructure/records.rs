use crate::config::AppConfig;
use crate::services::records::{DynamoRecordStore, RecordStore};
use aws_config::SdkConfig;
use std::sync::Arc;
use tracing::{info, warn};

pub fn setup_record_store(
    sdk_config: &SdkConfig,
    config: &AppConfig,
) -> Option<Arc<dyn RecordStore>> {
    let Some(table) = config.dynamo_table.clone() else {
        warn!("📭 DYNAMO_TABLE is not set; the documents route will report the store as unconfigured");
        return None;
    };

    info!("🗄️  Record store: DynamoDB table {}", table);

    let client =
        aws_sdk_dynamodb::Client::from_conf(aws_sdk_dynamodb::config::Builder::from(sdk_config).build());
    Some(Arc::new(DynamoRecordStore::new(client, table)))
}
