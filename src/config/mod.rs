use std::env;

/// Runtime configuration for the intake service and client pipeline.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// AWS region for both the upload bucket and the result table (default: "us-east-1")
    pub aws_region: String,

    /// S3 bucket receiving direct document uploads
    pub s3_bucket: String,

    /// DynamoDB table holding processing results; None disables the documents route
    pub dynamo_table: Option<String>,

    /// Endpoint override for local stacks (MinIO / LocalStack)
    pub endpoint_url: Option<String>,

    /// Lifetime of a presigned upload URL in seconds (default: 60)
    pub presign_expiry_secs: u64,

    /// Delay before the first poll attempt, in milliseconds (default: 1500)
    pub poll_initial_delay_ms: u64,

    /// Retry delay after a "not found" poll response, in milliseconds (default: 5000)
    pub poll_not_found_delay_ms: u64,

    /// Retry delay after a transport/server failure while polling, in milliseconds (default: 7000)
    pub poll_error_delay_ms: u64,

    /// HTTP listen port (default: 5000)
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            aws_region: "us-east-1".to_string(),
            s3_bucket: String::new(),
            dynamo_table: None,
            endpoint_url: None,
            presign_expiry_secs: 60,
            poll_initial_delay_ms: 1500,
            poll_not_found_delay_ms: 5000,
            poll_error_delay_ms: 7000,
            port: 5000,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            aws_region: env::var("AWS_REGION").unwrap_or(default.aws_region),

            s3_bucket: env::var("S3_BUCKET").unwrap_or(default.s3_bucket),

            dynamo_table: env::var("DYNAMO_TABLE").ok().filter(|v| !v.is_empty()),

            endpoint_url: env::var("AWS_ENDPOINT_URL").ok().filter(|v| !v.is_empty()),

            presign_expiry_secs: env::var("PRESIGN_EXPIRY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.presign_expiry_secs),

            poll_initial_delay_ms: env::var("POLL_INITIAL_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.poll_initial_delay_ms),

            poll_not_found_delay_ms: env::var("POLL_NOT_FOUND_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.poll_not_found_delay_ms),

            poll_error_delay_ms: env::var("POLL_ERROR_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.poll_error_delay_ms),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),
        }
    }

    /// Create config for development and tests (local bucket/table names, no AWS account needed)
    pub fn development() -> Self {
        Self {
            aws_region: "us-east-1".to_string(),
            s3_bucket: "medcode-dev".to_string(),
            dynamo_table: Some("medcode-documents".to_string()),
            endpoint_url: None,
            presign_expiry_secs: 60,
            poll_initial_delay_ms: 1500,
            poll_not_found_delay_ms: 5000,
            poll_error_delay_ms: 7000,
            port: 5000,
        }
    }

    /// Public read locator for an uploaded object, derived from bucket, region and key.
    ///
    /// With an endpoint override the path-style form is used so local stacks resolve it.
    pub fn public_object_url(&self, key: &str) -> String {
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.s3_bucket, key),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.s3_bucket, self.aws_region, key
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.presign_expiry_secs, 60);
        assert_eq!(config.poll_not_found_delay_ms, 5000);
        assert_eq!(config.poll_error_delay_ms, 7000);
        assert_eq!(config.port, 5000);
        assert!(config.dynamo_table.is_none());
    }

    #[test]
    fn test_public_object_url() {
        let config = AppConfig::development();
        assert_eq!(
            config.public_object_url("uploads/1-report.pdf"),
            "https://medcode-dev.s3.us-east-1.amazonaws.com/uploads/1-report.pdf"
        );
    }

    #[test]
    fn test_public_object_url_with_endpoint_override() {
        let config = AppConfig {
            endpoint_url: Some("http://127.0.0.1:9000/".to_string()),
            ..AppConfig::development()
        };
        assert_eq!(
            config.public_object_url("uploads/1-report.pdf"),
            "http://127.0.0.1:9000/medcode-dev/uploads/1-report.pdf"
        );
    }
}
