use crate::models::document::ProcessingRecord;
use crate::services::poller::{FetchOutcome, RecordFetch};
use crate::services::presign::UploadCredential;
use crate::services::uploader::CredentialClient;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

/// Client for the intake API: credential issuing and document polling.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CredentialClient for ApiClient {
    async fn request_credential(
        &self,
        file_name: &str,
        content_type: &str,
    ) -> Result<UploadCredential> {
        let response = self
            .http
            .post(format!("{}/api/upload-url", self.base_url))
            .json(&serde_json::json!({
                "fileName": file_name,
                "fileType": content_type,
            }))
            .send()
            .await
            .context("failed to reach the upload service")?;

        let status = response.status();
        // A non-JSON error body is tolerated; the status alone decides.
        let payload: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("failed to obtain upload URL");
            bail!("{message}");
        }

        let field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Ok(UploadCredential {
            upload_url: field("uploadUrl"),
            public_url: field("fileUrl"),
            key: field("key"),
        })
    }
}

#[async_trait]
impl RecordFetch for ApiClient {
    async fn fetch_by_key(&self, key: &str) -> FetchOutcome {
        let response = match self
            .http
            .get(format!("{}/api/documents", self.base_url))
            .query(&[("key", key)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return FetchOutcome::Transport(format!("failed to reach the document store: {err}"));
            }
        };

        if response.status() == StatusCode::NOT_FOUND {
            return FetchOutcome::NotReady;
        }
        if !response.status().is_success() {
            return FetchOutcome::Transport("failed to fetch document metadata".to_string());
        }

        match response.json::<Value>().await {
            Ok(payload) => {
                let document = payload.get("document").cloned().unwrap_or(Value::Null);
                FetchOutcome::Found(ProcessingRecord::from_value(document))
            }
            Err(err) => FetchOutcome::Transport(format!("malformed document response: {err}")),
        }
    }
}
