use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use medcode_backend::config::AppConfig;
use medcode_backend::models::document::ProcessingRecord;
use medcode_backend::services::normalize::normalize_entity_graph;
use medcode_backend::services::presign::PresignService;
use medcode_backend::services::records::RecordStore;
use medcode_backend::services::storage::ObjectStore;
use medcode_backend::{AppState, create_app};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

/// In-memory credential backend standing in for S3 presigning.
struct StubObjectStore {
    fail: bool,
}

#[async_trait]
impl ObjectStore for StubObjectStore {
    async fn presign_put(
        &self,
        key: &str,
        _content_type: &str,
        _expires_in: Duration,
    ) -> Result<String> {
        if self.fail {
            return Err(anyhow!("presigner unavailable"));
        }
        Ok(format!("https://uploads.test/{key}?signature=stub"))
    }
}

/// In-memory record store standing in for DynamoDB.
#[derive(Default)]
struct MemoryRecordStore {
    items: Mutex<Vec<Value>>,
}

impl MemoryRecordStore {
    fn insert(&self, item: Value) {
        self.items.lock().unwrap().push(item);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_by_id(&self, id: &str) -> Result<Option<Value>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|item| item["DocumentId"] == json!(id))
            .cloned())
    }

    async fn find_by_locator(&self, locator: &str) -> Result<Option<Value>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|item| {
                item["S3File"]
                    .as_str()
                    .is_some_and(|file| file.contains(locator))
            })
            .cloned())
    }
}

fn test_app(
    records: Option<Arc<dyn RecordStore>>,
    presign_fails: bool,
) -> axum::Router {
    let config = AppConfig::development();
    let store = Arc::new(StubObjectStore {
        fail: presign_fails,
    });
    let state = AppState {
        issuer: Arc::new(PresignService::new(store, config.clone())),
        records,
        config,
    };
    create_app(state)
}

async fn send_json(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn post_upload_url(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/upload-url")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app(None, false);
    let (status, json) = send_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_upload_url_issues_credential() {
    let app = test_app(None, false);
    let (status, json) = send_json(
        &app,
        post_upload_url(r#"{"fileName":"report.pdf","fileType":"application/pdf"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let upload_url = json["uploadUrl"].as_str().unwrap();
    assert!(!upload_url.is_empty());
    let key = json["key"].as_str().unwrap();
    assert!(key.starts_with("uploads/"));
    assert!(key.ends_with("-report.pdf"));
    assert!(json["fileUrl"].as_str().unwrap().ends_with(key));
}

#[tokio::test]
async fn test_upload_url_sanitizes_file_name() {
    let app = test_app(None, false);
    let (status, json) = send_json(
        &app,
        post_upload_url(r#"{"fileName":"visit report (final).pdf","fileType":"application/pdf"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(
        json["key"]
            .as_str()
            .unwrap()
            .ends_with("-visit_report__final_.pdf")
    );
}

#[tokio::test]
async fn test_upload_url_requires_both_fields() {
    let app = test_app(None, false);
    for body in [
        r#"{}"#,
        r#"{"fileName":"report.pdf"}"#,
        r#"{"fileType":"application/pdf"}"#,
        r#"{"fileName":"","fileType":"application/pdf"}"#,
    ] {
        let (status, json) = send_json(&app, post_upload_url(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(json["error"], "fileName and fileType are required");
    }
}

#[tokio::test]
async fn test_upload_url_issuer_failure_is_500() {
    let app = test_app(None, true);
    let (status, json) = send_json(
        &app,
        post_upload_url(r#"{"fileName":"report.pdf","fileType":"application/pdf"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Failed to create upload URL");
}

#[tokio::test]
async fn test_documents_requires_an_identifier() {
    let records = Arc::new(MemoryRecordStore::default());
    let app = test_app(Some(records), false);
    let (status, json) = send_json(&app, get("/api/documents")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "id or key query parameter is required");
}

#[tokio::test]
async fn test_documents_unconfigured_store_is_500() {
    let app = test_app(None, false);
    let (status, json) = send_json(&app, get("/api/documents?id=doc-1")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Document store is not configured");
}

#[tokio::test]
async fn test_documents_by_key_not_found_then_found() {
    let records = Arc::new(MemoryRecordStore::default());
    let app = test_app(Some(records.clone()), false);

    // Extraction has not produced a record yet: the expected polling 404.
    let (status, json) = send_json(&app, get("/api/documents?key=report.pdf")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Document not found");

    records.insert(json!({
        "DocumentId": "doc-1",
        "S3File": "s3://medcode-dev/report.pdf",
        "ComprehendMedicalResult": {
            "Entities": [
                {"Id": 0, "Text": "hypertension", "Category": "MEDICAL_CONDITION",
                 "Type": "DX_NAME", "Score": 0.93,
                 "ICD10CMConcepts": [{"Code": "I10", "Description": "Essential hypertension", "Score": 0.88}]}
            ]
        }
    }));

    let (status, json) = send_json(&app, get("/api/documents?key=report.pdf")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["document"]["DocumentId"], "doc-1");

    // The payload propagates into a non-empty normalized entity list.
    let record = ProcessingRecord::from_value(json["document"].clone());
    let graph = normalize_entity_graph(Some(&record));
    assert_eq!(graph.entities.len(), 1);
    assert_eq!(graph.entities[0].icd_concepts[0].code, "I10");
}

#[tokio::test]
async fn test_documents_key_is_normalized_before_lookup() {
    let records = Arc::new(MemoryRecordStore::default());
    records.insert(json!({
        "DocumentId": "doc-2",
        "S3File": "s3://medcode-dev/uploads/17-scan.png",
    }));
    let app = test_app(Some(records), false);

    // URL-encoded, slash-prefixed reference still resolves.
    let (status, json) =
        send_json(&app, get("/api/documents?key=%2Fuploads%2F17-scan.png")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["document"]["DocumentId"], "doc-2");
}

#[tokio::test]
async fn test_documents_by_id_takes_precedence() {
    let records = Arc::new(MemoryRecordStore::default());
    records.insert(json!({
        "DocumentId": "doc-3",
        "S3File": "s3://medcode-dev/uploads/18-note.pdf",
    }));
    let app = test_app(Some(records), false);

    let (status, json) = send_json(&app, get("/api/documents?id=doc-3&key=nonexistent")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["document"]["DocumentId"], "doc-3");

    let (status, _) = send_json(&app, get("/api/documents?id=missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
