use crate::AppState;
use crate::api::error::ApiError;
use crate::services::presign::IssueError;
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadUrlRequest {
    #[serde(rename = "fileName", default)]
    pub file_name: Option<String>,
    #[serde(rename = "fileType", default)]
    pub file_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadUrlResponse {
    #[serde(rename = "uploadUrl")]
    pub upload_url: String,
    #[serde(rename = "fileUrl")]
    pub file_url: String,
    pub key: String,
}

/// Issue a single-use upload credential for one document.
#[utoipa::path(
    post,
    path = "/api/upload-url",
    request_body = UploadUrlRequest,
    responses(
        (status = 200, description = "Credential issued", body = UploadUrlResponse),
        (status = 400, description = "fileName or fileType missing"),
        (status = 500, description = "Credential issuer failure")
    ),
    tag = "uploads"
)]
pub async fn create_upload_url(
    State(state): State<AppState>,
    Json(body): Json<UploadUrlRequest>,
) -> Result<Json<UploadUrlResponse>, ApiError> {
    let file_name = body.file_name.unwrap_or_default();
    let file_type = body.file_type.unwrap_or_default();

    let credential = state
        .issuer
        .issue(&file_name, &file_type)
        .await
        .map_err(|err| match err {
            IssueError::Validation(message) => ApiError::BadRequest(message),
            IssueError::Upstream(source) => {
                tracing::error!("Error creating presigned upload URL: {:?}", source);
                ApiError::Upstream("Failed to create upload URL".to_string())
            }
        })?;

    Ok(Json(UploadUrlResponse {
        upload_url: credential.upload_url,
        file_url: credential.public_url,
        key: credential.key,
    }))
}
