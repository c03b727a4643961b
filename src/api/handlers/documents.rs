use crate::AppState;
use crate::api::error::ApiError;
use crate::services::locator::normalize_object_locator;
use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
pub struct DocumentQuery {
    /// Stable record id.
    pub id: Option<String>,
    /// Free-form object reference; normalized to the canonical locator.
    pub key: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentResponse {
    #[schema(value_type = Object)]
    pub document: Value,
}

/// Look up the processing record for an uploaded document.
///
/// A 404 is the expected answer while extraction is still running; pollers
/// treat it as "not ready yet", not as a failure.
#[utoipa::path(
    get,
    path = "/api/documents",
    params(DocumentQuery),
    responses(
        (status = 200, description = "Record found", body = DocumentResponse),
        (status = 400, description = "Neither id nor key supplied"),
        (status = 404, description = "Record not yet available"),
        (status = 500, description = "Record store misconfigured or unreachable")
    ),
    tag = "documents"
)]
pub async fn get_document(
    State(state): State<AppState>,
    Query(query): Query<DocumentQuery>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let Some(records) = state.records.as_ref() else {
        return Err(ApiError::Upstream(
            "Document store is not configured".to_string(),
        ));
    };

    let id = query.id.filter(|value| !value.is_empty());
    let key = query.key.filter(|value| !value.is_empty());

    let item = if let Some(id) = id {
        records.get_by_id(&id).await
    } else if let Some(key) = key {
        let locator = normalize_object_locator(&key, &state.config.s3_bucket);
        records.find_by_locator(&locator).await
    } else {
        return Err(ApiError::BadRequest(
            "id or key query parameter is required".to_string(),
        ));
    };

    let item = item.map_err(|err| {
        tracing::error!("Error retrieving document from the record store: {:?}", err);
        ApiError::Upstream("Failed to retrieve document".to_string())
    })?;

    match item {
        Some(document) => Ok(Json(DocumentResponse { document })),
        None => Err(ApiError::NotFound("Document not found".to_string())),
    }
}
