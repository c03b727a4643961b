pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;

use crate::config::AppConfig;
use crate::services::presign::PresignService;
use crate::services::records::RecordStore;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::upload_url::create_upload_url,
        api::handlers::documents::get_document,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::upload_url::UploadUrlRequest,
            api::handlers::upload_url::UploadUrlResponse,
            api::handlers::documents::DocumentResponse,
        )
    ),
    tags(
        (name = "uploads", description = "Upload credential endpoints"),
        (name = "documents", description = "Processing result endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<PresignService>,
    pub records: Option<Arc<dyn RecordStore>>,
    pub config: AppConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/api/upload-url",
            post(api::handlers::upload_url::create_upload_url),
        )
        .route(
            "/api/documents",
            get(api::handlers::documents::get_document),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
