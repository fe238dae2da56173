//! # API REST
//!
//! REST API for the patient registry.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - Request body decoding (multipart, urlencoded, JSON)
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (status codes, JSON error bodies, CORS)
//!
//! Business rules live in `prs-core`; this crate only translates.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod form;
mod routes;

use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use prs_core::PatientService;
use std::path::Path;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::ApiError;
pub use routes::health::HealthResponse;
pub use routes::patients::{PatientPageResponse, PatientResponse};

/// Largest accepted request body. Leaves room for a 10 MB photo plus form fields.
pub const MAX_BODY_BYTES: usize = 12 * 1024 * 1024;

/// Application state for the REST API server
///
/// Shared by all request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub patients: PatientService,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::patients::list_patients,
        routes::patients::create_patient,
        routes::patients::show_patient,
        routes::patients::update_patient,
        routes::patients::delete_patient,
    ),
    components(schemas(
        HealthResponse,
        PatientPageResponse,
        PatientResponse,
        prs_core::Patient,
        prs_core::Address,
        prs_core::PatientPage,
        error::MessageResponse,
        error::ErrorResponse,
        error::ValidationErrorResponse,
    ))
)]
pub struct ApiDoc;

/// Build the application router with all patient routes, Swagger UI and the
/// standard layers.
pub fn router(patients: PatientService) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/patients",
            get(routes::patients::list_patients).post(routes::patients::create_patient),
        )
        .route(
            "/patients/:id",
            get(routes::patients::show_patient)
                .put(routes::patients::update_patient)
                .patch(routes::patients::update_patient)
                .delete(routes::patients::delete_patient),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { patients })
}

/// Serve stored photos from `dir` under `mount_path` (e.g. `/storage/photos`).
pub fn serve_photos(router: Router, mount_path: &str, dir: &Path) -> Router {
    tracing::info!("serving photos from {} at {}", dir.display(), mount_path);
    router.nest_service(mount_path, ServeDir::new(dir))
}
