//! Mapping of service errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use prs_core::{PatientError, ValidationErrors};
use serde::Serialize;
use utoipa::ToSchema;

pub(crate) const PATIENT_NOT_FOUND: &str = "Patient not found";

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// `{"message": ...}` body used for acknowledgements and most errors.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `{"error": ...}` body returned by lookups of an unknown patient.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Body of a 422 response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ValidationErrorResponse {
    /// First error message, with a count of the remaining ones
    pub message: String,
    /// Messages keyed by field name
    #[schema(value_type = Object)]
    pub errors: ValidationErrors,
}

#[derive(Debug)]
pub enum ApiError {
    /// Request body could not be decoded.
    BadRequest(String),
    /// Unknown patient on a read, rendered as `{"error"}`.
    Missing,
    /// Any error from the patient service, rendered as `{"message"}`.
    Patient(PatientError),
}

impl ApiError {
    /// Like `From<PatientError>`, but a missing patient uses the lookup body.
    pub fn lookup(err: PatientError) -> Self {
        match err {
            PatientError::NotFound(_) => ApiError::Missing,
            other => ApiError::Patient(other),
        }
    }
}

impl From<PatientError> for ApiError {
    fn from(err: PatientError) -> Self {
        ApiError::Patient(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::BadRequest(message) => {
                return (StatusCode::BAD_REQUEST, Json(MessageResponse::new(message)))
                    .into_response();
            }
            ApiError::Missing => {
                let body = ErrorResponse {
                    error: PATIENT_NOT_FOUND.into(),
                };
                return (StatusCode::NOT_FOUND, Json(body)).into_response();
            }
            ApiError::Patient(err) => err,
        };

        match err {
            PatientError::Validation(errors) => {
                let body = ValidationErrorResponse {
                    message: errors.to_string(),
                    errors,
                };
                (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
            }
            PatientError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                Json(MessageResponse::new(PATIENT_NOT_FOUND)),
            )
                .into_response(),
            err @ PatientError::Persistence { .. } => {
                tracing::error!("Patient write error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(MessageResponse::new(err.to_string())),
                )
                    .into_response()
            }
            err => {
                tracing::error!("Patient service error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(MessageResponse::new("Internal server error")),
                )
                    .into_response()
            }
        }
    }
}
