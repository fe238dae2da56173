//! Patient CRUD endpoints.

use axum::{
    extract::{FromRequest, Path, Query, Request, State},
    http::StatusCode,
    Json,
};
use prs_core::{Patient, PatientError, PatientPage};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{
    ApiError, ErrorResponse, MessageResponse, Result, ValidationErrorResponse,
};
use crate::form::PatientForm;
use crate::AppState;

/// Query string of the listing endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Substring of the full name, CPF or CNS
    search: Option<String>,
    /// 1-based page number; invalid values mean the first page
    #[param(value_type = Option<u32>, minimum = 1, default = 1)]
    page: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PatientPageResponse {
    pub data: PatientPage,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PatientResponse {
    pub data: Patient,
}

/// Ids that are not integers cannot name a patient.
fn parse_id(raw: &str) -> Result<i64, PatientError> {
    raw.trim().parse().map_err(|_| PatientError::NotFound(0))
}

#[utoipa::path(
    get,
    path = "/patients",
    params(SearchParams),
    responses(
        (status = 200, description = "One page of patients ordered by name", body = PatientPageResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    )
)]
/// List or search patients, ten per page.
#[axum::debug_handler]
pub async fn list_patients(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<PatientPageResponse>> {
    let page = params
        .page
        .as_deref()
        .and_then(|p| p.trim().parse::<u32>().ok())
        .unwrap_or(1);
    let data = state
        .patients
        .search(params.search.as_deref(), page)
        .await?;
    Ok(Json(PatientPageResponse { data }))
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body(description = "Patient fields as multipart/form-data (needed for `photo`), \
        urlencoded form or JSON. Address fields are prefixed with `address_`."),
    responses(
        (status = 201, description = "Patient created", body = PatientResponse),
        (status = 400, description = "Malformed request body", body = MessageResponse),
        (status = 422, description = "Validation failed", body = ValidationErrorResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    )
)]
/// Create a patient together with a new address and optional photo.
#[axum::debug_handler]
pub async fn create_patient(
    State(state): State<AppState>,
    form: PatientForm,
) -> Result<(StatusCode, Json<PatientResponse>)> {
    let data = state.patients.create(form.into_create_input()).await?;
    Ok((StatusCode::CREATED, Json(PatientResponse { data })))
}

#[utoipa::path(
    get,
    path = "/patients/{id}",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient with its address", body = PatientResponse),
        (status = 404, description = "Patient not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    )
)]
/// Fetch one patient.
#[axum::debug_handler]
pub async fn show_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PatientResponse>> {
    let id = parse_id(&id).map_err(ApiError::lookup)?;
    let data = state.patients.show(id).await.map_err(ApiError::lookup)?;
    Ok(Json(PatientResponse { data }))
}

#[utoipa::path(
    put,
    path = "/patients/{id}",
    params(("id" = i64, Path, description = "Patient id")),
    request_body(description = "Patient fields as multipart/form-data (needed for `photo`), \
        urlencoded form or JSON. Address fields are flat (`postal_code`, `street`, ...)."),
    responses(
        (status = 200, description = "Patient updated", body = MessageResponse),
        (status = 400, description = "Malformed request body", body = MessageResponse),
        (status = 404, description = "Patient not found", body = MessageResponse),
        (status = 422, description = "Validation failed", body = ValidationErrorResponse),
        (status = 500, description = "Update failed and was rolled back", body = MessageResponse)
    )
)]
/// Replace a patient's fields. Also routed for `PATCH`.
///
/// The body is only read once the patient is known to exist.
#[axum::debug_handler]
pub async fn update_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Json<MessageResponse>> {
    let id = parse_id(&id)?;
    if !state.patients.exists(id).await? {
        return Err(PatientError::NotFound(id).into());
    }

    let form = PatientForm::from_request(request, &state).await?;
    state.patients.update(id, form.into_update_input()).await?;
    Ok(Json(MessageResponse::new("Patient updated successfully")))
}

#[utoipa::path(
    delete,
    path = "/patients/{id}",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient deleted", body = MessageResponse),
        (status = 404, description = "Patient not found", body = MessageResponse),
        (status = 500, description = "Delete failed and was rolled back", body = MessageResponse)
    )
)]
/// Delete a patient. Its address and photo are kept.
#[axum::debug_handler]
pub async fn delete_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    let id = parse_id(&id)?;
    state.patients.delete(id).await?;
    Ok(Json(MessageResponse::new("Patient deleted successfully")))
}
