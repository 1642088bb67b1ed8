//! Appointment endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::api::types::{ApiContext, UserContext};
use crate::appointment::NewAppointment;
use crate::models::{Appointment, AppointmentFilter, AppointmentPatch};

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentQuery {
    pub q: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// `GET /api/appointments`: chronological, optionally filtered.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiQuery(query): ApiQuery<AppointmentQuery>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let filter = AppointmentFilter {
        query: query.q,
        start_date: query.start_date,
        end_date: query.end_date,
    };
    Ok(Json(ctx.core.appointments.search(user.user_id, &filter)?))
}

/// `POST /api/appointments`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiJson(req): ApiJson<NewAppointment>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    let appt = ctx.core.appointments.create(user.user_id, req)?;
    Ok((StatusCode::CREATED, Json(appt)))
}

/// `GET /api/appointments/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Appointment>, ApiError> {
    Ok(Json(ctx.core.appointments.get(user.user_id, id)?))
}

/// `PATCH /api/appointments/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<AppointmentPatch>,
) -> Result<Json<Appointment>, ApiError> {
    Ok(Json(ctx.core.appointments.update(user.user_id, id, patch)?))
}

/// `DELETE /api/appointments/:id`: referenced documents are kept.
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    ctx.core.appointments.delete(user.user_id, id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /api/appointments/:id/documents/:document_id`
pub async fn attach_document(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiPath((id, document_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<Appointment>, ApiError> {
    Ok(Json(
        ctx.core
            .appointments
            .attach_document(user.user_id, id, document_id)?,
    ))
}

/// `DELETE /api/appointments/:id/documents/:document_id`
pub async fn detach_document(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiPath((id, document_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<Appointment>, ApiError> {
    Ok(Json(
        ctx.core
            .appointments
            .detach_document(user.user_id, id, document_id)?,
    ))
}
