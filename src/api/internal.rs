use crate::api::MgmtState;
use crate::api::schemas::internal::UpsertUserRequest;
use crate::api::schemas::{ApiResponse, invalid_input};
use crate::domain::platform::PlatformEvent;
use crate::error::Result;
use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Intake for booking, review and account events raised by the other platform services.
///
/// # Errors
/// Returns `AppError::BadRequest` if the body is not a known platform event.
pub async fn ingest_event(
    State(state): State<MgmtState>,
    payload: std::result::Result<Json<PlatformEvent>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(event) = payload.map_err(invalid_input)?;
    let notification = state.notification_service.handle_platform_event(&event).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(notification))))
}

/// Upserts the display profile of a user.
///
/// # Errors
/// Returns `AppError::BadRequest` if the id or body is malformed.
pub async fn upsert_user(
    State(state): State<MgmtState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
    payload: std::result::Result<Json<UpsertUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Path(user_id) = path.map_err(invalid_input)?;
    let Json(payload) = payload.map_err(invalid_input)?;

    state.users.upsert_user(payload.into_profile(user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
