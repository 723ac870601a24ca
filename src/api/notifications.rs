use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::notifications::{CountResponse, ListNotificationsQuery};
use crate::api::schemas::{ApiResponse, invalid_input};
use crate::error::Result;
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    response::IntoResponse,
};
use uuid::Uuid;

/// # Errors
/// Returns `AppError::BadRequest` for malformed query parameters.
pub async fn list(
    auth_user: AuthUser,
    State(state): State<AppState>,
    query: std::result::Result<Query<ListNotificationsQuery>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(query) = query.map_err(invalid_input)?;
    let listing =
        state.notification_service.list(auth_user.user_id, query.page, query.limit, query.unread_only).await?;
    Ok(Json(ApiResponse::paginated(listing.notifications, listing.pagination)))
}

/// # Errors
/// Returns `AppError::Database` if the store fails.
pub async fn unread_count(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let count = state.notification_service.unread_count(auth_user.user_id).await?;
    Ok(Json(ApiResponse::ok(CountResponse { count })))
}

/// # Errors
/// Returns `AppError::NotFound` if the notification is not the caller's.
pub async fn get(
    auth_user: AuthUser,
    State(state): State<AppState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse> {
    let Path(id) = path.map_err(invalid_input)?;
    let notification = state.notification_service.get(auth_user.user_id, id).await?;
    Ok(Json(ApiResponse::ok(notification)))
}

/// # Errors
/// Returns `AppError::NotFound` if the notification is not the caller's.
pub async fn mark_read(
    auth_user: AuthUser,
    State(state): State<AppState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse> {
    let Path(id) = path.map_err(invalid_input)?;
    let notification = state.notification_service.mark_read(auth_user.user_id, id).await?;
    Ok(Json(ApiResponse::ok(notification).with_message("Notification marked as read")))
}

/// # Errors
/// Returns `AppError::Database` if the store fails.
pub async fn mark_all_read(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let count = state.notification_service.mark_all_read(auth_user.user_id).await?;
    Ok(Json(ApiResponse::ok(CountResponse { count }).with_message("All notifications marked as read")))
}

/// # Errors
/// Returns `AppError::NotFound` if the notification is not the caller's.
pub async fn delete(
    auth_user: AuthUser,
    State(state): State<AppState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse> {
    let Path(id) = path.map_err(invalid_input)?;
    state.notification_service.delete(auth_user.user_id, id).await?;
    Ok(Json(ApiResponse::ok(serde_json::json!({ "id": id })).with_message("Notification deleted")))
}

/// # Errors
/// Returns `AppError::Database` if the store fails.
pub async fn delete_all(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let count = state.notification_service.delete_all(auth_user.user_id).await?;
    Ok(Json(ApiResponse::ok(CountResponse { count }).with_message("All notifications deleted")))
}
