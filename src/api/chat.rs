use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::chat::{
    CreateConversationRequest, DeletedMessageResponse, MarkReadResponse, PageQuery, SearchQuery, SendMessageRequest,
};
use crate::api::schemas::{ApiResponse, invalid_input};
use crate::domain::realtime::Origin;
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Returns the caller's conversation with `participantId`, creating it on first contact.
///
/// # Errors
/// Returns `AppError::BadRequest` for a missing or malformed id, or a conversation with oneself.
/// Returns `AppError::NotFound` if the other user does not exist.
pub async fn create_conversation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateConversationRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(payload) = payload.map_err(invalid_input)?;
    let participant_id = payload
        .participant_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::bad_request("Participant ID is required"))?;
    let participant_id =
        Uuid::parse_str(participant_id).map_err(|_| AppError::bad_request("Invalid participant ID"))?;

    let conversation = state.chat_service.find_or_create_conversation(auth_user.user_id, participant_id).await?;
    Ok(Json(ApiResponse::ok(conversation)))
}

/// # Errors
/// Returns `AppError::Database` if the store fails.
pub async fn list_conversations(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let conversations = state.chat_service.list_conversations(auth_user.user_id).await?;
    Ok(Json(ApiResponse::ok(conversations)))
}

/// # Errors
/// Returns `AppError::NotFound` if the conversation does not exist.
/// Returns `AppError::Forbidden` if the caller is not a participant.
pub async fn get_conversation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse> {
    let Path(conversation_id) = path.map_err(invalid_input)?;
    let conversation = state.chat_service.get_conversation(conversation_id, auth_user.user_id).await?;
    Ok(Json(ApiResponse::ok(conversation)))
}

/// A page of history. Everything addressed to the caller in the conversation becomes read.
///
/// # Errors
/// Returns `AppError::NotFound` if the conversation does not exist.
/// Returns `AppError::Forbidden` if the caller is not a participant.
pub async fn list_messages(
    auth_user: AuthUser,
    State(state): State<AppState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
    query: std::result::Result<Query<PageQuery>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Path(conversation_id) = path.map_err(invalid_input)?;
    let Query(query) = query.map_err(invalid_input)?;

    let listing =
        state.chat_service.list_messages(conversation_id, auth_user.user_id, query.page, query.limit).await?;
    Ok(Json(ApiResponse::paginated(listing.messages, listing.pagination)))
}

/// # Errors
/// Returns `AppError::NotFound` if the conversation does not exist.
/// Returns `AppError::Forbidden` if the caller is not a participant.
pub async fn mark_read(
    auth_user: AuthUser,
    State(state): State<AppState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse> {
    let Path(conversation_id) = path.map_err(invalid_input)?;
    let marked_read =
        state.chat_service.mark_conversation_read(conversation_id, auth_user.user_id, Origin::Rest).await?;

    Ok(Json(ApiResponse::ok(MarkReadResponse { conversation_id, marked_read }).with_message("Messages marked as read")))
}

/// Sends a message as the caller.
///
/// # Errors
/// Returns `AppError::BadRequest` if required fields are missing or the content is invalid.
/// Returns `AppError::NotFound` if the conversation does not exist.
/// Returns `AppError::Forbidden` if the caller or receiver is not a participant.
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    payload: std::result::Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(payload) = payload.map_err(invalid_input)?;
    let message = state.chat_service.send_message(payload.into_outgoing(auth_user.user_id), Origin::Rest).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(message))))
}

/// # Errors
/// Returns `AppError::NotFound` if the message does not exist.
/// Returns `AppError::Forbidden` if the caller did not send it.
pub async fn delete_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse> {
    let Path(message_id) = path.map_err(invalid_input)?;
    let deleted = state.chat_service.delete_message(message_id, auth_user.user_id, Origin::Rest).await?;

    let body = DeletedMessageResponse { message_id: deleted.id, conversation_id: deleted.conversation_id };
    Ok(Json(ApiResponse::ok(body).with_message("Message deleted")))
}

/// # Errors
/// Returns `AppError::Database` if the store fails.
pub async fn unread_count(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let summary = state.chat_service.unread_summary(auth_user.user_id).await?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// # Errors
/// Returns `AppError::BadRequest` if the query is blank.
pub async fn search(
    auth_user: AuthUser,
    State(state): State<AppState>,
    query: std::result::Result<Query<SearchQuery>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(query) = query.map_err(invalid_input)?;
    let hits = state.chat_service.search_messages(auth_user.user_id, &query.query, query.conversation_id).await?;
    Ok(Json(ApiResponse::ok(hits)))
}
