use crate::api::rate_limit::log_rate_limit_events;
use crate::config::Config;
use crate::services::chat_service::ChatService;
use crate::services::gateway::GatewayService;
use crate::services::health_service::HealthService;
use crate::services::notification_service::NotificationService;
use crate::services::rate_limit_service::RateLimitService;
use crate::services::store::UserDirectory;
use anyhow::Context;
use axum::body::Body;
use axum::http::Request;
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post, put},
};
use std::sync::Arc;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod chat;
pub mod gateway;
pub mod health;
pub mod internal;
pub mod middleware;
pub mod notifications;
pub mod rate_limit;
pub mod schemas;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Config,
    pub chat_service: ChatService,
    pub notification_service: NotificationService,
    pub gateway_service: GatewayService,
    pub rate_limit_service: RateLimitService,
    pub shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Clone, Debug)]
pub struct MgmtState {
    pub health_service: HealthService,
    pub notification_service: NotificationService,
    pub users: Arc<dyn UserDirectory>,
}

#[derive(Debug)]
pub struct ServiceContainer {
    pub chat_service: ChatService,
    pub notification_service: NotificationService,
    pub gateway_service: GatewayService,
    pub rate_limit_service: RateLimitService,
}

/// Configures and returns the public router: chat and notification REST plus the gateway upgrade.
///
/// # Errors
/// Returns an error if the rate limiter configuration cannot be constructed.
pub fn app_router(
    config: Config,
    services: ServiceContainer,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<Router> {
    let interval_ns = 1_000_000_000 / config.rate_limit.rate_limit_per_second.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_nanosecond(u64::from(interval_ns))
            .burst_size(config.rate_limit.rate_limit_burst.max(1))
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .context("Failed to build rate limiter config")?,
    );

    let state = AppState {
        config,
        chat_service: services.chat_service,
        notification_service: services.notification_service,
        gateway_service: services.gateway_service,
        rate_limit_service: services.rate_limit_service,
        shutdown_rx,
    };

    let chat_routes = Router::new()
        .route("/conversations", post(chat::create_conversation).get(chat::list_conversations))
        .route("/conversations/{id}", get(chat::get_conversation))
        .route("/conversations/{id}/messages", get(chat::list_messages))
        .route("/conversations/{id}/read", put(chat::mark_read))
        .route("/messages", post(chat::send_message))
        .route("/messages/{id}", delete(chat::delete_message))
        .route("/unread-count", get(chat::unread_count))
        .route("/search", get(chat::search));

    let notification_routes = Router::new()
        .route("/", get(notifications::list).delete(notifications::delete_all))
        .route("/unread-count", get(notifications::unread_count))
        .route("/read-all", patch(notifications::mark_all_read))
        .route("/{id}", get(notifications::get).delete(notifications::delete))
        .route("/{id}/read", put(notifications::mark_read));

    let api_routes = Router::new()
        .nest("/chat", chat_routes)
        .nest("/notifications", notification_routes)
        .route("/gateway", get(gateway::websocket_handler))
        .layer(GovernorLayer::new(governor_conf));

    Ok(Router::new()
        .nest("/v1", api_routes)
        .layer(from_fn_with_state(state.clone(), log_rate_limit_events))
        .layer(PropagateRequestIdLayer::new(axum::http::HeaderName::from_static("x-request-id")))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .map(|id| id.header_value().to_str().unwrap_or_default())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                        "user_id" = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = response.status();
                        tracing::Span::current().record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(
            axum::http::HeaderName::from_static("x-request-id"),
            middleware::MakeRequestUuidOrHeader,
        ))
        .with_state(state))
}

/// Health checks and the internal intake used by the other platform services. Bind it to a private port.
pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new()
        .route("/livez", get(health::livez))
        .route("/readyz", get(health::readyz))
        .route("/internal/events", post(internal::ingest_event))
        .route("/internal/users/{id}", put(internal::upsert_user))
        .with_state(state)
}
