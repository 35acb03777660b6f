//! Admin surface: ban/unban/list/port/rate-limit/health over a small axum
//! router, talking to the firewall executor exclusively.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use security_common::model::BanAction;
use security_firewall::Executor;

#[derive(Clone)]
pub struct AdminState {
    pub executor: Arc<Executor>,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/bans", get(list_banned))
        .route("/bans/:address", post(ban).delete(unban))
        .route("/ports/open", post(open_port))
        .route("/ports/close", post(close_port))
        .route("/ports/block", post(block_port))
        .route("/rate-limit", post(add_rate_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct BanRequest {
    reason: String,
    #[serde(default)]
    permanent: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

async fn ban(
    State(state): State<AdminState>,
    Path(address): Path<String>,
    Json(body): Json<BanRequest>,
) -> impl IntoResponse {
    let action = if body.permanent { BanAction::Permanent } else { BanAction::Temporary };
    match state.executor.enforce(&address, action, &body.reason, None).await {
        Ok(outcome) => Json(serde_json::json!({ "outcome": format!("{outcome:?}") })).into_response(),
        Err(err) => (
            axum::http::StatusCode::BAD_REQUEST,
            Json(ErrorBody { error: err.to_string() }),
        )
            .into_response(),
    }
}

async fn unban(State(state): State<AdminState>, Path(address): Path<String>) -> impl IntoResponse {
    match state.executor.unban(&address).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(err) => (
            axum::http::StatusCode::BAD_REQUEST,
            Json(ErrorBody { error: err.to_string() }),
        )
            .into_response(),
    }
}

async fn list_banned(State(state): State<AdminState>) -> impl IntoResponse {
    match state.executor.list_active_bans().await {
        Ok(bans) => Json(bans).into_response(),
        Err(err) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody { error: err.to_string() }),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct PortRequest {
    port: u16,
    #[serde(default = "default_protocol")]
    protocol: String,
    source: Option<String>,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

async fn open_port(State(state): State<AdminState>, Json(body): Json<PortRequest>) -> impl IntoResponse {
    match state.executor.open_port(body.port, &body.protocol, body.source.as_deref()).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(err) => (
            axum::http::StatusCode::BAD_REQUEST,
            Json(ErrorBody { error: err.to_string() }),
        )
            .into_response(),
    }
}

async fn close_port(State(state): State<AdminState>, Json(body): Json<PortRequest>) -> impl IntoResponse {
    match state.executor.close_port(body.port, &body.protocol).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(err) => (
            axum::http::StatusCode::BAD_REQUEST,
            Json(ErrorBody { error: err.to_string() }),
        )
            .into_response(),
    }
}

async fn block_port(State(state): State<AdminState>, Json(body): Json<PortRequest>) -> impl IntoResponse {
    match state.executor.block_port(body.port, &body.protocol).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(err) => (
            axum::http::StatusCode::BAD_REQUEST,
            Json(ErrorBody { error: err.to_string() }),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitRequest {
    limit: u32,
    period_seconds: u32,
    port: Option<u16>,
}

async fn add_rate_limit(State(state): State<AdminState>, Json(body): Json<RateLimitRequest>) -> impl IntoResponse {
    match state.executor.add_rate_limit(body.limit, body.period_seconds, body.port).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(err) => (
            axum::http::StatusCode::BAD_REQUEST,
            Json(ErrorBody { error: err.to_string() }),
        )
            .into_response(),
    }
}

async fn health_check(State(state): State<AdminState>) -> impl IntoResponse {
    match state.executor.health_check().await {
        Ok(true) => axum::http::StatusCode::OK.into_response(),
        Ok(false) => axum::http::StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Err(err) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody { error: err.to_string() }),
        )
            .into_response(),
    }
}
