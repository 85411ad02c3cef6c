//! HTTP handlers for the login flow.
//!
//! Mounted by the hosting server; [`router`] provides default paths:
//! `/login`, `/callback`, `/logout` and `/status`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{RawQuery, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::identity::IdentityManager;

/// Build the router for one identity.
pub fn router(identity: Arc<IdentityManager>) -> Router {
    Router::new()
        .route("/login", get(handle_login))
        .route("/callback", get(handle_callback))
        .route("/logout", get(handle_logout))
        .route("/status", get(handle_status))
        .with_state(identity)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    login_uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    logged_in: bool,
    expires_at: Option<DateTime<Utc>>,
}

/// Handle GET /login
pub async fn handle_login(State(identity): State<Arc<IdentityManager>>) -> Response {
    match identity.login_uri() {
        Ok(login_uri) => (StatusCode::OK, Json(LoginResponse { login_uri })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build login URI");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Handle GET /callback
///
/// Failures are reported inline as plain text with status 200.
pub async fn handle_callback(
    State(identity): State<Arc<IdentityManager>>,
    RawQuery(query): RawQuery,
) -> Response {
    let query = query.unwrap_or_default();
    match identity.handle_callback(&query).await {
        Ok(target) => (StatusCode::FOUND, [(header::LOCATION, target)]).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Login callback rejected");
            (StatusCode::OK, format!("{}\n", e)).into_response()
        }
    }
}

/// Handle GET /logout
pub async fn handle_logout(State(identity): State<Arc<IdentityManager>>) -> StatusCode {
    identity.logout().await;
    StatusCode::OK
}

/// Handle GET /status
pub async fn handle_status(State(identity): State<Arc<IdentityManager>>) -> impl IntoResponse {
    let token = identity.token_source().current().await;
    Json(StatusResponse {
        logged_in: token.is_some(),
        expires_at: token.and_then(|t| t.expires_at),
    })
}
