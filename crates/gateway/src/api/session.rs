//! Session endpoints.
//!
//! - `GET    /api/session` — the caller's session and identity
//! - `DELETE /api/session` — revoke the caller's session and clear the cookie

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;

use mk_domain::session::{Identity, Session};

use crate::api::auth::error_response;
use crate::state::AppState;

#[derive(Serialize)]
struct WhoAmI {
    session_id: String,
    expires_at: String,
    kind: String,
    roles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
}

pub async fn whoami(
    Extension(session): Extension<Session>,
    Extension(identity): Extension<Identity>,
) -> impl IntoResponse {
    Json(WhoAmI {
        session_id: session.id.to_string(),
        expires_at: session.expires.to_rfc3339(),
        kind: identity.kind,
        roles: identity.roles,
        subject: identity.subject,
    })
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Response {
    if let Err(e) = state.sessions.revoke(&state.shutdown, session.id).await {
        return error_response(&e);
    }
    tracing::info!(session_id = %session.id, "session revoked");

    match state.sessions.removal_cookie().to_header_value() {
        Ok(cookie) => (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response(),
        Err(e) => error_response(&e),
    }
}
