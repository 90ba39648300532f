//! Session authentication middleware.
//!
//! Resolves the caller's identity through the session manager on every
//! protected request.  On success the [`Session`] and [`Identity`] are
//! placed in request extensions for handlers to read; role checks are the
//! handler's business.  Unauthenticated kinds map to 401, anything else
//! (storage or lock failure) to 503 so an outage is never reported as
//! "please log in again".

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use mk_domain::error::Error;
use mk_domain::session::{Identity, Session};

use crate::state::AppState;

/// Axum middleware enforcing a valid session with a live identity record.
/// Attach via `axum::middleware::from_fn_with_state`.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let sessions = &state.sessions;

    let session = match sessions.read_session_from_request(req.headers()) {
        Ok(s) => s,
        Err(e) => return error_response(&e),
    };
    let identity = match sessions
        .identities()
        .get_identity(&state.shutdown, session.id)
        .await
    {
        Ok(i) => i,
        Err(e) => return error_response(&e),
    };

    req.extensions_mut().insert::<Session>(session);
    req.extensions_mut().insert::<Identity>(identity);
    next.run(req).await
}

/// Map a core error onto a status code and JSON body.
pub fn error_response(err: &Error) -> Response {
    let (status, code) = match err {
        Error::SessionExpired(_) => (StatusCode::UNAUTHORIZED, "session_expired"),
        e if e.is_unauthenticated() => (StatusCode::UNAUTHORIZED, "unauthenticated"),
        Error::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down"),
        Error::LockTimeout(_) | Error::Lock(_) | Error::Storage(_) | Error::Io(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };

    if status.is_server_error() {
        tracing::error!(error = %err, "session backend failure");
    } else {
        tracing::debug!(error = %err, "request rejected");
    }

    (status, Json(serde_json::json!({ "error": code }))).into_response()
}
