pub mod auth;
pub mod health;
pub mod session;

use axum::middleware;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Build the HTTP router.
///
/// Routes are split into **public** and **protected**; protected routes sit
/// behind [`auth::require_session`], which resolves the caller's identity.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(health::health));

    let protected = Router::new()
        .route(
            "/api/session",
            get(session::whoami).delete(session::logout),
        )
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_session,
        ));

    public.merge(protected)
}
