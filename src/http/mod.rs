//! HTTP API (§4.9/§6.1): scanning, token catalog, session control, admin
//! auth, and health — everything that isn't the WebSocket Router.

mod admin_auth;
mod health;
mod scan;
mod session;
mod state_route;

use axum::Router;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(scan::routes())
        .merge(session::routes())
        .merge(admin_auth::routes())
        .merge(health::routes())
        .merge(state_route::routes())
}

/// Extracts and verifies the `Authorization: Bearer <jwt>` header,
/// required on every `/api/admin/*`-adjacent mutation (§6.1).
pub(crate) fn require_admin(
    headers: &axum::http::HeaderMap,
    auth: &crate::auth::AuthService,
) -> crate::error::AppResult<crate::auth::Claims> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(crate::error::AppError::AuthRequired)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(crate::error::AppError::AuthRequired)?;
    auth.verify(token)
}
