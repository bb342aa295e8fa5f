use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::http::server::AppState;

/// Token of the authenticated session, attached to the request.
#[derive(Clone, Copy, Debug)]
pub struct SessionToken(pub Uuid);

/// Require a valid bearer token and reset its inactivity timer.
pub async fn session_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if state.sessions.touch(&token).is_err() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    request.extensions_mut().insert(SessionToken(token));
    Ok(next.run(request).await)
}
