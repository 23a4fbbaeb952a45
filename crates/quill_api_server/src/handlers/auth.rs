use super::{ApiError, AppState};
use crate::middleware::{authenticate, bearer_token};
use axum::{
    Router,
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::get,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    pub account_id: Option<String>,
}

/// Create auth routes
pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/session", get(get_session))
}

/// GET /api/auth/session - Report whether the bearer token is a live session
async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, ApiError> {
    let token = bearer_token(&headers);
    let account_id = authenticate(&state, token.as_deref()).await?;
    Ok(Json(SessionResponse {
        authenticated: account_id.is_some(),
        account_id,
    }))
}
