//! Admission middleware: rate limit, then session requirement, for every request.

use crate::handlers::{ApiError, AppState};
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use quill_server::{GateDecision, LedgerError, RateLimitDecision};
use serde::Serialize;
use std::net::SocketAddr;
use tracing::debug;

/// The account behind the request's session, set by [`admission`] on routes
/// that require one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedAccount(pub String);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedAccount {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedAccount>()
            .cloned()
            .ok_or(ApiError::AuthenticationRequired)
    }
}

#[derive(Debug, Serialize)]
struct RateLimitedResponse {
    error: &'static str,
    limit: u64,
    remaining: u64,
    reset: i64,
}

/// Runs the [`RequestGate`](quill_server::RequestGate) for the request and
/// either short-circuits with 429/401/503 or forwards it. Every response carries
/// the `X-RateLimit-*` headers.
pub async fn admission(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let identifier = client_identifier(&request, state.trust_proxy_headers);
    let token = bearer_token(request.headers());

    let decision = state
        .gate
        .admit(&path, &identifier, || authenticate(&state, token.as_deref()))
        .await;

    let mut response = match &decision {
        GateDecision::RateLimited { rate, .. } => {
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(RateLimitedResponse {
                    error: "rate_limit_exceeded",
                    limit: rate.limit,
                    remaining: 0,
                    reset: rate.reset_epoch_secs(),
                }),
            )
                .into_response();
            let retry_after = (rate.reset_epoch_secs() - chrono::Utc::now().timestamp()).max(1);
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(retry_after));
            response
        }
        GateDecision::AuthRequired { .. } => ApiError::AuthenticationRequired.into_response(),
        GateDecision::SessionUnavailable { error, .. } => {
            ApiError::Ledger(error.clone()).into_response()
        }
        GateDecision::Admitted { session, .. } => {
            if let Some(account_id) = session {
                request
                    .extensions_mut()
                    .insert(AuthenticatedAccount(account_id.clone()));
            }
            next.run(request).await
        }
    };

    insert_rate_headers(response.headers_mut(), decision.rate());
    response
}

fn insert_rate_headers(headers: &mut HeaderMap, rate: &RateLimitDecision) {
    headers.insert("X-RateLimit-Limit", HeaderValue::from(rate.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(rate.remaining));
    headers.insert(
        "X-RateLimit-Reset",
        HeaderValue::from(rate.reset_epoch_secs()),
    );
}

/// Resolves `token` to an account, creating the account with the signup
/// grant the first time it is seen.
///
/// `Ok(None)` means no live session. Identity and ledger store faults are
/// returned as errors so they surface as 503, not 401.
pub async fn authenticate(
    state: &AppState,
    token: Option<&str>,
) -> Result<Option<String>, LedgerError> {
    let Some(token) = token else {
        return Ok(None);
    };
    let Some(account_id) = state.sessions.resolve(token).await? else {
        debug!("Rejected unknown or expired session token");
        return Ok(None);
    };

    // Read first; the write transaction is only needed for a new account.
    if state.ledger.account(&account_id).await?.is_none() {
        state
            .ledger
            .open_account(&account_id, state.signup_credits)
            .await?;
    }
    Ok(Some(account_id))
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .filter(|token| !token.is_empty())
}

/// `ip:<addr>` for the caller. Proxy headers are only consulted when the
/// deployment sits behind a trusted proxy.
pub fn client_identifier(request: &Request, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let real_ip = request
            .headers()
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded.or(real_ip) {
            return format!("ip:{}", addr);
        }
    }

    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}
