pub mod admin;
pub mod api;
pub mod auth;
mod error;

pub use error::ApiError;

use crate::middleware::admission;
use axum::{Router, middleware::from_fn_with_state, routing::get};
use quill_server::{
    ContentGenerator, CreditLedger, ReplenishmentScheduler, RequestGate, SessionResolver,
};
use std::sync::Arc;

/// Shared state for the admission middleware and every handler
#[derive(Clone)]
pub struct AppState {
    pub ledger: CreditLedger,
    pub gate: RequestGate,
    pub sessions: Arc<dyn SessionResolver>,
    pub scheduler: ReplenishmentScheduler,
    /// `None` disables `/api/generate` (503)
    pub generator: Option<Arc<dyn ContentGenerator>>,
    pub generation_cost: i64,
    /// Opening grant for accounts seen for the first time
    pub signup_credits: i64,
    pub trust_proxy_headers: bool,
    /// `None` disables `/api/admin/*` (404)
    pub admin_secret: Option<String>,
}

/// Build the full application router with admission applied to every route.
pub fn app_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Quill API Server" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api/auth", auth::auth_routes())
        .nest("/api/admin", admin::admin_routes())
        .merge(api::api_routes())
        .layer(from_fn_with_state(state.clone(), admission))
        .with_state(state)
}
