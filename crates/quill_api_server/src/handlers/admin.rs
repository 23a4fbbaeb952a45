use super::{ApiError, AppState};
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
};
use quill_server::{Coupon, ReplenishReport};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateCouponRequest {
    pub code: String,
    pub credit_amount: i64,
    #[serde(default)]
    pub single_use: bool,
}

/// Create admin routes (guarded by `X-Admin-Secret`)
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/coupons", post(create_coupon))
        .route("/replenish", post(run_replenishment))
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let secret = state.admin_secret.as_ref().ok_or(ApiError::AdminDisabled)?;

    let provided = headers
        .get("x-admin-secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let matches: bool = secret.as_bytes().ct_eq(provided.as_bytes()).into();
    if !matches {
        return Err(ApiError::InvalidAdminSecret);
    }
    Ok(())
}

/// POST /api/admin/coupons - Register a coupon code
async fn create_coupon(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<Coupon>), ApiError> {
    require_admin(&state, &headers)?;

    let coupon = state
        .ledger
        .create_coupon(&body.code, body.credit_amount, body.single_use)
        .await?
        .ok_or(ApiError::CouponExists)?;
    info!(
        "Created coupon {} worth {} credits (single_use={})",
        coupon.code, coupon.credit_amount, coupon.single_use
    );
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// POST /api/admin/replenish - Run one replenishment pass now
async fn run_replenishment(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ReplenishReport>, ApiError> {
    require_admin(&state, &headers)?;
    let report = state.scheduler.run_once().await?;
    Ok(Json(report))
}
