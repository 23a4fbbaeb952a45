use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use quill_server::{LedgerError, PaidGenerationError};
use serde_json::json;
use tracing::error;

/// Error responses for `/api` handlers. Bodies are JSON with an `error` code.
#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    AuthenticationRequired,
    InvalidRequest(String),
    GeneratorUnavailable,
    /// The generator failed after the debit went through. Not refunded.
    GenerationFailed { cost: i64, balance: i64 },
    CouponExists,
    /// Admin routes are disabled when no secret is configured.
    AdminDisabled,
    InvalidAdminSecret,
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<PaidGenerationError> for ApiError {
    fn from(err: PaidGenerationError) -> Self {
        match err {
            PaidGenerationError::NotCharged(err) => ApiError::Ledger(err),
            PaidGenerationError::ChargedButFailed { cost, balance, .. } => {
                ApiError::GenerationFailed { cost, balance }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Ledger(err) => ledger_error_body(err),
            ApiError::AuthenticationRequired => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "authentication_required" }),
            ),
            ApiError::InvalidRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "invalid_request", "message": message }),
            ),
            ApiError::GeneratorUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "generator_unavailable" }),
            ),
            ApiError::GenerationFailed { cost, balance } => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "error": "generation_failed",
                    "charged": true,
                    "cost": cost,
                    "balance": balance,
                }),
            ),
            ApiError::CouponExists => (
                StatusCode::CONFLICT,
                json!({ "error": "coupon_exists" }),
            ),
            ApiError::AdminDisabled => (StatusCode::NOT_FOUND, json!({ "error": "not_found" })),
            ApiError::InvalidAdminSecret => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "invalid_admin_secret" }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

fn ledger_error_body(err: LedgerError) -> (StatusCode, serde_json::Value) {
    match err {
        LedgerError::InsufficientBalance {
            available,
            requested,
        } => (
            StatusCode::PAYMENT_REQUIRED,
            json!({
                "error": "insufficient_balance",
                "available": available,
                "required": requested,
            }),
        ),
        LedgerError::InvalidAmount(_) => (
            StatusCode::BAD_REQUEST,
            json!({ "error": "invalid_amount" }),
        ),
        LedgerError::BalanceOverflow { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": "balance_overflow" }),
        ),
        LedgerError::AccountNotFound(_) => (
            StatusCode::NOT_FOUND,
            json!({ "error": "account_not_found" }),
        ),
        LedgerError::InvalidCoupon => (
            StatusCode::NOT_FOUND,
            json!({ "error": "invalid_coupon" }),
        ),
        LedgerError::AlreadyRedeemed => (
            StatusCode::CONFLICT,
            json!({ "error": "already_redeemed" }),
        ),
        LedgerError::CouponInactive => (StatusCode::GONE, json!({ "error": "coupon_inactive" })),
        LedgerError::StoreUnavailable(detail) => {
            error!("Ledger store unavailable: {}", detail);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "internal_error" }),
            )
        }
        LedgerError::OperationTimedOut => {
            error!("Ledger operation timed out");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "internal_error",
                    "message": "The operation timed out; its outcome is unknown",
                }),
            )
        }
    }
}
