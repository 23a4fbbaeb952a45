use super::{ApiError, AppState};
use crate::middleware::AuthenticatedAccount;
use axum::{
    Router,
    extract::{Query, State},
    response::Json,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use quill_server::{CreditTransaction, LedgerError, generate_paid};
use serde::{Deserialize, Serialize};

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 500;

/// Balance response
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: String,
    pub balance: i64,
    pub last_replenished_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub transactions: Vec<CreditTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub credited: i64,
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub content: String,
    pub cost: i64,
    pub balance: i64,
}

/// Create credit, coupon and generation routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/credits", get(get_balance))
        .route("/api/credits/transactions", get(list_transactions))
        .route("/api/coupons/redeem", post(redeem_coupon))
        .route("/api/generate", post(generate))
}

/// GET /api/credits - Current balance
async fn get_balance(
    State(state): State<AppState>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state
        .ledger
        .account(&account_id)
        .await?
        .ok_or_else(|| LedgerError::AccountNotFound(account_id.clone()))?;

    Ok(Json(BalanceResponse {
        account_id: account.id,
        balance: account.balance,
        last_replenished_at: account.last_replenished_at,
    }))
}

/// GET /api/credits/transactions?limit= - Newest first
async fn list_transactions(
    State(state): State<AppState>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let transactions = state.ledger.transactions(&account_id, limit).await?;
    Ok(Json(HistoryResponse { transactions }))
}

/// POST /api/coupons/redeem - Redeem a coupon code once
async fn redeem_coupon(
    State(state): State<AppState>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    Json(body): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>, ApiError> {
    let credit = state.ledger.redeem_coupon(&account_id, &body.code).await?;
    Ok(Json(RedeemResponse {
        credited: credit.credited,
        balance: credit.new_balance,
    }))
}

/// POST /api/generate - Debit, then call the content generator
async fn generate(
    State(state): State<AppState>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Some(generator) = state.generator.as_deref() else {
        return Err(ApiError::GeneratorUnavailable);
    };
    if body.prompt.trim().is_empty() {
        return Err(ApiError::InvalidRequest("prompt must not be empty".to_string()));
    }

    let paid = generate_paid(
        &state.ledger,
        generator,
        &account_id,
        state.generation_cost,
        body.prompt,
    )
    .await?;

    Ok(Json(GenerateResponse {
        content: paid.content.content,
        cost: paid.cost,
        balance: paid.balance,
    }))
}
