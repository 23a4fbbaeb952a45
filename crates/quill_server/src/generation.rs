//! Contract with the external content generator, and the paid call path.
//!
//! A generation is only started after its debit succeeded. A generation that
//! fails after the debit is not refunded; the caller is told it was charged.

use crate::error::LedgerError;
use crate::ledger::CreditLedger;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub account_id: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub content: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generator unavailable: {0}")]
    Unavailable(String),

    #[error("generator rejected the request: {0}")]
    Rejected(String),
}

/// The third-party text/vision generation API, treated as a black box.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedContent, GenerationError>;
}

/// Why a paid generation did not produce content.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaidGenerationError {
    /// The debit did not succeed; the generator was never called.
    #[error(transparent)]
    NotCharged(#[from] LedgerError),

    /// The debit succeeded but the generator failed. No refund is issued.
    #[error("generation failed after charging {cost} credits: {source}")]
    ChargedButFailed {
        cost: i64,
        balance: i64,
        #[source]
        source: GenerationError,
    },
}

/// Successful paid generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidGeneration {
    pub content: GeneratedContent,
    pub cost: i64,
    pub balance: i64,
}

/// Debits `cost` credits, then calls the generator.
pub async fn generate_paid(
    ledger: &CreditLedger,
    generator: &dyn ContentGenerator,
    account_id: &str,
    cost: i64,
    prompt: String,
) -> Result<PaidGeneration, PaidGenerationError> {
    let balance = ledger.debit(account_id, cost, "generation").await?;

    let request = GenerationRequest {
        account_id: account_id.to_string(),
        prompt,
    };
    match generator.generate(&request).await {
        Ok(content) => Ok(PaidGeneration {
            content,
            cost,
            balance,
        }),
        Err(source) => {
            warn!(
                "Generation for {} failed after debiting {} credits (not refunded): {}",
                account_id, cost, source
            );
            Err(PaidGenerationError::ChargedButFailed {
                cost,
                balance,
                source,
            })
        }
    }
}
