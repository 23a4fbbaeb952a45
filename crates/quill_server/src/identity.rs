use crate::error::StoreError;
use async_trait::async_trait;

/// The identity system's answer to "does this token belong to a live session,
/// and whose?".
///
/// Credentials, token issuance, and session lifecycle belong to the identity
/// system; this crate only consumes the lookup.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Account id behind `token`, or `None` if the token is not a valid session.
    async fn resolve(&self, token: &str) -> Result<Option<String>, StoreError>;
}
