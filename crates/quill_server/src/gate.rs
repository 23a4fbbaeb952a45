//! Per-request admission: rate limit first, then the session requirement.
//!
//! ```text
//! Start ─┬─→ RateLimited         (terminal)
//!        ├─→ AuthRequired        (terminal)
//!        ├─→ SessionUnavailable  (terminal, identity or ledger store fault)
//!        └─→ Admitted            (terminal, proceeds to the handler)
//! ```
//!
//! Each request is classified exactly once; the gate never retries.

use crate::error::LedgerError;
use crate::rate_limit::{LimiterClass, RateLimitDecision, SlidingWindowLimiter};
use std::future::Future;

/// Maps a path prefix to a limiter class and session requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub prefix: String,
    pub class: LimiterClass,
    pub requires_session: bool,
}

impl RouteRule {
    pub fn new(prefix: impl Into<String>, class: LimiterClass, requires_session: bool) -> Self {
        Self {
            prefix: prefix.into(),
            class,
            requires_session,
        }
    }

    /// Whole-segment prefix match: `/api/credits` matches `/api/credits` and
    /// `/api/credits/transactions`, not `/api/creditsx`.
    fn matches(&self, path: &str) -> bool {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Route classification table. The longest matching prefix wins; paths no
/// rule matches fall back to the general class without a session requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    pub fn classify(&self, path: &str) -> (LimiterClass, bool) {
        self.rules
            .iter()
            .filter(|rule| rule.matches(path))
            .max_by_key(|rule| rule.prefix.trim_end_matches('/').len())
            .map(|rule| (rule.class, rule.requires_session))
            .unwrap_or((LimiterClass::General, false))
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(vec![
            RouteRule::new("/api/auth", LimiterClass::Authentication, false),
            RouteRule::new("/api/generate", LimiterClass::Generation, true),
            RouteRule::new("/api/credits", LimiterClass::General, true),
            RouteRule::new("/api/coupons", LimiterClass::General, true),
            RouteRule::new("/api/admin", LimiterClass::General, false),
        ])
    }
}

/// Terminal state of the gate for one request. `S` is whatever the session
/// lookup yields for an authenticated caller (typically the account id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision<S> {
    Admitted {
        class: LimiterClass,
        rate: RateLimitDecision,
        /// Present when the route required a session.
        session: Option<S>,
    },
    RateLimited {
        class: LimiterClass,
        rate: RateLimitDecision,
    },
    AuthRequired {
        class: LimiterClass,
        rate: RateLimitDecision,
    },
    /// The session lookup failed. Not an answer about the caller.
    SessionUnavailable {
        class: LimiterClass,
        rate: RateLimitDecision,
        error: LedgerError,
    },
}

impl<S> GateDecision<S> {
    pub fn rate(&self) -> &RateLimitDecision {
        match self {
            GateDecision::Admitted { rate, .. }
            | GateDecision::RateLimited { rate, .. }
            | GateDecision::AuthRequired { rate, .. }
            | GateDecision::SessionUnavailable { rate, .. } => rate,
        }
    }

    pub fn class(&self) -> LimiterClass {
        match self {
            GateDecision::Admitted { class, .. }
            | GateDecision::RateLimited { class, .. }
            | GateDecision::AuthRequired { class, .. }
            | GateDecision::SessionUnavailable { class, .. } => *class,
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, GateDecision::Admitted { .. })
    }
}

#[derive(Clone)]
pub struct RequestGate {
    limiter: SlidingWindowLimiter,
    routes: RouteTable,
}

impl RequestGate {
    pub fn new(limiter: SlidingWindowLimiter, routes: RouteTable) -> Self {
        Self { limiter, routes }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Classifies one request.
    ///
    /// `session` is only awaited when the route requires a session and the
    /// rate limit admitted the request, so rate-limited traffic never reaches
    /// the identity system. A failing lookup ends in `SessionUnavailable`,
    /// never in `AuthRequired`.
    pub async fn admit<S, F, Fut>(&self, path: &str, identifier: &str, session: F) -> GateDecision<S>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<S>, LedgerError>>,
    {
        let (class, requires_session) = self.routes.classify(path);
        let rate = self.limiter.limit(identifier, class).await;

        if !rate.allowed {
            return GateDecision::RateLimited { class, rate };
        }
        if !requires_session {
            return GateDecision::Admitted {
                class,
                rate,
                session: None,
            };
        }
        match session().await {
            Ok(Some(found)) => GateDecision::Admitted {
                class,
                rate,
                session: Some(found),
            },
            Ok(None) => GateDecision::AuthRequired { class, rate },
            Err(error) => GateDecision::SessionUnavailable { class, rate, error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{LimitPolicy, LimiterConfig, MemoryRateLimitStore};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn gate(generation_budget: u64) -> RequestGate {
        let config = LimiterConfig {
            generation: LimitPolicy::new(generation_budget, Duration::from_secs(60)),
            ..LimiterConfig::default()
        };
        let limiter = SlidingWindowLimiter::new(Arc::new(MemoryRateLimitStore::new()), config);
        RequestGate::new(limiter, RouteTable::default())
    }

    #[test]
    fn test_route_classification() {
        let routes = RouteTable::default();
        assert_eq!(
            routes.classify("/api/auth/session"),
            (LimiterClass::Authentication, false)
        );
        assert_eq!(
            routes.classify("/api/generate"),
            (LimiterClass::Generation, true)
        );
        assert_eq!(
            routes.classify("/api/credits/transactions"),
            (LimiterClass::General, true)
        );
        assert_eq!(
            routes.classify("/api/coupons/redeem"),
            (LimiterClass::General, true)
        );
        assert_eq!(routes.classify("/health"), (LimiterClass::General, false));
        // Segment boundaries matter
        assert_eq!(
            routes.classify("/api/creditsx"),
            (LimiterClass::General, false)
        );
        assert_eq!(
            routes.classify("/api/authority"),
            (LimiterClass::General, false)
        );
    }

    #[test]
    fn test_longest_prefix_wins() {
        let routes = RouteTable::new(vec![
            RouteRule::new("/api", LimiterClass::General, true),
            RouteRule::new("/api/auth/", LimiterClass::Authentication, false),
        ]);
        assert_eq!(
            routes.classify("/api/auth/login"),
            (LimiterClass::Authentication, false)
        );
        assert_eq!(routes.classify("/api/other"), (LimiterClass::General, true));
    }

    #[tokio::test]
    async fn test_public_route_admitted_without_session_lookup() {
        let gate = gate(5);
        let lookups = &AtomicUsize::new(0);
        let decision: GateDecision<String> = gate
            .admit("/health", "ip:1.1.1.1", move || async move {
                lookups.fetch_add(1, Ordering::SeqCst);
                Ok(Some("acct".to_string()))
            })
            .await;

        assert!(decision.is_admitted());
        assert_eq!(decision.class(), LimiterClass::General);
        assert_eq!(lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_protected_route_requires_session() {
        let gate = gate(5);

        let anonymous: GateDecision<String> = gate
            .admit("/api/generate", "ip:1.1.1.1", || async { Ok(None) })
            .await;
        assert!(matches!(anonymous, GateDecision::AuthRequired { .. }));

        let signed_in = gate
            .admit("/api/generate", "ip:1.1.1.1", || async {
                Ok(Some("acct-1".to_string()))
            })
            .await;
        match signed_in {
            GateDecision::Admitted { session, rate, .. } => {
                assert_eq!(session.as_deref(), Some("acct-1"));
                // The unauthenticated attempt was counted too
                assert_eq!(rate.remaining, 3);
            }
            other => panic!("expected admission, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_short_circuits_before_session_lookup() {
        let gate = gate(1);
        let lookups = &AtomicUsize::new(0);

        let first: GateDecision<String> = gate
            .admit("/api/generate", "ip:2.2.2.2", move || async move {
                lookups.fetch_add(1, Ordering::SeqCst);
                Ok(Some("acct-1".to_string()))
            })
            .await;
        assert!(first.is_admitted());

        let second: GateDecision<String> = gate
            .admit("/api/generate", "ip:2.2.2.2", move || async move {
                lookups.fetch_add(1, Ordering::SeqCst);
                Ok(Some("acct-1".to_string()))
            })
            .await;
        assert!(matches!(second, GateDecision::RateLimited { .. }));
        assert_eq!(second.rate().remaining, 0);
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_store_fault_is_not_auth_required() {
        let gate = gate(5);
        let decision: GateDecision<String> = gate
            .admit("/api/credits", "ip:3.3.3.3", || async {
                Err(LedgerError::OperationTimedOut)
            })
            .await;

        match decision {
            GateDecision::SessionUnavailable { error, class, .. } => {
                assert_eq!(error, LedgerError::OperationTimedOut);
                assert_eq!(class, LimiterClass::General);
            }
            other => panic!("expected a session fault, got {:?}", other),
        }
    }
}
