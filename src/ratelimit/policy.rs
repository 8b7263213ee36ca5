//! Dual-tier policy evaluation.
//!
//! Every request is checked against a broad per-origin ceiling; when a
//! claimed identity was extracted, a second targeted ceiling for the
//! (origin, identity) pair applies as well. The origin tier throttles
//! volumetric probing from one address, the identity tier throttles
//! credential guessing against one account from many addresses.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::key::RateLimitKey;
use super::store::{PolicyDecision, RateLimitStore};

/// Per-scope policy: limits and window lengths for both tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopePolicy {
    /// Name of the protected operation family, e.g. "login"
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Max admissions per origin per window
    #[serde(default = "default_origin_limit")]
    pub origin_limit: u32,

    /// Origin window length in milliseconds
    #[serde(default = "default_origin_window_ms")]
    pub origin_window_ms: u64,

    /// Max admissions per (origin, identity) pair per window
    #[serde(default = "default_identity_limit")]
    pub identity_limit: u32,

    /// Identity window length in milliseconds
    #[serde(default = "default_identity_window_ms")]
    pub identity_window_ms: u64,
}

impl Default for ScopePolicy {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            origin_limit: default_origin_limit(),
            origin_window_ms: default_origin_window_ms(),
            identity_limit: default_identity_limit(),
            identity_window_ms: default_identity_window_ms(),
        }
    }
}

fn default_scope() -> String {
    "login".to_string()
}

fn default_origin_limit() -> u32 {
    30
}

fn default_origin_window_ms() -> u64 {
    60_000
}

fn default_identity_limit() -> u32 {
    5
}

fn default_identity_window_ms() -> u64 {
    60_000
}

impl ScopePolicy {
    /// Origin tier window length.
    pub fn origin_window(&self) -> Duration {
        Duration::from_millis(self.origin_window_ms)
    }

    /// Identity tier window length.
    pub fn identity_window(&self) -> Duration {
        Duration::from_millis(self.identity_window_ms)
    }
}

/// Evaluates both tiers of a scope policy against the shared store and
/// reconciles them into one decision.
pub struct PolicyEngine {
    store: Arc<RateLimitStore>,
}

impl PolicyEngine {
    /// Create an engine backed by the given store.
    pub fn new(store: Arc<RateLimitStore>) -> Self {
        Self { store }
    }

    /// The store backing this engine.
    pub fn store(&self) -> &Arc<RateLimitStore> {
        &self.store
    }

    /// Check the origin tier, plus the identity tier when a claimed
    /// identity is present. A denial by either tier denies the request.
    ///
    /// The reported `limit` is always the origin tier's configured
    /// ceiling; `remaining`, `retry_after` and `reset_at` come from
    /// whichever tier binds.
    pub fn evaluate(
        &self,
        policy: &ScopePolicy,
        origin: &str,
        identity: Option<&str>,
    ) -> PolicyDecision {
        let origin_decision = self.store.check(
            RateLimitKey::origin(&policy.scope, origin),
            policy.origin_limit,
            policy.origin_window(),
        );

        let identity_decision = identity.map(|identity| {
            self.store.check(
                RateLimitKey::origin_identity(&policy.scope, origin, identity),
                policy.identity_limit,
                policy.identity_window(),
            )
        });

        let mut decision = match identity_decision {
            Some(identity_decision) => more_restrictive(origin_decision, identity_decision),
            None => origin_decision,
        };
        decision.limit = policy.origin_limit;

        if !decision.allowed {
            debug!(
                scope = %policy.scope,
                origin = %origin,
                identity = identity.is_some(),
                retry_after_ms = decision.retry_after_ms(),
                "request denied by rate limit policy"
            );
        }

        decision
    }
}

/// Pick the tier whose verdict binds the request: a denied tier wins and
/// a longer wait breaks a denial tie; among allowed tiers the smaller
/// remaining wins, with the later reset breaking ties.
fn more_restrictive(a: PolicyDecision, b: PolicyDecision) -> PolicyDecision {
    match (a.allowed, b.allowed) {
        (false, true) => a,
        (true, false) => b,
        (false, false) => {
            if a.retry_after >= b.retry_after {
                a
            } else {
                b
            }
        }
        (true, true) => {
            if a.remaining < b.remaining {
                a
            } else if b.remaining < a.remaining {
                b
            } else if a.reset_at >= b.reset_at {
                a
            } else {
                b
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(Arc::new(RateLimitStore::new()))
    }

    fn policy(origin_limit: u32, identity_limit: u32) -> ScopePolicy {
        ScopePolicy {
            scope: "login".to_string(),
            origin_limit,
            origin_window_ms: 60_000,
            identity_limit,
            identity_window_ms: 60_000,
        }
    }

    #[test]
    fn test_identity_tier_denies_before_origin_tier() {
        let engine = engine();
        let policy = policy(30, 3);

        for _ in 0..3 {
            let decision = engine.evaluate(&policy, "1.2.3.4", Some("a@x.com"));
            assert!(decision.allowed);
        }

        let decision = engine.evaluate(&policy, "1.2.3.4", Some("a@x.com"));
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);

        // The origin tier still has headroom for a different identity.
        let decision = engine.evaluate(&policy, "1.2.3.4", Some("b@x.com"));
        assert!(decision.allowed);

        let origin_key = RateLimitKey::origin("login", "1.2.3.4");
        assert_eq!(engine.store().current_count(&origin_key), Some(5));
    }

    #[test]
    fn test_reported_limit_is_always_origin_ceiling() {
        let engine = engine();
        let policy = policy(30, 3);

        let decision = engine.evaluate(&policy, "1.2.3.4", Some("a@x.com"));
        assert!(decision.allowed);
        assert_eq!(decision.limit, 30);
        // Identity tier binds the remaining count.
        assert_eq!(decision.remaining, 2);

        for _ in 0..3 {
            engine.evaluate(&policy, "1.2.3.4", Some("a@x.com"));
        }
        let decision = engine.evaluate(&policy, "1.2.3.4", Some("a@x.com"));
        assert!(!decision.allowed);
        assert_eq!(decision.limit, 30);
    }

    #[test]
    fn test_missing_identity_skips_identity_tier() {
        let engine = engine();
        let policy = policy(5, 1);

        for _ in 0..5 {
            assert!(engine.evaluate(&policy, "1.2.3.4", None).allowed);
        }
        assert!(!engine.evaluate(&policy, "1.2.3.4", None).allowed);

        // Only the origin bucket was ever created.
        assert_eq!(engine.store().len(), 1);
    }

    #[test]
    fn test_origin_tier_denies_even_with_fresh_identity() {
        let engine = engine();
        let policy = policy(2, 10);

        assert!(engine.evaluate(&policy, "1.2.3.4", Some("a@x.com")).allowed);
        assert!(engine.evaluate(&policy, "1.2.3.4", Some("b@x.com")).allowed);

        let decision = engine.evaluate(&policy, "1.2.3.4", Some("c@x.com"));
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_origins_do_not_share_identity_buckets() {
        let engine = engine();
        let policy = policy(30, 2);

        for _ in 0..2 {
            assert!(engine.evaluate(&policy, "1.2.3.4", Some("a@x.com")).allowed);
        }
        assert!(!engine.evaluate(&policy, "1.2.3.4", Some("a@x.com")).allowed);

        // The same identity from another address gets its own window.
        assert!(engine.evaluate(&policy, "5.6.7.8", Some("a@x.com")).allowed);
    }
}
