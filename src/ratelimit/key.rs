//! Rate limit key composition.

use std::fmt;

/// The two policy tiers evaluated per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Broad ceiling keyed by network origin alone.
    Origin,
    /// Targeted ceiling keyed by origin plus claimed identity.
    OriginIdentity,
}

impl Tier {
    /// Short tag used when rendering a key.
    pub fn kind(&self) -> &'static str {
        match self {
            Tier::Origin => "ip",
            Tier::OriginIdentity => "ipid",
        }
    }
}

/// A key that uniquely identifies one counting bucket.
///
/// Rendered as `{scope}:{kind}:{origin}` for the origin tier and
/// `{scope}:{kind}:{origin}:{identity}` for the identity tier. Keys are
/// opaque to the store; uniqueness is the only invariant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// The protected operation family this key belongs to
    pub scope: String,
    /// Which policy tier the key counts for
    pub tier: Tier,
    /// Extracted client network address
    pub origin: String,
    /// Normalized claimed identity, identity tier only
    pub identity: Option<String>,
}

impl RateLimitKey {
    /// Key for the origin-only tier of a scope.
    pub fn origin(scope: &str, origin: &str) -> Self {
        Self {
            scope: scope.to_string(),
            tier: Tier::Origin,
            origin: origin.to_string(),
            identity: None,
        }
    }

    /// Key for the (origin, identity) tier of a scope.
    pub fn origin_identity(scope: &str, origin: &str, identity: &str) -> Self {
        Self {
            scope: scope.to_string(),
            tier: Tier::OriginIdentity,
            origin: origin.to_string(),
            identity: Some(identity.to_string()),
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.scope, self.tier.kind(), self.origin)?;
        if let Some(ref identity) = self.identity {
            write!(f, ":{}", identity)?;
        }
        Ok(())
    }
}
