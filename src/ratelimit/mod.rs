//! Rate limiting logic and state management.

mod key;
mod policy;
mod store;
mod sweeper;

pub use key::{RateLimitKey, Tier};
pub use policy::{PolicyEngine, ScopePolicy};
pub use store::{PolicyDecision, RateLimitEntry, RateLimitStore};
pub use sweeper::spawn_sweeper;
