//! HTTP-facing surface: request extractors and the enforcement layer.

mod extract;
mod middleware;

pub use extract::{claimed_identity, client_origin, UNKNOWN_ORIGIN};
pub use middleware::{RateLimitLayer, RateLimitService, REQUEST_ID_HEADER};
