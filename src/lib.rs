//! Floodgate - Request Rate Limiting and Brute-Force Protection
//!
//! This crate implements a single-process throttling subsystem for HTTP
//! services: fixed-window counters keyed by client origin and by
//! (origin, claimed identity), composed into a dual-tier policy and
//! applied as a tower middleware layer around protected handlers.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
