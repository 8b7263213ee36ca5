//! Background eviction of expired windows.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use super::store::RateLimitStore;

/// Spawn the periodic sweep task for a store.
///
/// The interval is fixed and independent of any configured window. The
/// sweeper only bounds memory growth when many distinct keys are seen
/// over the process lifetime; admission decisions stay correct without
/// it because expired entries already read as absent.
pub fn spawn_sweeper(store: Arc<RateLimitStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // An interval's first tick completes immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = store.sweep();
            if evicted > 0 {
                debug!(evicted, live = store.len(), "swept expired rate limit entries");
            }
        }
    })
}
