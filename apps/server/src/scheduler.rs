//! Background scheduler for cache maintenance.
//!
//! Lookups already replace expired entries they run into; the sweep drops
//! entries for symbols nobody asks about any more.

use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};
use twelvedata_market_data::{QuoteCache, QuoteSource};

/// Sweep interval floor, so tiny retention windows do not spin.
const MIN_SWEEP_INTERVAL_SECS: u64 = 1;

/// Starts the periodic purge of quotes past their retention window.
///
/// Runs every half retention window.
pub fn start_cache_sweeper<S: QuoteSource>(cache: QuoteCache<S>) -> JoinHandle<()> {
    let every = (cache.config().retain_for / 2).max(Duration::from_secs(MIN_SWEEP_INTERVAL_SECS));

    tokio::spawn(async move {
        info!("Cache sweeper started ({:?} interval)", every);

        let mut sweep_interval = interval(every);
        sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick is immediate and there is nothing to purge yet.
        sweep_interval.tick().await;

        loop {
            sweep_interval.tick().await;
            run_sweep(&cache);
        }
    })
}

fn run_sweep<S: QuoteSource>(cache: &QuoteCache<S>) {
    let purged = cache.purge_expired();
    if purged > 0 {
        debug!("Cache sweep purged {} expired quotes, {} remain", purged, cache.len());
    }
}
