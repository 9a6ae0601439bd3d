// =============================================================================
// Poll Loop — batch ticker ingestion feeding the detector
// =============================================================================
//
// The only writer of the snapshot store. Every tick:
//
//   1. One batch-ticker request covers every listed contract.
//   2. Each ticker is inserted into the per-symbol snapshot series
//      (append-or-drift).
//   3. The pump detector runs over each updated series; events are handed
//      to the orchestrator, which spawns monitor tasks — the loop itself
//      never blocks on downstream work.
//
// A failed fetch is transient: nothing is retried here, the next tick
// simply polls again.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app_state::EngineState;
use crate::detector;
use crate::market_data::Snapshot;
use crate::monitor;

/// Run the poll loop forever. Spawn once at startup.
pub async fn run_poll_loop(state: Arc<EngineState>) {
    let poll_interval = {
        let config = state.config.read();
        Duration::from_millis(config.poll_interval_ms)
    };

    info!(
        interval_ms = poll_interval.as_millis() as u64,
        "poll loop started"
    );

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let scan = state.record_scan();

        let tickers = match state.feed.batch_ticker().await {
            Ok(t) if !t.is_empty() => t,
            Ok(_) => {
                warn!(scan, "batch ticker returned no symbols");
                continue;
            }
            Err(e) => {
                warn!(scan, error = %e, "batch ticker fetch failed — next tick retries");
                continue;
            }
        };

        let (symbol_filter, detection) = {
            let config = state.config.read();
            (config.symbols.clone(), config.detection.clone())
        };

        let mut pumps_found = 0usize;
        for (symbol, entry) in &tickers {
            if !symbol_filter.is_empty() && !symbol_filter.contains(symbol) {
                continue;
            }

            state
                .snapshots
                .insert(symbol, Snapshot::new(entry.ts_ms, entry.last_price, entry.volume_24h));

            let series = state.snapshots.all(symbol);
            if let Some(event) = detector::detect(symbol, &series, entry.ts_ms, &detection) {
                pumps_found += 1;
                debug!(
                    symbol = %symbol,
                    kind = %event.kind,
                    pump_pct = format!("{:.2}", event.pump_pct),
                    "pump detected"
                );
                monitor::handle_pump_event(&state, event);
            }
        }

        if pumps_found > 0 || scan % 1200 == 0 {
            info!(
                scan,
                symbols = tickers.len(),
                pumps = pumps_found,
                "scan complete"
            );
        }
    }
}
