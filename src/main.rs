// =============================================================================
// Meridian Short Sentinel — Main Entry Point
// =============================================================================
//
// Pump-detection and short-signal engine for MEXC perpetual futures.
// Startup wiring only; every subsystem lives behind `EngineState`.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod analyzers;
mod app_state;
mod broadcast;
mod detector;
mod exchange;
mod indicators;
mod levels;
mod market_data;
mod memory;
mod monitor;
mod poller;
mod runtime_config;
mod scoring;
mod tracker;
mod types;

use std::sync::Arc;

use crate::exchange::MarketFeed;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::EngineState;
use crate::broadcast::{Broadcaster, LogBroadcaster, TelegramBroadcaster};
use crate::exchange::MexcFeed;
use crate::memory::spawn_memory_service;
use crate::runtime_config::RuntimeConfig;
use crate::tracker::{OutcomeTracker, TrackerEvent};

const CONFIG_PATH: &str = "runtime_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Meridian Short Sentinel — Starting Up             ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override the watch list from the environment if provided.
    if let Ok(syms) = std::env::var("MERIDIAN_SYMBOLS") {
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }

    if config.symbols.is_empty() {
        info!("watching every listed contract");
    } else {
        info!(symbols = ?config.symbols, "watching configured contracts only");
    }

    // ── 2. Exchange feed ─────────────────────────────────────────────────
    let feed = Arc::new(MexcFeed::new(&config.exchange)?);

    match feed.list_symbols().await {
        Ok(symbols) => info!(count = symbols.len(), "exchange reachable"),
        Err(e) => warn!(error = %e, "initial symbol listing failed — continuing, the poll loop retries"),
    }

    // ── 3. Broadcaster ───────────────────────────────────────────────────
    let broadcaster: Arc<dyn Broadcaster> = match (
        std::env::var("TELEGRAM_BOT_TOKEN"),
        std::env::var("TELEGRAM_CHAT_ID"),
    ) {
        (Ok(token), Ok(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
            info!("telegram broadcaster configured");
            Arc::new(TelegramBroadcaster::new(token, chat_id)?)
        }
        _ => {
            warn!("TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID unset — broadcasting to the log only");
            Arc::new(LogBroadcaster)
        }
    };

    // ── 4. Learning subsystem ────────────────────────────────────────────
    let memory = spawn_memory_service(&config.learning)?;

    // ── 5. Outcome tracker (constructed first; the event channel feeds
    //       memory, so no cyclic dependency) ───────────────────────────────
    let (events_tx, mut events_rx) = tokio::sync::mpsc::channel::<TrackerEvent>(256);
    let tracker = Arc::new(OutcomeTracker::new(
        feed.clone(),
        config.outcome.clone(),
        events_tx,
    ));

    let outcome_memory = memory.clone();
    tokio::spawn(async move {
        while let Some(TrackerEvent::Finalized {
            signal_id,
            symbol,
            outcome,
        }) = events_rx.recv().await
        {
            info!(
                signal_id = %signal_id,
                symbol = %symbol,
                result = %outcome.final_result,
                "outcome finalized"
            );
            outcome_memory.update_outcome(signal_id, symbol, outcome);
        }
    });

    let trailing_enabled = config.outcome.trailing_enabled;
    tokio::spawn(tracker.clone().run_scheduled());
    if trailing_enabled {
        tokio::spawn(tracker.clone().run_trailing());
    }

    // ── 6. Engine state & poll loop ──────────────────────────────────────
    let state = Arc::new(EngineState::new(
        config,
        feed,
        broadcaster,
        memory,
        tracker,
    ));

    let poll_state = state.clone();
    tokio::spawn(async move {
        poller::run_poll_loop(poll_state).await;
    });

    // Periodic status line so a silent market still shows a heartbeat.
    let status_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(600));
        ticker.tick().await; // skip the immediate first tick
        loop {
            ticker.tick().await;
            info!("\n{}\n{}", status_state.render_status(), status_state.render_stats());
        }
    });

    info!("all subsystems running — Ctrl+C to stop");

    // ── 7. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping");

    // Cancel per-symbol monitors; their guards release the claims.
    for (_, (_, handle)) in state.monitors.write().drain() {
        handle.abort();
    }

    if let Err(e) = state.config.read().save(CONFIG_PATH) {
        error!(error = %e, "failed to save runtime config on shutdown");
    }

    info!("Meridian Short Sentinel shut down complete");
    Ok(())
}
