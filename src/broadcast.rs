// =============================================================================
// Broadcast — chat surface adapter + message assembly
// =============================================================================
//
// The core assembles message structs and renders them to text; the
// `Broadcaster` trait is the only thing that touches the chat transport.
// Broadcaster failures are logged at ERROR and swallowed — the signal is
// already recorded in memory, and a chat outage must never stall the
// detector.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::analyzers::{AnalyzerKind, AnalyzerScores};
use crate::detector::PumpEvent;
use crate::memory::Signal;

/// Outbound chat surface. One concrete adapter per transport.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, text: &str) -> Result<()>;
}

/// Fire `text` at the broadcaster, absorbing failures.
pub async fn send_or_log(broadcaster: &dyn Broadcaster, text: &str) {
    if let Err(e) = broadcaster.broadcast(text).await {
        error!(error = %e, "broadcast failed — message dropped");
    }
}

// =============================================================================
// Message assembly
// =============================================================================

/// Pump alert sent on the debounced NOTIFIED transition, before analysis.
pub fn render_pump_alert(event: &PumpEvent) -> String {
    format!(
        "🚀 PUMP DETECTED [{}]\n\n\
         {}\n\
         +{:.2}% in {:.1} min\n\
         {:.8} → {:.8}\n\n\
         ⏳ analyzing short entry...",
        event.kind,
        event.symbol,
        event.pump_pct,
        event.elapsed_minutes,
        event.price_start,
        event.price_peak,
    )
}

/// The per-signal broadcast: tier glyph, symbol, entry, pump, combined
/// score, and the per-analyzer breakdown.
pub fn render_signal(signal: &Signal) -> String {
    let mut msg = format!(
        "{} SHORT | {}-TIER\n\n\
         {}\n\
         Entry: {:.8}\n\n\
         ▸ Pump: +{:.1}% in {:.1} min\n\
         ▸ Score: {:.1}/10{}\n\n\
         🛑 SL:  {:.8} (+{:.1}%)\n\
         ✅ TP1: {:.8} ({:.1}%)\n\
         ✅ TP2: {:.8} ({:.1}%)\n\
         ✅ TP3: {:.8} ({:.1}%)\n",
        signal.tier.glyph(),
        signal.tier,
        signal.symbol,
        signal.entry_price,
        signal.pump_pct,
        signal.pump_speed_minutes,
        signal.combined_score,
        match signal.ml_probability {
            Some(p) => format!(" | P(win) {:.0}%", p * 100.0),
            None => String::new(),
        },
        signal.sl_price,
        pct_from_entry(signal.entry_price, signal.sl_price),
        signal.tp1(),
        pct_from_entry(signal.entry_price, signal.tp1()),
        signal.tp2(),
        pct_from_entry(signal.entry_price, signal.tp2()),
        signal.tp3(),
        pct_from_entry(signal.entry_price, signal.tp3()),
    );

    msg.push_str("\n━━━━━━━━━━━━━━━\n");
    msg.push_str(&render_breakdown(&signal.scores));
    msg
}

/// Bounded "entry not found" notice (at most one per symbol per cooldown).
pub fn render_no_signal(symbol: &str, reason: &str) -> String {
    format!("⚪ {symbol}: pump monitored, no short entry found ({reason})")
}

fn render_breakdown(scores: &AnalyzerScores) -> String {
    let values = scores.as_array();
    AnalyzerKind::ALL
        .iter()
        .zip(values)
        .map(|(kind, score)| format!("{} {}: {:.1}", score_marker(score), kind, score))
        .collect::<Vec<_>>()
        .join("\n")
}

fn score_marker(score: f64) -> &'static str {
    if score >= 7.0 {
        "✅"
    } else if score >= 5.0 {
        "▫️"
    } else {
        "⚠️"
    }
}

fn pct_from_entry(entry: f64, level: f64) -> f64 {
    if entry == 0.0 {
        return 0.0;
    }
    (level - entry) / entry * 100.0
}

// =============================================================================
// Adapters
// =============================================================================

/// Telegram Bot API adapter (sendMessage).
pub struct TelegramBroadcaster {
    token: String,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramBroadcaster {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("failed to build reqwest client for TelegramBroadcaster")?;

        Ok(Self {
            token: token.into(),
            chat_id: chat_id.into(),
            client,
        })
    }
}

#[async_trait]
impl Broadcaster for TelegramBroadcaster {
    async fn broadcast(&self, text: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);

        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            .context("telegram sendMessage request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("telegram sendMessage returned {status}: {body}");
        }

        debug!(chars = text.len(), "telegram message sent");
        Ok(())
    }
}

impl std::fmt::Debug for TelegramBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBroadcaster")
            .field("token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Log-only sink used when no chat credentials are configured (and by
/// tests).
#[derive(Debug, Default)]
pub struct LogBroadcaster;

#[async_trait]
impl Broadcaster for LogBroadcaster {
    async fn broadcast(&self, text: &str) -> Result<()> {
        info!(message = %text, "broadcast (log sink)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PumpKind, Tier};
    use chrono::Utc;

    fn sample_signal() -> Signal {
        Signal {
            id: "test-id".into(),
            symbol: "PEPE_USDT".into(),
            created_at: Utc::now(),
            kind: PumpKind::Fast,
            pump_pct: 14.2,
            pump_speed_minutes: 2.5,
            entry_price: 100.0,
            peak_price: 101.0,
            start_price: 88.0,
            scores: AnalyzerScores::neutral(),
            combined_score: 8.3,
            ml_probability: Some(0.72),
            tier: Tier::A,
            sl_price: 105.0,
            tp_prices: [85.0, 90.0, 95.0],
        }
    }

    #[test]
    fn signal_message_contains_core_fields() {
        let msg = render_signal(&sample_signal());
        assert!(msg.contains("PEPE_USDT"));
        assert!(msg.contains("A-TIER"));
        assert!(msg.contains("+14.2%"));
        assert!(msg.contains("8.3/10"));
        assert!(msg.contains("P(win) 72%"));
        // Nearest TP is rendered as TP1.
        let tp1_pos = msg.find("TP1: 95.").unwrap();
        let tp3_pos = msg.find("TP3: 85.").unwrap();
        assert!(tp1_pos < tp3_pos);
    }

    #[test]
    fn breakdown_lists_all_ten_analyzers() {
        let msg = render_breakdown(&AnalyzerScores::neutral());
        for kind in AnalyzerKind::ALL {
            assert!(msg.contains(kind.name()), "missing {kind}");
        }
    }

    #[test]
    fn pump_alert_mentions_kind_and_rise() {
        let event = PumpEvent {
            symbol: "DOGE_USDT".into(),
            kind: PumpKind::Elite,
            pump_pct: 22.5,
            elapsed_minutes: 12.0,
            price_start: 0.1,
            price_peak: 0.1225,
            current_price: 0.12,
            detected_at: Utc::now(),
        };
        let msg = render_pump_alert(&event);
        assert!(msg.contains("ELITE"));
        assert!(msg.contains("DOGE_USDT"));
        assert!(msg.contains("+22.50%"));
    }

    #[test]
    fn no_signal_notice_is_single_line() {
        let msg = render_no_signal("X_USDT", "pump unwound before entry");
        assert!(!msg.contains('\n'));
        assert!(msg.contains("X_USDT"));
    }

    #[tokio::test]
    async fn log_sink_accepts_everything() {
        let sink = LogBroadcaster;
        assert!(sink.broadcast("hello").await.is_ok());
        send_or_log(&sink, "world").await;
    }
}
