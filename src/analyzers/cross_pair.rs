// =============================================================================
// Cross-Pair Sector Analyzer
// =============================================================================
//
// Places the symbol in a pre-wired sector group (meme / AI / L1) and checks
// how its peers moved over 24 h. An isolated pump in a dumping sector is a
// prime short; a sector-wide pump is a trend, not an anomaly.
//
//   >= 3 peers dumping (<= -5 %)  => high score
//   >= 3 peers pumping (>= +5 %)  => low score
//   otherwise                     => isolated move, mildly favorable

use serde::Serialize;

use crate::analyzers::{AnalyzerContext, AnalyzerDetail, AnalyzerKind, AnalyzerOutcome};

const MEME_COINS: [&str; 7] = ["DOGE", "SHIB", "PEPE", "FLOKI", "BONK", "WIF", "MEME"];
const AI_COINS: [&str; 5] = ["FET", "AGIX", "OCEAN", "RNDR", "TAO"];
const LAYER1_COINS: [&str; 6] = ["ETH", "SOL", "AVAX", "NEAR", "APT", "SUI"];

/// Peers checked per group.
const MAX_PEERS: usize = 5;

/// Peer change beyond which it counts as pumping / dumping, percent.
const SECTOR_MOVE_PCT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SectorMove {
    SectorDump,
    SectorPump,
    Isolated,
    NoGroup,
}

/// One peer's 24 h move.
#[derive(Debug, Clone, Serialize)]
pub struct PeerChange {
    pub symbol: String,
    pub change_24h_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrossPairDetail {
    pub correlation: SectorMove,
    pub peers: Vec<PeerChange>,
    pub dumping: usize,
    pub pumping: usize,
}

pub async fn analyze(ctx: &AnalyzerContext) -> AnalyzerOutcome {
    let peers = peer_group(&ctx.symbol);
    if peers.is_empty() {
        return AnalyzerOutcome::new(
            AnalyzerKind::CrossPair,
            5.0,
            AnalyzerDetail::CrossPair(CrossPairDetail {
                correlation: SectorMove::NoGroup,
                peers: Vec::new(),
                dumping: 0,
                pumping: 0,
            }),
        );
    }

    let mut checked = Vec::new();
    let mut dumping = 0;
    let mut pumping = 0;

    for peer in peers.iter().take(MAX_PEERS) {
        let peer_symbol = format!("{peer}_USDT");
        let Ok(ticker) = ctx.feed.ticker(&peer_symbol).await else {
            continue;
        };

        let change = ticker.change_24h_pct;
        if change <= -SECTOR_MOVE_PCT {
            dumping += 1;
        } else if change >= SECTOR_MOVE_PCT {
            pumping += 1;
        }
        checked.push(PeerChange {
            symbol: peer.to_string(),
            change_24h_pct: change,
        });
    }

    let (correlation, score) = if dumping >= 3 {
        (SectorMove::SectorDump, 8.0)
    } else if pumping >= 3 {
        (SectorMove::SectorPump, 3.0)
    } else {
        (SectorMove::Isolated, 6.0)
    };

    AnalyzerOutcome::new(
        AnalyzerKind::CrossPair,
        score,
        AnalyzerDetail::CrossPair(CrossPairDetail {
            correlation,
            peers: checked,
            dumping,
            pumping,
        }),
    )
}

/// Peers from the symbol's sector group, excluding itself. Empty when the
/// symbol belongs to no known group.
pub fn peer_group(symbol: &str) -> Vec<&'static str> {
    let base = symbol.trim_end_matches("_USDT").trim_end_matches("USDT");

    for group in [&MEME_COINS[..], &AI_COINS[..], &LAYER1_COINS[..]] {
        if group.contains(&base) {
            return group.iter().filter(|c| **c != base).copied().collect();
        }
    }
    Vec::new()
}
