//! Confidence scoring
//!
//! Blends a strategy's intrinsic signal confidence with its measured
//! historical accuracy for the symbol, so strategies that have been right
//! in the past outrank equally-confident strategies that have not.

use crate::domain::entities::strategy::{Signal, StrategyId};
use crate::domain::services::accuracy::AccuracyStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Weight of the strategy-intrinsic confidence in the blend.
const BASE_WEIGHT: f64 = 0.6;
/// Weight of measured historical accuracy in the blend.
const ACCURACY_WEIGHT: f64 = 0.4;
/// Neutral prior used when a strategy has no history for the symbol.
pub const NEUTRAL_ACCURACY: f64 = 50.0;

/// A strategy's signal for the symbol plus its intrinsic confidence
/// (0-100, derived from signal strength).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyCandidate {
    pub strategy: StrategyId,
    pub signal: Signal,
    pub base_confidence: f64,
}

/// A candidate after blending, sorted into rank order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedStrategy {
    pub strategy: StrategyId,
    pub signal: Signal,
    pub base_confidence: f64,
    pub historical_accuracy: f64,
    pub samples: u64,
    pub confidence: f64,
}

/// Blend intrinsic confidence with historical accuracy.
pub fn blend(base_confidence: f64, historical_accuracy: f64) -> f64 {
    (BASE_WEIGHT * base_confidence + ACCURACY_WEIGHT * historical_accuracy).round()
}

/// Rank candidates by blended confidence, descending. The sort is stable,
/// so ties keep encounter order; the winner is the first entry.
pub fn rank_strategies(
    candidates: &[StrategyCandidate],
    history: &HashMap<StrategyId, AccuracyStats>,
) -> Vec<RankedStrategy> {
    let mut ranked: Vec<RankedStrategy> = candidates
        .iter()
        .map(|c| {
            let stats = history.get(&c.strategy).copied().unwrap_or_default();
            let historical_accuracy = if stats.samples == 0 {
                NEUTRAL_ACCURACY
            } else {
                stats.accuracy_pct
            };
            RankedStrategy {
                strategy: c.strategy,
                signal: c.signal,
                base_confidence: c.base_confidence,
                historical_accuracy,
                samples: stats.samples,
                confidence: blend(c.base_confidence, historical_accuracy),
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}
