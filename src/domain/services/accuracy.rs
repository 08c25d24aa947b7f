//! Accuracy rules and time-bucketed aggregation
//!
//! The correctness predicate lives here and nowhere else: every call site
//! that grades a decision outcome goes through [`is_correct`]. SQL never
//! re-encodes the rule.

use crate::domain::entities::strategy::Signal;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// A HOLD is graded correct when the price stayed within this band.
pub const HOLD_TOLERANCE_PCT: f64 = 2.0;

/// Relative price change between signal time and evaluation time, in
/// percent.
pub fn outcome_pct(price_before: f64, price_after: f64) -> f64 {
    (price_after - price_before) / price_before * 100.0
}

/// The single correctness rule: BUY wants the price up, SELL wants it
/// down, HOLD wants it flat.
pub fn is_correct(signal: Signal, outcome_pct: f64) -> bool {
    match signal {
        Signal::Buy => outcome_pct > 0.0,
        Signal::Sell => outcome_pct < 0.0,
        Signal::Hold => outcome_pct.abs() < HOLD_TOLERANCE_PCT,
    }
}

/// Aggregation window for accuracy time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketGranularity {
    Hour,
    Day,
}

impl BucketGranularity {
    pub fn parse(s: &str) -> Option<BucketGranularity> {
        match s {
            "hour" => Some(BucketGranularity::Hour),
            "day" => Some(BucketGranularity::Day),
            _ => None,
        }
    }

    pub fn span(&self) -> Duration {
        match self {
            BucketGranularity::Hour => Duration::hours(1),
            BucketGranularity::Day => Duration::days(1),
        }
    }

    /// Truncate a timestamp to the start of its bucket.
    pub fn truncate(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            BucketGranularity::Hour => Utc
                .with_ymd_and_hms(at.year(), at.month(), at.day(), at.hour(), 0, 0)
                .single()
                .unwrap_or(at),
            BucketGranularity::Day => Utc
                .with_ymd_and_hms(at.year(), at.month(), at.day(), 0, 0, 0)
                .single()
                .unwrap_or(at),
        }
    }
}

/// Historical accuracy over a sample of learning events. `samples == 0`
/// means "no history", which callers must treat differently from a
/// genuine 0% accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AccuracyStats {
    pub samples: u64,
    pub accuracy_pct: f64,
}

/// One evaluated decision outcome, the analytics-facing projection of a
/// learning event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluatedOutcome {
    pub at: DateTime<Utc>,
    pub signal: Signal,
    pub outcome_pct: f64,
}

/// Per-bucket aggregate of evaluated outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactBucket {
    pub bucket: DateTime<Utc>,
    pub total: u64,
    pub correct: u64,
    pub accuracy_pct: f64,
    pub avg_outcome_pct: f64,
}

/// Running totals across chronologically ordered buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativePoint {
    pub bucket: DateTime<Utc>,
    pub total: u64,
    pub correct: u64,
    pub accuracy_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImpactSeries {
    pub buckets: Vec<ImpactBucket>,
    pub cumulative: Vec<CumulativePoint>,
}

/// Grade a sample of outcomes. Empty input yields zero samples, not 0%
/// accuracy with phantom samples.
pub fn accuracy_of(outcomes: &[EvaluatedOutcome]) -> AccuracyStats {
    if outcomes.is_empty() {
        return AccuracyStats::default();
    }
    let correct = outcomes
        .iter()
        .filter(|o| is_correct(o.signal, o.outcome_pct))
        .count() as u64;
    AccuracyStats {
        samples: outcomes.len() as u64,
        accuracy_pct: correct as f64 / outcomes.len() as f64 * 100.0,
    }
}

/// Group chronologically ordered outcomes into time-truncated buckets.
/// Input must already be in ascending time order; callers that query
/// newest-first reverse before calling.
pub fn bucketize(
    outcomes: &[EvaluatedOutcome],
    granularity: BucketGranularity,
) -> Vec<ImpactBucket> {
    let mut buckets: Vec<ImpactBucket> = Vec::new();
    let mut sums: Vec<f64> = Vec::new();

    for outcome in outcomes {
        let key = granularity.truncate(outcome.at);
        let correct = is_correct(outcome.signal, outcome.outcome_pct) as u64;

        match buckets.last_mut() {
            Some(last) if last.bucket == key => {
                last.total += 1;
                last.correct += correct;
                *sums.last_mut().expect("sums tracks buckets") += outcome.outcome_pct;
            }
            _ => {
                buckets.push(ImpactBucket {
                    bucket: key,
                    total: 1,
                    correct,
                    accuracy_pct: 0.0,
                    avg_outcome_pct: 0.0,
                });
                sums.push(outcome.outcome_pct);
            }
        }
    }

    for (bucket, sum) in buckets.iter_mut().zip(&sums) {
        bucket.accuracy_pct = bucket.correct as f64 / bucket.total as f64 * 100.0;
        bucket.avg_outcome_pct = sum / bucket.total as f64;
    }

    buckets
}

/// Running cumulative totals, scanned in chronological order.
pub fn cumulative(buckets: &[ImpactBucket]) -> Vec<CumulativePoint> {
    let mut total = 0u64;
    let mut correct = 0u64;
    buckets
        .iter()
        .map(|b| {
            total += b.total;
            correct += b.correct;
            CumulativePoint {
                bucket: b.bucket,
                total,
                correct,
                accuracy_pct: correct as f64 / total as f64 * 100.0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_outcome_pct() {
        assert!((outcome_pct(100.0, 103.0) - 3.0).abs() < 1e-12);
        assert!((outcome_pct(200.0, 190.0) + 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_correctness_rule() {
        assert!(is_correct(Signal::Buy, 3.0));
        assert!(!is_correct(Signal::Buy, 0.0));
        assert!(!is_correct(Signal::Buy, -0.1));

        assert!(is_correct(Signal::Sell, -0.5));
        assert!(!is_correct(Signal::Sell, 3.0));

        assert!(is_correct(Signal::Hold, -1.5));
        assert!(is_correct(Signal::Hold, 1.99));
        assert!(!is_correct(Signal::Hold, 2.5));
        assert!(!is_correct(Signal::Hold, -2.0));
    }

    #[test]
    fn test_accuracy_of_empty_is_zero_samples() {
        let stats = accuracy_of(&[]);
        assert_eq!(stats.samples, 0);
        assert_eq!(stats.accuracy_pct, 0.0);
    }

    #[test]
    fn test_accuracy_of_mixed() {
        let outcomes = vec![
            EvaluatedOutcome {
                at: at(9, 0),
                signal: Signal::Buy,
                outcome_pct: 2.0,
            },
            EvaluatedOutcome {
                at: at(9, 10),
                signal: Signal::Sell,
                outcome_pct: 2.0,
            },
            EvaluatedOutcome {
                at: at(9, 20),
                signal: Signal::Hold,
                outcome_pct: -0.3,
            },
            EvaluatedOutcome {
                at: at(9, 30),
                signal: Signal::Buy,
                outcome_pct: -1.0,
            },
        ];
        let stats = accuracy_of(&outcomes);
        assert_eq!(stats.samples, 4);
        assert!((stats.accuracy_pct - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_truncate_hour_and_day() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 10, 14, 37, 22).unwrap();
        assert_eq!(
            BucketGranularity::Hour.truncate(ts),
            Utc.with_ymd_and_hms(2024, 6, 10, 14, 0, 0).unwrap()
        );
        assert_eq!(
            BucketGranularity::Day.truncate(ts),
            Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_bucketize_groups_by_hour() {
        let outcomes = vec![
            EvaluatedOutcome {
                at: at(9, 5),
                signal: Signal::Buy,
                outcome_pct: 1.0,
            },
            EvaluatedOutcome {
                at: at(9, 40),
                signal: Signal::Buy,
                outcome_pct: -2.0,
            },
            EvaluatedOutcome {
                at: at(10, 15),
                signal: Signal::Sell,
                outcome_pct: -1.0,
            },
        ];
        let buckets = bucketize(&outcomes, BucketGranularity::Hour);
        assert_eq!(buckets.len(), 2);

        assert_eq!(buckets[0].bucket, at(9, 0));
        assert_eq!(buckets[0].total, 2);
        assert_eq!(buckets[0].correct, 1);
        assert!((buckets[0].accuracy_pct - 50.0).abs() < 1e-12);
        assert!((buckets[0].avg_outcome_pct + 0.5).abs() < 1e-12);

        assert_eq!(buckets[1].total, 1);
        assert_eq!(buckets[1].correct, 1);
    }

    #[test]
    fn test_cumulative_running_totals() {
        // hour1 {total:4, correct:3}, hour2 {total:6, correct:3}
        // -> after hour2 {total:10, correct:6, accuracy:60.00}
        let buckets = vec![
            ImpactBucket {
                bucket: at(9, 0),
                total: 4,
                correct: 3,
                accuracy_pct: 75.0,
                avg_outcome_pct: 0.0,
            },
            ImpactBucket {
                bucket: at(10, 0),
                total: 6,
                correct: 3,
                accuracy_pct: 50.0,
                avg_outcome_pct: 0.0,
            },
        ];
        let points = cumulative(&buckets);
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].total, 10);
        assert_eq!(points[1].correct, 6);
        assert!((points[1].accuracy_pct - 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_cumulative_is_monotonic() {
        let outcomes: Vec<EvaluatedOutcome> = (0..20)
            .map(|i| EvaluatedOutcome {
                at: at(6 + i / 4, (i % 4) * 10),
                signal: if i % 3 == 0 { Signal::Buy } else { Signal::Sell },
                outcome_pct: if i % 2 == 0 { 1.5 } else { -1.5 },
            })
            .collect();
        let buckets = bucketize(&outcomes, BucketGranularity::Hour);
        let points = cumulative(&buckets);

        for pair in points.windows(2) {
            assert!(pair[1].total >= pair[0].total);
            assert!(pair[1].correct >= pair[0].correct);
        }
        for p in &points {
            assert!((p.accuracy_pct - p.correct as f64 / p.total as f64 * 100.0).abs() < 1e-12);
        }
    }
}
