//! Sub-metric score curves
//!
//! Every curve maps a raw value onto [0, 100] and is monotonic in the good
//! direction. A curve may declare its input inapplicable (e.g. a ratio to a
//! zero target), in which case the sub-metric is left out of the composite.

use crate::scoring::types::SubMetricKey;

/// Days of inactivity still scoring full freshness
const FRESH_DAYS: f64 = 2.0;

/// Days of inactivity at which freshness reaches zero
const STALE_DAYS: f64 = 14.0;

/// Explicit score curve
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreCurve {
    /// `min(raw / target, 1) × 100`; inapplicable for a non-positive target
    RatioToTarget { target: f64 },
    /// Highest step whose threshold `raw` reaches; steps ascend
    Stepped { steps: Vec<(f64, f64)> },
    /// Linear from `low` (score 0) to `high` (score 100), clamped
    Linear { low: f64, high: f64 },
    /// 100 up to `full_until`, linear to 0 at `zero_at`
    Decay { full_until: f64, zero_at: f64 },
}

impl ScoreCurve {
    /// Score a raw value, or `None` if the curve does not apply
    pub fn apply(&self, raw: f64) -> Option<f64> {
        if !raw.is_finite() {
            return None;
        }
        let score = match self {
            ScoreCurve::RatioToTarget { target } => {
                if target.is_nan() || *target <= 0.0 {
                    return None;
                }
                (raw / target).min(1.0) * 100.0
            }
            ScoreCurve::Stepped { steps } => steps
                .iter()
                .rev()
                .find(|(threshold, _)| raw >= *threshold)
                .map(|(_, score)| *score)
                .unwrap_or(0.0),
            ScoreCurve::Linear { low, high } => {
                if high <= low {
                    return None;
                }
                (raw - low) / (high - low) * 100.0
            }
            ScoreCurve::Decay {
                full_until,
                zero_at,
            } => {
                if raw <= *full_until {
                    100.0
                } else if raw >= *zero_at {
                    0.0
                } else {
                    (zero_at - raw) / (zero_at - full_until) * 100.0
                }
            }
        };
        Some(score.clamp(0.0, 100.0))
    }

    /// The curve used for a sub-metric given the entity's weekly target
    pub fn for_sub_metric(key: SubMetricKey, weekly_target: f64) -> Self {
        match key {
            SubMetricKey::Cadence => ScoreCurve::RatioToTarget {
                target: weekly_target,
            },
            // raw is already the share of weeks on target
            SubMetricKey::Rhythm => ScoreCurve::Linear { low: 0.0, high: 1.0 },
            SubMetricKey::Queue => ScoreCurve::Stepped {
                steps: vec![(0.0, 0.0), (1.0, 50.0), (3.0, 100.0)],
            },
            SubMetricKey::Active => ScoreCurve::Stepped {
                steps: vec![(0.0, 0.0), (1.0, 100.0)],
            },
            SubMetricKey::Sentiment => ScoreCurve::Linear {
                low: -1.0,
                high: 1.0,
            },
            SubMetricKey::Freshness => ScoreCurve::Decay {
                full_until: FRESH_DAYS,
                zero_at: STALE_DAYS,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cadence(target: f64) -> ScoreCurve {
        ScoreCurve::for_sub_metric(SubMetricKey::Cadence, target)
    }

    #[test]
    fn test_cadence_ratio() {
        let curve = cadence(4.0);
        let scores: Vec<f64> = [5.0, 3.0, 6.0, 4.0]
            .iter()
            .filter_map(|&d| curve.apply(d))
            .collect();
        assert_eq!(scores, vec![100.0, 75.0, 100.0, 100.0]);
        assert_eq!(curve.apply(0.0), Some(0.0));
    }

    #[test]
    fn test_zero_target_is_inapplicable() {
        assert_eq!(cadence(0.0).apply(3.0), None);
        assert_eq!(cadence(-1.0).apply(3.0), None);
    }

    #[test]
    fn test_queue_steps() {
        let curve = ScoreCurve::for_sub_metric(SubMetricKey::Queue, 0.0);
        assert_eq!(curve.apply(0.0), Some(0.0));
        assert_eq!(curve.apply(1.0), Some(50.0));
        assert_eq!(curve.apply(2.0), Some(50.0));
        assert_eq!(curve.apply(3.0), Some(100.0));
        assert_eq!(curve.apply(12.0), Some(100.0));
    }

    #[test]
    fn test_active_steps() {
        let curve = ScoreCurve::for_sub_metric(SubMetricKey::Active, 0.0);
        assert_eq!(curve.apply(0.0), Some(0.0));
        assert_eq!(curve.apply(1.0), Some(100.0));
    }

    #[test]
    fn test_sentiment_and_freshness() {
        let sentiment = ScoreCurve::for_sub_metric(SubMetricKey::Sentiment, 0.0);
        assert_eq!(sentiment.apply(-1.0), Some(0.0));
        assert_eq!(sentiment.apply(0.0), Some(50.0));
        assert_eq!(sentiment.apply(1.0), Some(100.0));
        assert_eq!(sentiment.apply(3.0), Some(100.0));

        let freshness = ScoreCurve::for_sub_metric(SubMetricKey::Freshness, 0.0);
        assert_eq!(freshness.apply(0.0), Some(100.0));
        assert_eq!(freshness.apply(2.0), Some(100.0));
        assert_eq!(freshness.apply(8.0), Some(50.0));
        assert_eq!(freshness.apply(30.0), Some(0.0));
    }

    #[test]
    fn test_curves_bounded_and_monotonic() {
        for key in SubMetricKey::ALL {
            let curve = ScoreCurve::for_sub_metric(key, 4.0);
            let mut prev: Option<f64> = None;
            for step in 0..200 {
                let raw = -2.0 + step as f64 * 0.1;
                let Some(score) = curve.apply(raw) else { continue };
                assert!((0.0..=100.0).contains(&score), "{:?} out of bounds", key);
                if let Some(p) = prev {
                    // freshness improves as age falls
                    if key == SubMetricKey::Freshness {
                        assert!(score <= p, "{:?} not monotonic at {}", key, raw);
                    } else {
                        assert!(score >= p, "{:?} not monotonic at {}", key, raw);
                    }
                }
                prev = Some(score);
            }
        }
    }
}
