//! Threshold classification
//!
//! Maps one numeric value onto green / yellow / red / neutral using a metric's
//! direction and threshold pair. Boundary values belong to the better bucket.

use crate::types::{Direction, MetricDefinition, Status};

/// Classify a value against a metric definition.
///
/// Absent values are neutral before any comparison is attempted. Definitions
/// without finite thresholds (passthrough keys) are neutral as well.
pub fn classify(value: Option<f64>, def: &MetricDefinition) -> Status {
    let value = match value {
        Some(v) if v.is_finite() => v,
        _ => return Status::Neutral,
    };
    if !def.green.is_finite() || !def.yellow.is_finite() {
        return Status::Neutral;
    }

    match def.direction {
        Direction::HigherIsBetter => {
            if value >= def.green {
                Status::Green
            } else if value >= def.yellow {
                Status::Yellow
            } else {
                Status::Red
            }
        }
        Direction::LowerIsBetter => {
            if value <= def.green {
                Status::Green
            } else if value <= def.yellow {
                Status::Yellow
            } else {
                Status::Red
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AggregationStrategy, DisplayUnit, MetricScope, MetricSource};

    const EPS: f64 = 1e-9;

    fn metric(direction: Direction, green: f64, yellow: f64) -> MetricDefinition {
        MetricDefinition {
            key: "m".to_string(),
            name: "M".to_string(),
            unit: DisplayUnit::Count,
            direction,
            green,
            yellow,
            strategy: AggregationStrategy::Sum,
            scope: MetricScope::Any,
            source: MetricSource::Stored,
        }
    }

    #[test]
    fn test_higher_is_better_boundaries() {
        let calls = metric(Direction::HigherIsBetter, 5.0, 3.0);
        assert_eq!(classify(Some(5.0), &calls), Status::Green);
        assert_eq!(classify(Some(5.0 - EPS), &calls), Status::Yellow);
        assert_eq!(classify(Some(3.0), &calls), Status::Yellow);
        assert_eq!(classify(Some(3.0 - EPS), &calls), Status::Red);
        assert_eq!(classify(Some(40.0), &calls), Status::Green);
    }

    #[test]
    fn test_lower_is_better_boundaries() {
        let delivery = metric(Direction::LowerIsBetter, 48.0, 72.0);
        assert_eq!(classify(Some(48.0), &delivery), Status::Green);
        assert_eq!(classify(Some(48.0 + EPS), &delivery), Status::Yellow);
        assert_eq!(classify(Some(72.0), &delivery), Status::Yellow);
        assert_eq!(classify(Some(72.0 + EPS), &delivery), Status::Red);
        assert_eq!(classify(Some(0.0), &delivery), Status::Green);
    }

    #[test]
    fn test_absent_is_neutral() {
        let calls = metric(Direction::HigherIsBetter, 5.0, 3.0);
        assert_eq!(classify(None, &calls), Status::Neutral);
        assert_eq!(classify(Some(f64::NAN), &calls), Status::Neutral);
    }

    #[test]
    fn test_zero_is_not_absent() {
        let calls = metric(Direction::HigherIsBetter, 5.0, 3.0);
        assert_eq!(classify(Some(0.0), &calls), Status::Red);
    }

    #[test]
    fn test_passthrough_is_always_neutral() {
        let unknown = MetricDefinition::passthrough("mystery");
        assert_eq!(classify(Some(1_000_000.0), &unknown), Status::Neutral);
        assert_eq!(classify(Some(-1.0), &unknown), Status::Neutral);
    }

    #[test]
    fn test_monotonic_sweep() {
        let higher = metric(Direction::HigherIsBetter, 35.0, 20.0);
        let lower = metric(Direction::LowerIsBetter, 80.0, 150.0);
        let rank = |s: Status| match s {
            Status::Red => 0,
            Status::Yellow => 1,
            Status::Green => 2,
            Status::Neutral => unreachable!(),
        };

        let mut prev_higher = 0;
        let mut prev_lower = 2;
        for step in 0..400 {
            let v = step as f64 * 0.5;
            let h = rank(classify(Some(v), &higher));
            let l = rank(classify(Some(v), &lower));
            assert!(h >= prev_higher, "higher-is-better regressed at {}", v);
            assert!(l <= prev_lower, "lower-is-better improved at {}", v);
            prev_higher = h;
            prev_lower = l;
        }
    }
}
