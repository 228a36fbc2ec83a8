//! Metric registry
//!
//! A closed table of [`MetricDefinition`] rows keyed by metric key. All
//! per-metric behaviour (formatting unit, rollup strategy, scope, derivation)
//! is dispatched through lookups here; adding a metric means adding a row.

use crate::classifier::classify;
use crate::error::ScorecardError;
use crate::types::{
    AggregationStrategy, Direction, DisplayUnit, MetricDefinition, MetricScope, MetricSource,
    Status,
};
use std::collections::HashMap;
use tracing::warn;

/// Lookup table of metric definitions, preserving declaration order
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    definitions: Vec<MetricDefinition>,
    index: HashMap<String, usize>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MetricRegistry {
    /// Build a registry, validating every row and rejecting duplicate keys
    pub fn new(definitions: Vec<MetricDefinition>) -> Result<Self, ScorecardError> {
        let mut index = HashMap::with_capacity(definitions.len());
        for (i, def) in definitions.iter().enumerate() {
            def.validate()
                .map_err(|reason| ScorecardError::InvalidThresholds {
                    key: def.key.clone(),
                    reason,
                })?;
            if index.insert(def.key.clone(), i).is_some() {
                return Err(ScorecardError::InvalidConfig(format!(
                    "duplicate metric key: {}",
                    def.key
                )));
            }
        }

        for def in &definitions {
            if let MetricSource::DeltaOf(base) = &def.source {
                if !index.contains_key(base) {
                    return Err(ScorecardError::InvalidConfig(format!(
                        "metric {} derives from unknown metric {}",
                        def.key, base
                    )));
                }
            }
        }

        Ok(Self { definitions, index })
    }

    /// The built-in scorecard catalogue
    pub fn builtin() -> Self {
        let definitions = builtin_definitions();
        let index = definitions
            .iter()
            .enumerate()
            .map(|(i, d)| (d.key.clone(), i))
            .collect();
        Self { definitions, index }
    }

    /// Definition for a known key
    pub fn get(&self, key: &str) -> Option<&MetricDefinition> {
        self.index.get(key).map(|&i| &self.definitions[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Total lookup: unknown keys get a neutral passthrough definition
    pub fn lookup(&self, key: &str) -> MetricDefinition {
        match self.get(key) {
            Some(def) => def.clone(),
            None => {
                warn!(metric = key, "unknown metric key, rendering as passthrough");
                MetricDefinition::passthrough(key)
            }
        }
    }

    /// Classify a value for a key; unknown keys are neutral
    pub fn classify(&self, key: &str, value: Option<f64>) -> Status {
        match self.get(key) {
            Some(def) => classify(value, def),
            None => Status::Neutral,
        }
    }

    /// Rollup strategy for a key (last value for unknown keys)
    pub fn strategy(&self, key: &str) -> AggregationStrategy {
        self.get(key)
            .map(|d| d.strategy)
            .unwrap_or(AggregationStrategy::LastValue)
    }

    /// Definitions in declaration order
    pub fn definitions(&self) -> &[MetricDefinition] {
        &self.definitions
    }

    /// Derived metrics as (derived key, base key) pairs
    pub fn derived(&self) -> impl Iterator<Item = (&str, &str)> {
        self.definitions.iter().filter_map(|d| match &d.source {
            MetricSource::DeltaOf(base) => Some((d.key.as_str(), base.as_str())),
            MetricSource::Stored => None,
        })
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[allow(clippy::too_many_arguments)]
fn row(
    key: &str,
    name: &str,
    unit: DisplayUnit,
    direction: Direction,
    green: f64,
    yellow: f64,
    strategy: AggregationStrategy,
    scope: MetricScope,
) -> MetricDefinition {
    MetricDefinition {
        key: key.to_string(),
        name: name.to_string(),
        unit,
        direction,
        green,
        yellow,
        strategy,
        scope,
        source: MetricSource::Stored,
    }
}

/// Default catalogue used when no `[[metrics]]` table is configured
pub fn builtin_definitions() -> Vec<MetricDefinition> {
    use AggregationStrategy::{Average, LastValue, Sum};
    use Direction::{HigherIsBetter as Higher, LowerIsBetter as Lower};
    use DisplayUnit::{Count, Currency, Hours, Percent};
    use MetricScope::{Any, QuarterOnly, WeekOnly};

    let mut defs = vec![
        // Marketing
        row("cpl", "CPL (Qualified)", Currency, Lower, 80.0, 150.0, Average, Any),
        row("calls", "Sales Calls", Count, Higher, 5.0, 3.0, Sum, Any),
        row("posts", "Social Posts", Count, Higher, 6.0, 4.0, Sum, Any),
        // Sales
        row("closeRate", "Close Rate", Percent, Higher, 35.0, 20.0, Average, Any),
        row("mrr", "MRR", Currency, Higher, 45_000.0, 35_000.0, LastValue, Any),
        row("margin", "Profit Margin", Percent, Higher, 50.0, 35.0, Average, Any),
        // Customer success
        row("cardsDone", "Cards Done", Count, Higher, 40.0, 20.0, Sum, Any),
        row("cardsPerEditor", "Cards / Editor", Count, Higher, 10.0, 5.0, Average, Any),
        row("delivery", "Delivery Time", Hours, Lower, 48.0, 72.0, Average, Any),
        row("wins", "Client Wins", Count, Higher, 5.0, 3.0, Sum, Any),
        // People
        row("applicants", "Applicants", Count, Higher, 10.0, 5.0, Sum, Any),
        row("testCuts", "Test Cuts", Count, Higher, 5.0, 2.0, Sum, Any),
        row("testPassed", "Tests Passed", Count, Higher, 3.0, 1.0, Sum, Any),
        row("goodEditors", "Good Editors", Count, Higher, 6.0, 4.0, LastValue, Any),
        row("editorsCount", "Editors", Count, Higher, 8.0, 5.0, LastValue, QuarterOnly),
    ];

    let mut mrr_delta = row(
        "mrrDelta",
        "MRR Change",
        DisplayUnit::CurrencyDelta,
        Higher,
        0.0,
        -1_000.0,
        Sum,
        WeekOnly,
    );
    mrr_delta.source = MetricSource::DeltaOf("mrr".to_string());
    defs.push(mrr_delta);

    defs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalogue_is_valid() {
        let defs = builtin_definitions();
        let registry = MetricRegistry::new(defs.clone()).unwrap();
        assert_eq!(registry.len(), defs.len());
        assert_eq!(registry.definitions()[0].key, "cpl");
    }

    #[test]
    fn test_lookup_is_total() {
        let registry = MetricRegistry::builtin();
        let known = registry.lookup("calls");
        assert_eq!(known.name, "Sales Calls");

        let unknown = registry.lookup("brandNewMetric");
        assert_eq!(unknown.key, "brandNewMetric");
        assert_eq!(unknown.strategy, AggregationStrategy::LastValue);
        assert_eq!(registry.classify("brandNewMetric", Some(9.0)), Status::Neutral);
    }

    #[test]
    fn test_classify_through_registry() {
        let registry = MetricRegistry::builtin();
        assert_eq!(registry.classify("cpl", Some(80.0)), Status::Green);
        assert_eq!(registry.classify("cpl", Some(151.0)), Status::Red);
        assert_eq!(registry.classify("mrr", Some(40_000.0)), Status::Yellow);
        assert_eq!(registry.classify("mrr", None), Status::Neutral);
    }

    #[test]
    fn test_derived_pairs() {
        let registry = MetricRegistry::builtin();
        let derived: Vec<_> = registry.derived().collect();
        assert_eq!(derived, vec![("mrrDelta", "mrr")]);
    }

    #[test]
    fn test_rejects_duplicates_and_bad_thresholds() {
        let mut defs = builtin_definitions();
        defs.push(defs[0].clone());
        assert!(matches!(
            MetricRegistry::new(defs),
            Err(ScorecardError::InvalidConfig(_))
        ));

        let mut defs = builtin_definitions();
        defs[1].green = 1.0; // calls: higher-is-better, yellow 3
        assert!(matches!(
            MetricRegistry::new(defs),
            Err(ScorecardError::InvalidThresholds { .. })
        ));
    }

    #[test]
    fn test_rejects_delta_of_unknown_base() {
        let mut defs = builtin_definitions();
        defs.retain(|d| d.key != "mrr");
        assert!(MetricRegistry::new(defs).is_err());
    }
}
