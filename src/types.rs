//! Core types for the scorecard engine
//!
//! This module defines the data structures shared by the aggregation side of
//! the engine: metric definitions, raw period records, and the period columns
//! produced by rollups. Scoring types live in [`crate::scoring::types`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a scored subject (a brand, client or department)
pub type EntityId = String;

/// Metric key -> value; `None` means "not yet reported", never zero
pub type MetricValues = BTreeMap<String, Option<f64>>;

/// Which way a metric improves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[serde(alias = "higher", alias = "higher_better")]
    HigherIsBetter,
    #[serde(alias = "lower", alias = "lower_better")]
    LowerIsBetter,
}

/// How week-level values combine into a coarser column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    Sum,
    Average,
    LastValue,
}

/// Views in which a metric is displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricScope {
    WeekOnly,
    QuarterOnly,
    Any,
}

/// Unit tag driving value formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayUnit {
    Count,
    Currency,
    Percent,
    Hours,
    /// Signed period-over-period change of a count
    CountDelta,
    /// Signed period-over-period change of a currency amount
    CurrencyDelta,
}

impl DisplayUnit {
    pub fn is_delta(&self) -> bool {
        matches!(self, DisplayUnit::CountDelta | DisplayUnit::CurrencyDelta)
    }
}

/// Where a metric's weekly values come from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    /// Read directly from the tabular source
    #[default]
    Stored,
    /// Period-over-period change of another (cumulative) metric
    DeltaOf(String),
}

/// Time bucket granularity of a rendered view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Week,
    Month,
    Quarter,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
        }
    }
}

/// Immutable per-deployment definition of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Stable key used in period rows
    pub key: String,
    /// Human readable name
    pub name: String,
    /// Unit tag for formatting
    pub unit: DisplayUnit,
    /// Improvement direction
    pub direction: Direction,
    /// Green threshold (closed on the good side)
    pub green: f64,
    /// Yellow threshold (closed on the good side)
    pub yellow: f64,
    /// Rollup strategy
    pub strategy: AggregationStrategy,
    /// Display scope
    #[serde(default = "default_scope")]
    pub scope: MetricScope,
    /// Stored or derived
    #[serde(default)]
    pub source: MetricSource,
}

fn default_scope() -> MetricScope {
    MetricScope::Any
}

impl MetricDefinition {
    /// Fallback used for keys missing from the registry.
    ///
    /// Values pass through untouched (last value wins in rollups) and the
    /// registry never classifies them as anything but neutral.
    pub fn passthrough(key: &str) -> Self {
        Self {
            key: key.to_string(),
            name: key.to_string(),
            unit: DisplayUnit::Count,
            direction: Direction::HigherIsBetter,
            green: f64::NAN,
            yellow: f64::NAN,
            strategy: AggregationStrategy::LastValue,
            scope: MetricScope::Any,
            source: MetricSource::Stored,
        }
    }

    /// Check the threshold ordering invariant for this definition's direction
    pub fn validate(&self) -> Result<(), String> {
        if !self.green.is_finite() || !self.yellow.is_finite() {
            return Err("thresholds must be finite numbers".to_string());
        }
        match self.direction {
            Direction::HigherIsBetter if self.green < self.yellow => Err(format!(
                "higher-is-better requires green ({}) >= yellow ({})",
                self.green, self.yellow
            )),
            Direction::LowerIsBetter if self.green > self.yellow => Err(format!(
                "lower-is-better requires green ({}) <= yellow ({})",
                self.green, self.yellow
            )),
            _ => Ok(()),
        }
    }

    /// Whether the metric is shown in a view of the given granularity
    pub fn visible_in(&self, granularity: Granularity) -> bool {
        match (self.scope, granularity) {
            (MetricScope::Any, _) => true,
            (MetricScope::WeekOnly, Granularity::Week) => true,
            (MetricScope::WeekOnly, _) => false,
            (MetricScope::QuarterOnly, Granularity::Week) => false,
            (MetricScope::QuarterOnly, _) => true,
        }
    }
}

/// Four-valued classification of one value against its thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Green,
    Yellow,
    Red,
    Neutral,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Green => "green",
            Status::Yellow => "yellow",
            Status::Red => "red",
            Status::Neutral => "neutral",
        }
    }
}

/// One entity's raw measurements for one calendar week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRecord {
    /// Unique, chronologically ordered period identifier
    pub period_key: String,
    /// First day of the period
    pub start_date: NaiveDate,
    /// Last day of the period (inclusive)
    pub end_date: NaiveDate,
    /// Raw values per metric key
    pub values: MetricValues,
}

impl PeriodRecord {
    pub fn new(period_key: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            period_key: period_key.into(),
            start_date,
            end_date,
            values: MetricValues::new(),
        }
    }

    /// Builder-style helper to set one metric value
    pub fn with_value(mut self, key: &str, value: Option<f64>) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    /// Present value for a key; absent and missing keys both yield `None`
    pub fn value(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied().flatten()
    }
}

/// What a rendered column represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// A raw week record
    Week,
    /// A monthly rollup of weeks
    Month,
    /// Synthetic informational total (week-view Total, MTD, QTD)
    Total,
    /// Synthetic empty slot appended by padding
    Padding,
}

/// One displayed time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodColumn {
    pub label: String,
    pub kind: ColumnKind,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_empty: bool,
    pub is_current: bool,
    pub is_total: bool,
    pub values: MetricValues,
}

impl PeriodColumn {
    /// Column showing one raw week record
    pub fn from_record(record: &PeriodRecord, label: String, is_current: bool) -> Self {
        Self {
            label,
            kind: ColumnKind::Week,
            start_date: Some(record.start_date),
            end_date: Some(record.end_date),
            is_empty: false,
            is_current,
            is_total: false,
            values: record.values.clone(),
        }
    }

    /// Synthetic empty slot
    pub fn padding(label: String, start_date: Option<NaiveDate>) -> Self {
        Self {
            label,
            kind: ColumnKind::Padding,
            start_date,
            end_date: None,
            is_empty: true,
            is_current: false,
            is_total: false,
            values: MetricValues::new(),
        }
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied().flatten()
    }
}
