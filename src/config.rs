//! Configuration file handling.
//!
//! Loads the engine configuration from a TOML file. Every field has a
//! default, so an empty file (or no file) yields the built-in setup.

use crate::aggregator::DEFAULT_WEEK_SLOTS;
use crate::error::ScorecardError;
use crate::format::{ValueFormatter, DEFAULT_ABBREVIATE_ABOVE, DEFAULT_CURRENCY};
use crate::metrics::MetricRegistry;
use crate::scoring::composite::{CompositeScorer, StateThresholds, WeightTable};
use crate::scoring::types::EntityConfig;
use crate::types::MetricDefinition;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Rollup grid settings.
    #[serde(default)]
    pub grid: GridConfig,

    /// Health scoring and refresh settings.
    #[serde(default)]
    pub health: HealthConfig,

    /// Sub-metric weights.
    #[serde(default)]
    pub weights: WeightTable,

    /// Metric catalogue; empty means the built-in catalogue.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricDefinition>,

    /// Scored entities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<EntityConfig>,
}

/// Rollup grid settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Week columns per week view.
    #[serde(default = "default_week_slots")]
    pub week_slots: usize,

    /// Currency symbol for money values.
    #[serde(default = "default_currency")]
    pub currency_symbol: String,

    /// Magnitude from which money values are shown in thousands.
    #[serde(default = "default_abbreviate_above")]
    pub abbreviate_above: f64,

    /// Entity id for rows that do not name one.
    #[serde(default = "default_entity")]
    pub default_entity: String,

    /// Append a month/quarter-to-date column.
    #[serde(default)]
    pub to_date: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            week_slots: default_week_slots(),
            currency_symbol: default_currency(),
            abbreviate_above: default_abbreviate_above(),
            default_entity: default_entity(),
            to_date: false,
        }
    }
}

fn default_week_slots() -> usize {
    DEFAULT_WEEK_SLOTS
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_abbreviate_above() -> f64 {
    DEFAULT_ABBREVIATE_ABOVE
}

fn default_entity() -> String {
    crate::schema::DEFAULT_ENTITY.to_string()
}

/// Health scoring and refresh settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Seconds a computed health stays fresh.
    #[serde(default = "default_staleness")]
    pub staleness_seconds: u64,

    /// Per-entity upstream fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,

    /// Minimum score for thriving.
    #[serde(default = "default_thriving")]
    pub thriving: f64,

    /// Minimum score for stable.
    #[serde(default = "default_stable")]
    pub stable: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            staleness_seconds: default_staleness(),
            fetch_timeout_seconds: default_fetch_timeout(),
            thriving: default_thriving(),
            stable: default_stable(),
        }
    }
}

fn default_staleness() -> u64 {
    300
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_thriving() -> f64 {
    70.0
}

fn default_stable() -> f64 {
    30.0
}

impl HealthConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn thresholds(&self) -> StateThresholds {
        StateThresholds {
            thriving: self.thriving,
            stable: self.stable,
        }
    }
}

/// Command-line overrides applied on top of a loaded file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub week_slots: Option<usize>,
    pub currency_symbol: Option<String>,
    pub to_date: Option<bool>,
    pub staleness_seconds: Option<u64>,
    pub fetch_timeout_seconds: Option<u64>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ScorecardError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScorecardError::InvalidConfig(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML content.
    pub fn from_toml(content: &str) -> Result<Self, ScorecardError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ScorecardError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Check thresholds, weights and entity ids.
    pub fn validate(&self) -> Result<(), ScorecardError> {
        if self.grid.week_slots == 0 {
            return Err(ScorecardError::InvalidConfig(
                "grid.week_slots must be at least 1".to_string(),
            ));
        }
        if !self.grid.abbreviate_above.is_finite() || self.grid.abbreviate_above <= 0.0 {
            return Err(ScorecardError::InvalidConfig(
                "grid.abbreviate_above must be a positive number".to_string(),
            ));
        }
        self.health.thresholds().validate()?;
        self.weights.validate()?;
        if !self.metrics.is_empty() {
            MetricRegistry::new(self.metrics.clone())?;
        }

        let mut seen = HashSet::new();
        for entity in &self.entities {
            if entity.id.trim().is_empty() {
                return Err(ScorecardError::InvalidConfig(
                    "entity id must not be empty".to_string(),
                ));
            }
            if !seen.insert(entity.id.as_str()) {
                return Err(ScorecardError::InvalidConfig(format!(
                    "duplicate entity id: {}",
                    entity.id
                )));
            }
            if !entity.weekly_target.is_finite() || entity.weekly_target < 0.0 {
                return Err(ScorecardError::InvalidConfig(format!(
                    "entity {} has an invalid weekly target",
                    entity.id
                )));
            }
        }
        Ok(())
    }

    /// Merge command-line overrides.
    ///
    /// Only values explicitly provided take precedence over the file.
    pub fn merge(&mut self, overrides: &Overrides) {
        if let Some(slots) = overrides.week_slots {
            self.grid.week_slots = slots;
        }
        if let Some(ref symbol) = overrides.currency_symbol {
            self.grid.currency_symbol = symbol.clone();
        }
        if let Some(to_date) = overrides.to_date {
            self.grid.to_date = to_date;
        }
        if let Some(seconds) = overrides.staleness_seconds {
            self.health.staleness_seconds = seconds;
        }
        if let Some(seconds) = overrides.fetch_timeout_seconds {
            self.health.fetch_timeout_seconds = seconds;
        }
    }

    /// The configured catalogue, or the built-in one.
    pub fn registry(&self) -> Result<MetricRegistry, ScorecardError> {
        if self.metrics.is_empty() {
            Ok(MetricRegistry::builtin())
        } else {
            MetricRegistry::new(self.metrics.clone())
        }
    }

    pub fn formatter(&self) -> ValueFormatter {
        ValueFormatter::new(self.grid.currency_symbol.clone(), self.grid.abbreviate_above)
    }

    pub fn scorer(&self) -> CompositeScorer {
        CompositeScorer::new(self.weights.clone(), self.health.thresholds())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
