//! Error types for the scorecard engine
//!
//! Absent metric values and unknown metric keys are deliberately not
//! represented here: the first is `None`, the second falls back to a
//! passthrough definition. Everything below is contained at row or entity
//! granularity by the callers.

use thiserror::Error;

/// Errors that can occur while ingesting, aggregating or scoring
#[derive(Debug, Error)]
pub enum ScorecardError {
    #[error("Failed to parse input: {0}")]
    Parse(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed period row {row}: {reason}")]
    MalformedPeriodRow { row: usize, reason: String },

    #[error("Upstream fetch failed for {entity}: {reason}")]
    UpstreamFetch { entity: String, reason: String },

    #[error("Upstream fetch for {entity} timed out after {seconds}s")]
    Timeout { entity: String, seconds: u64 },

    #[error("Invalid thresholds for metric {key}: {reason}")]
    InvalidThresholds { key: String, reason: String },

    #[error("Invalid weight table: {0}")]
    InvalidWeights(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ScorecardError {
    /// Shorthand for an isolated per-entity fetch failure
    pub fn upstream(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        ScorecardError::UpstreamFetch {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to a single entity (and must not abort a batch)
    pub fn is_entity_scoped(&self) -> bool {
        matches!(
            self,
            ScorecardError::UpstreamFetch { .. } | ScorecardError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_display() {
        let err = ScorecardError::upstream("bawldy", "lists endpoint returned 503");
        assert_eq!(
            err.to_string(),
            "Upstream fetch failed for bawldy: lists endpoint returned 503"
        );
        assert!(err.is_entity_scoped());
    }

    #[test]
    fn test_row_errors_are_not_entity_scoped() {
        let err = ScorecardError::MalformedPeriodRow {
            row: 3,
            reason: "missing period".to_string(),
        };
        assert!(!err.is_entity_scoped());
    }
}
