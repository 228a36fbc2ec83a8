//! Health scoring types
//!
//! Types flowing through the composite health scorer: entity configuration,
//! board inputs, per sub-metric scores and the resulting entity health.

use crate::period::Dated;
use crate::types::EntityId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One weighted input of the composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubMetricKey {
    /// Delivered items vs weekly target
    Cadence,
    /// Share of recent finalized weeks that met the target
    Rhythm,
    /// Items waiting in the queue
    Queue,
    /// Items currently being worked on
    Active,
    /// Client sentiment signal in [-1, 1]
    Sentiment,
    /// Days since the last recorded activity
    Freshness,
}

impl SubMetricKey {
    pub const ALL: [SubMetricKey; 6] = [
        SubMetricKey::Cadence,
        SubMetricKey::Rhythm,
        SubMetricKey::Queue,
        SubMetricKey::Active,
        SubMetricKey::Sentiment,
        SubMetricKey::Freshness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubMetricKey::Cadence => "cadence",
            SubMetricKey::Rhythm => "rhythm",
            SubMetricKey::Queue => "queue",
            SubMetricKey::Active => "active",
            SubMetricKey::Sentiment => "sentiment",
            SubMetricKey::Freshness => "freshness",
        }
    }
}

/// Score-derived state, or the onboarding override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Declining,
    Stable,
    Thriving,
    Provisioning,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Declining => "declining",
            HealthState::Stable => "stable",
            HealthState::Thriving => "thriving",
            HealthState::Provisioning => "provisioning",
        }
    }

    /// Worst category; the only one that can be dormant or acknowledged
    pub fn is_adverse(&self) -> bool {
        matches!(self, HealthState::Declining)
    }
}

/// How a state is shown, tracked separately from the state itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presentation {
    Normal,
    /// Declining, but the entity has no active relationship
    Dormant,
    /// Declining, suppressed by an operator until midnight
    Acknowledged,
}

/// Commercial relationship of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Active,
    Passive,
}

/// Static configuration of one scored entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    /// Items expected per week; zero makes cadence and rhythm inapplicable
    #[serde(default)]
    pub weekly_target: f64,
    /// New or trial entity: always provisioning
    #[serde(default)]
    pub onboarding: bool,
    #[serde(default)]
    pub subscription: SubscriptionTier,
    /// Proven creative components exist to iterate on
    #[serde(default)]
    pub has_winning_components: bool,
}

impl EntityConfig {
    pub fn new(id: impl Into<String>, weekly_target: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            weekly_target,
            onboarding: false,
            subscription: SubscriptionTier::Active,
            has_winning_components: false,
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Items delivered in one board period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardPeriod {
    pub period_key: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub delivered: f64,
}

impl BoardPeriod {
    pub fn new(period_key: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate, delivered: f64) -> Self {
        Self {
            period_key: period_key.into(),
            start_date,
            end_date,
            delivered,
        }
    }
}

impl Dated for BoardPeriod {
    fn start_date(&self) -> NaiveDate {
        self.start_date
    }
    fn end_date(&self) -> NaiveDate {
        self.end_date
    }
}

/// Pre-extracted board counts for one entity, as fetched from upstream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    /// Delivery history, any order
    #[serde(default)]
    pub periods: Vec<BoardPeriod>,
    /// Items waiting in the queue right now
    #[serde(default)]
    pub queue_length: Option<u32>,
    /// Items in progress right now
    #[serde(default)]
    pub active_count: Option<u32>,
    /// Sentiment signal in [-1, 1]
    #[serde(default)]
    pub sentiment: Option<f64>,
    /// Age of the last recorded activity in days
    #[serde(default)]
    pub last_activity_days: Option<f64>,
    /// Most recent movements, newest first
    #[serde(default)]
    pub recent_activity: Vec<String>,
}

/// Raw sub-metric values for one scoring request; `None` is inapplicable
pub type SubMetricInputs = BTreeMap<SubMetricKey, Option<f64>>;

/// One scored sub-metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubMetricScore {
    pub key: SubMetricKey,
    pub raw_value: f64,
    /// Curve output in [0, 100]
    pub score: f64,
    /// Normalized weight within the applicable set
    pub weight: f64,
    pub label: String,
}

/// Composite health of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityHealth {
    pub entity_id: EntityId,
    /// Rounded composite score
    pub score: u8,
    /// Unrounded composite score
    pub raw_score: f64,
    pub state: HealthState,
    /// Declining without an active subscription
    pub dormant: bool,
    /// Applicable sub-metrics in weight-table order
    pub sub_metric_scores: Vec<SubMetricScore>,
    /// Active sub-metrics that were inapplicable for this entity
    #[serde(default)]
    pub excluded: Vec<SubMetricKey>,
    /// Period the snapshot was taken from
    #[serde(default)]
    pub period_key: Option<String>,
    #[serde(default)]
    pub recent_activity: Vec<String>,
}

impl EntityHealth {
    pub fn sub_metric(&self, key: SubMetricKey) -> Option<&SubMetricScore> {
        self.sub_metric_scores.iter().find(|s| s.key == key)
    }
}

/// One point of a per-period score series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodScore {
    pub period_key: String,
    pub start_date: NaiveDate,
    /// `None` when the entity has no weekly target
    pub score: Option<f64>,
    pub is_current: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_config_defaults() {
        let cfg: EntityConfig = serde_json::from_str(r#"{"id": "bawldy"}"#).unwrap();
        assert_eq!(cfg.weekly_target, 0.0);
        assert_eq!(cfg.subscription, SubscriptionTier::Active);
        assert!(!cfg.onboarding);
        assert_eq!(cfg.display_name(), "bawldy");
    }

    #[test]
    fn test_snapshot_deserialize() {
        let json = r#"{
            "periods": [
                {"period_key": "W41", "start_date": "2026-10-05", "end_date": "2026-10-11", "delivered": 5}
            ],
            "queue_length": 3,
            "active_count": 0
        }"#;
        let snapshot: BoardSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.periods.len(), 1);
        assert_eq!(snapshot.queue_length, Some(3));
        assert_eq!(snapshot.sentiment, None);
    }

    #[test]
    fn test_only_declining_is_adverse() {
        assert!(HealthState::Declining.is_adverse());
        assert!(!HealthState::Stable.is_adverse());
        assert!(!HealthState::Provisioning.is_adverse());
    }
}
