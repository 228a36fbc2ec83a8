//! Composite health scoring
//!
//! Combines the applicable sub-metric scores of one entity into a single
//! weighted score and a discrete state:
//! - composite = Σ(score × weight) / Σ(weight) over applicable sub-metrics
//! - inapplicable sub-metrics leave both numerator and normalization
//! - onboarding entities are provisioning regardless of score

use crate::error::ScorecardError;
use crate::format::number;
use crate::period;
use crate::scoring::curves::ScoreCurve;
use crate::scoring::types::{
    BoardPeriod, BoardSnapshot, EntityConfig, EntityHealth, HealthState, PeriodScore,
    SubMetricInputs, SubMetricKey, SubMetricScore, SubscriptionTier,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Score used when no sub-metric applies
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Trailing finalized weeks considered by the rhythm sub-metric
pub const RHYTHM_WINDOW: usize = 4;

/// Sub-metric weights; keys with zero weight are not part of the active set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightTable(BTreeMap<SubMetricKey, f64>);

impl Default for WeightTable {
    fn default() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(SubMetricKey::Cadence, 0.4);
        weights.insert(SubMetricKey::Queue, 0.3);
        weights.insert(SubMetricKey::Active, 0.3);
        Self(weights)
    }
}

impl WeightTable {
    pub fn new(weights: BTreeMap<SubMetricKey, f64>) -> Result<Self, ScorecardError> {
        let table = Self(weights);
        table.validate()?;
        Ok(table)
    }

    /// Weights must be finite, non-negative and not all zero
    pub fn validate(&self) -> Result<(), ScorecardError> {
        for (key, weight) in &self.0 {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ScorecardError::InvalidWeights(format!(
                    "weight for {} must be a non-negative number, got {}",
                    key.as_str(),
                    weight
                )));
            }
        }
        if self.0.values().sum::<f64>() <= 0.0 {
            return Err(ScorecardError::InvalidWeights(
                "at least one sub-metric needs a positive weight".to_string(),
            ));
        }
        Ok(())
    }

    pub fn weight(&self, key: SubMetricKey) -> f64 {
        self.0.get(&key).copied().unwrap_or(0.0)
    }

    /// Active sub-metrics with their weights, in key order
    pub fn active(&self) -> impl Iterator<Item = (SubMetricKey, f64)> + '_ {
        self.0
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(k, w)| (*k, *w))
    }

    pub fn set(&mut self, key: SubMetricKey, weight: f64) {
        self.0.insert(key, weight);
    }
}

/// Score cut-offs for the discrete states
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateThresholds {
    pub thriving: f64,
    pub stable: f64,
}

impl Default for StateThresholds {
    fn default() -> Self {
        Self {
            thriving: 70.0,
            stable: 30.0,
        }
    }
}

impl StateThresholds {
    pub fn validate(&self) -> Result<(), ScorecardError> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(self.thriving) || !in_range(self.stable) || self.stable > self.thriving {
            return Err(ScorecardError::InvalidConfig(format!(
                "state thresholds must satisfy 0 <= stable ({}) <= thriving ({}) <= 100",
                self.stable, self.thriving
            )));
        }
        Ok(())
    }
}

/// State for a score; the onboarding override is checked first
pub fn derive_state(score: f64, onboarding: bool, thresholds: &StateThresholds) -> HealthState {
    if onboarding {
        HealthState::Provisioning
    } else if score >= thresholds.thriving {
        HealthState::Thriving
    } else if score >= thresholds.stable {
        HealthState::Stable
    } else {
        HealthState::Declining
    }
}

/// Weighted mean of scored sub-metrics, renormalized over their weights
pub fn weighted_score(scores: &[SubMetricScore]) -> Option<f64> {
    let total: f64 = scores.iter().map(|s| s.weight).sum();
    if total <= 0.0 {
        return None;
    }
    Some(scores.iter().map(|s| s.score * s.weight).sum::<f64>() / total)
}

/// Composite scorer over a weight table
#[derive(Debug, Clone, Default)]
pub struct CompositeScorer {
    weights: WeightTable,
    thresholds: StateThresholds,
}

impl CompositeScorer {
    pub fn new(weights: WeightTable, thresholds: StateThresholds) -> Self {
        Self {
            weights,
            thresholds,
        }
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    /// Score one entity from raw sub-metric inputs
    pub fn score(&self, entity: &EntityConfig, inputs: &SubMetricInputs) -> EntityHealth {
        let mut scored = Vec::new();
        let mut excluded = Vec::new();

        for (key, weight) in self.weights.active() {
            let curve = ScoreCurve::for_sub_metric(key, entity.weekly_target);
            let raw = inputs.get(&key).copied().flatten();
            match raw.and_then(|r| curve.apply(r).map(|s| (r, s))) {
                Some((raw_value, score)) => scored.push(SubMetricScore {
                    key,
                    raw_value,
                    score,
                    weight,
                    label: label(key, raw_value, entity),
                }),
                None => excluded.push(key),
            }
        }

        let total: f64 = scored.iter().map(|s| s.weight).sum();
        let raw_score = weighted_score(&scored).unwrap_or(NEUTRAL_SCORE);
        for s in &mut scored {
            s.weight /= total;
        }

        let score = raw_score.round().clamp(0.0, 100.0) as u8;
        // cut-offs apply to the unrounded composite
        let state = derive_state(raw_score, entity.onboarding, &self.thresholds);
        let dormant = state.is_adverse() && entity.subscription == SubscriptionTier::Passive;

        debug!(
            entity = %entity.id,
            score,
            state = state.as_str(),
            excluded = excluded.len(),
            "scored entity"
        );

        EntityHealth {
            entity_id: entity.id.clone(),
            score,
            raw_score,
            state,
            dormant,
            sub_metric_scores: scored,
            excluded,
            period_key: None,
            recent_activity: Vec::new(),
        }
    }

    /// Score an entity from its board snapshot at its latest finalized period
    pub fn score_snapshot(
        &self,
        entity: &EntityConfig,
        snapshot: &BoardSnapshot,
        now: NaiveDateTime,
    ) -> EntityHealth {
        let periods = sorted_periods(snapshot);
        let (inputs, period_key) = snapshot_inputs(entity, snapshot, &periods, now);
        let mut health = self.score(entity, &inputs);
        health.period_key = period_key;
        health.recent_activity = snapshot.recent_activity.clone();
        health
    }

    /// Per-period cadence series for trend display, current period flagged
    pub fn score_history(
        &self,
        entity: &EntityConfig,
        snapshot: &BoardSnapshot,
        now: NaiveDateTime,
    ) -> Vec<PeriodScore> {
        let periods = sorted_periods(snapshot);
        let current = period::current_index(&periods, now);
        let curve = ScoreCurve::for_sub_metric(SubMetricKey::Cadence, entity.weekly_target);

        periods
            .iter()
            .enumerate()
            .map(|(i, p)| PeriodScore {
                period_key: p.period_key.clone(),
                start_date: p.start_date,
                score: curve.apply(p.delivered),
                is_current: Some(i) == current,
            })
            .collect()
    }
}

fn sorted_periods(snapshot: &BoardSnapshot) -> Vec<BoardPeriod> {
    let mut periods = snapshot.periods.clone();
    periods.sort_by(|a, b| {
        a.start_date
            .cmp(&b.start_date)
            .then_with(|| a.period_key.cmp(&b.period_key))
    });
    periods
}

/// Raw inputs at the latest finalized period; the in-progress period never counts
fn snapshot_inputs(
    entity: &EntityConfig,
    snapshot: &BoardSnapshot,
    periods: &[BoardPeriod],
    now: NaiveDateTime,
) -> (SubMetricInputs, Option<String>) {
    let latest = period::latest_finalized_index(periods, now);
    let current = period::current_index(periods, now);

    let finalized: Vec<&BoardPeriod> = periods
        .iter()
        .enumerate()
        .filter(|(i, p)| Some(*i) != current && period::is_finalized(p.end_date, now))
        .map(|(_, p)| p)
        .collect();
    let trailing = &finalized[finalized.len().saturating_sub(RHYTHM_WINDOW)..];
    let rhythm = if trailing.is_empty() || entity.weekly_target <= 0.0 {
        None
    } else {
        let on_target = trailing
            .iter()
            .filter(|p| p.delivered >= entity.weekly_target)
            .count();
        Some(on_target as f64 / trailing.len() as f64)
    };

    let mut inputs = SubMetricInputs::new();
    inputs.insert(
        SubMetricKey::Cadence,
        latest.map(|i| periods[i].delivered),
    );
    inputs.insert(SubMetricKey::Rhythm, rhythm);
    // a board without the list counts as an empty list
    inputs.insert(
        SubMetricKey::Queue,
        Some(f64::from(snapshot.queue_length.unwrap_or(0))),
    );
    inputs.insert(
        SubMetricKey::Active,
        Some(f64::from(snapshot.active_count.unwrap_or(0))),
    );
    inputs.insert(SubMetricKey::Sentiment, snapshot.sentiment);
    inputs.insert(SubMetricKey::Freshness, snapshot.last_activity_days);

    (inputs, latest.map(|i| periods[i].period_key.clone()))
}

fn label(key: SubMetricKey, raw: f64, entity: &EntityConfig) -> String {
    match key {
        SubMetricKey::Cadence => format!(
            "{} / {} delivered",
            number(raw),
            number(entity.weekly_target)
        ),
        SubMetricKey::Rhythm => format!("{}% of recent weeks on target", number((raw * 100.0).round())),
        SubMetricKey::Queue => format!("{} queued", number(raw)),
        SubMetricKey::Active => format!("{} in progress", number(raw)),
        SubMetricKey::Sentiment => format!("sentiment {:+.2}", raw),
        SubMetricKey::Freshness => format!("last activity {}d ago", number(raw.round())),
    }
}
