//! Presentation overrides
//!
//! Operators may acknowledge a declining entity for the rest of the local
//! calendar day. Acknowledgments live in an explicit store read by the
//! presentation step; they never touch the stored score or state.

use crate::period;
use crate::scoring::types::{EntityHealth, HealthState, Presentation};
use crate::types::EntityId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Entity id -> acknowledgment expiry (next local midnight)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcknowledgmentStore {
    expiries: HashMap<EntityId, NaiveDateTime>,
}

impl AcknowledgmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acknowledge an entity until the end of `now`'s calendar day
    pub fn acknowledge(&mut self, entity_id: &str, now: NaiveDateTime) -> NaiveDateTime {
        let expiry = period::next_midnight(now);
        info!(entity = entity_id, %expiry, "acknowledged until midnight");
        self.expiries.insert(entity_id.to_string(), expiry);
        expiry
    }

    /// Whether an acknowledgment is in force at `now`
    pub fn is_active(&self, entity_id: &str, now: NaiveDateTime) -> bool {
        self.expiries
            .get(entity_id)
            .is_some_and(|expiry| now < *expiry)
    }

    pub fn expiry(&self, entity_id: &str) -> Option<NaiveDateTime> {
        self.expiries.get(entity_id).copied()
    }

    /// Drop expired entries; expired entries are ignored either way
    pub fn prune(&mut self, now: NaiveDateTime) {
        self.expiries.retain(|_, expiry| now < *expiry);
    }

    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }
}

/// Presentation of a scored entity at `now`.
///
/// Only the worst state is eligible. An acknowledgment takes precedence over
/// dormancy.
pub fn present(health: &EntityHealth, acks: &AcknowledgmentStore, now: NaiveDateTime) -> Presentation {
    if !health.state.is_adverse() {
        Presentation::Normal
    } else if acks.is_active(&health.entity_id, now) {
        Presentation::Acknowledged
    } else if health.dormant {
        Presentation::Dormant
    } else {
        Presentation::Normal
    }
}

/// Entity counts per presentation bucket across a refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub thriving: usize,
    pub stable: usize,
    pub declining: usize,
    pub provisioning: usize,
    pub dormant: usize,
    pub acknowledged: usize,
    pub errors: usize,
}

impl StateCounts {
    /// Count one entity in exactly one bucket
    pub fn record(&mut self, state: HealthState, presentation: Presentation) {
        match (state, presentation) {
            (_, Presentation::Acknowledged) => self.acknowledged += 1,
            (_, Presentation::Dormant) => self.dormant += 1,
            (HealthState::Thriving, _) => self.thriving += 1,
            (HealthState::Stable, _) => self.stable += 1,
            (HealthState::Declining, _) => self.declining += 1,
            (HealthState::Provisioning, _) => self.provisioning += 1,
        }
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn total(&self) -> usize {
        self.thriving
            + self.stable
            + self.declining
            + self.provisioning
            + self.dormant
            + self.acknowledged
            + self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn health(state: HealthState, dormant: bool) -> EntityHealth {
        EntityHealth {
            entity_id: "bawldy".to_string(),
            score: 12,
            raw_score: 12.0,
            state,
            dormant,
            sub_metric_scores: Vec::new(),
            excluded: Vec::new(),
            period_key: None,
            recent_activity: Vec::new(),
        }
    }

    #[test]
    fn test_acknowledgment_expires_at_midnight() {
        let mut acks = AcknowledgmentStore::new();
        let expiry = acks.acknowledge("bawldy", at(19, 15, 30));
        assert_eq!(expiry, at(20, 0, 0));

        assert!(acks.is_active("bawldy", at(19, 23, 59)));
        assert!(!acks.is_active("bawldy", at(20, 0, 0)));
        assert!(!acks.is_active("other", at(19, 16, 0)));
    }

    #[test]
    fn test_rearms_next_day() {
        let mut acks = AcknowledgmentStore::new();
        acks.acknowledge("bawldy", at(19, 9, 0));
        let declining = health(HealthState::Declining, false);

        assert_eq!(present(&declining, &acks, at(19, 18, 0)), Presentation::Acknowledged);
        assert_eq!(present(&declining, &acks, at(20, 0, 1)), Presentation::Normal);
        // stored state untouched
        assert_eq!(declining.state, HealthState::Declining);
        assert_eq!(declining.score, 12);
    }

    #[test]
    fn test_only_worst_state_is_suppressed() {
        let mut acks = AcknowledgmentStore::new();
        acks.acknowledge("bawldy", at(19, 9, 0));
        let stable = health(HealthState::Stable, false);
        assert_eq!(present(&stable, &acks, at(19, 10, 0)), Presentation::Normal);
    }

    #[test]
    fn test_acknowledged_beats_dormant() {
        let dormant = health(HealthState::Declining, true);
        let mut acks = AcknowledgmentStore::new();
        assert_eq!(present(&dormant, &acks, at(19, 10, 0)), Presentation::Dormant);
        acks.acknowledge("bawldy", at(19, 10, 0));
        assert_eq!(present(&dormant, &acks, at(19, 11, 0)), Presentation::Acknowledged);
    }

    #[test]
    fn test_prune() {
        let mut acks = AcknowledgmentStore::new();
        acks.acknowledge("a", at(18, 9, 0));
        acks.acknowledge("b", at(19, 9, 0));
        acks.prune(at(19, 12, 0));
        assert_eq!(acks.len(), 1);
        assert!(acks.expiry("b").is_some());
    }

    #[test]
    fn test_state_counts() {
        let mut counts = StateCounts::default();
        counts.record(HealthState::Thriving, Presentation::Normal);
        counts.record(HealthState::Declining, Presentation::Dormant);
        counts.record(HealthState::Declining, Presentation::Normal);
        counts.record_error();
        assert_eq!(counts.thriving, 1);
        assert_eq!(counts.dormant, 1);
        assert_eq!(counts.declining, 1);
        assert_eq!(counts.errors, 1);
        assert_eq!(counts.total(), 4);
    }
}
