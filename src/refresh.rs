//! Refresh cycle
//!
//! Fetches every entity's board snapshot in parallel, scores it and caches
//! the result. A failed or slow fetch degrades to a per-entity error; the
//! other entities of the cycle are unaffected.

use crate::cache::{CacheStatus, HealthCache};
use crate::error::ScorecardError;
use crate::scoring::actions::{suggest_actions, SuggestedAction};
use crate::scoring::composite::CompositeScorer;
use crate::scoring::presentation::{present, AcknowledgmentStore, StateCounts};
use crate::scoring::types::{EntityConfig, EntityHealth, PeriodScore, Presentation};
use crate::sources::BoardSource;
use crate::types::EntityId;
use chrono::NaiveDateTime;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Default per-entity upstream timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything computed for one entity in a refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntity {
    pub health: EntityHealth,
    pub history: Vec<PeriodScore>,
    pub actions: Vec<SuggestedAction>,
}

/// Per-entity result of a refresh cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntityOutcome {
    Scored {
        entity_id: EntityId,
        name: String,
        #[serde(flatten)]
        scored: ScoredEntity,
        presentation: Presentation,
        cache: CacheStatus,
    },
    Failed {
        entity_id: EntityId,
        name: String,
        error: String,
    },
}

impl EntityOutcome {
    pub fn entity_id(&self) -> &str {
        match self {
            EntityOutcome::Scored { entity_id, .. } | EntityOutcome::Failed { entity_id, .. } => {
                entity_id
            }
        }
    }

    pub fn health(&self) -> Option<&EntityHealth> {
        match self {
            EntityOutcome::Scored { scored, .. } => Some(&scored.health),
            EntityOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, EntityOutcome::Failed { .. })
    }
}

/// Result of one refresh cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub cycle_id: Uuid,
    pub generated_for: NaiveDateTime,
    /// One outcome per entity, in configuration order
    pub outcomes: Vec<EntityOutcome>,
    pub counts: StateCounts,
}

impl RefreshReport {
    pub fn outcome(&self, entity_id: &str) -> Option<&EntityOutcome> {
        self.outcomes.iter().find(|o| o.entity_id() == entity_id)
    }
}

/// Scores entities from a board source through a shared cache
pub struct Refresher {
    source: Arc<dyn BoardSource>,
    scorer: CompositeScorer,
    cache: HealthCache<ScoredEntity>,
    fetch_timeout: Duration,
}

impl Refresher {
    pub fn new(source: Arc<dyn BoardSource>, scorer: CompositeScorer) -> Self {
        Self {
            source,
            scorer,
            cache: HealthCache::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_staleness(mut self, staleness: Duration) -> Self {
        self.cache = HealthCache::new(staleness);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &HealthCache<ScoredEntity> {
        &self.cache
    }

    /// Refresh every entity concurrently.
    ///
    /// With `force`, every entity bypasses the cache for this cycle.
    pub async fn refresh_all(
        &self,
        entities: &[EntityConfig],
        acks: &AcknowledgmentStore,
        now: NaiveDateTime,
        force: bool,
    ) -> RefreshReport {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("refresh", cycle_id = %cycle_id, entities = entities.len());

        async move {
            let outcomes =
                join_all(entities.iter().map(|e| self.refresh_one(e, acks, now, force))).await;

            let mut counts = StateCounts::default();
            for outcome in &outcomes {
                match outcome {
                    EntityOutcome::Scored {
                        scored,
                        presentation,
                        ..
                    } => counts.record(scored.health.state, *presentation),
                    EntityOutcome::Failed { .. } => counts.record_error(),
                }
            }

            info!(
                thriving = counts.thriving,
                stable = counts.stable,
                declining = counts.declining,
                errors = counts.errors,
                "refresh cycle complete"
            );

            RefreshReport {
                cycle_id,
                generated_for: now,
                outcomes,
                counts,
            }
        }
        .instrument(span)
        .await
    }

    /// Refresh one entity, serving from cache when fresh
    pub async fn refresh_one(
        &self,
        entity: &EntityConfig,
        acks: &AcknowledgmentStore,
        now: NaiveDateTime,
        force: bool,
    ) -> EntityOutcome {
        let (result, cache) = self
            .cache
            .get_or_refresh(&entity.id, force, || self.compute(entity, now))
            .await;

        match result {
            Ok(scored) => EntityOutcome::Scored {
                entity_id: entity.id.clone(),
                name: entity.display_name().to_string(),
                presentation: present(&scored.health, acks, now),
                scored,
                cache,
            },
            Err(e) => {
                warn!(entity = %entity.id, error = %e, "entity refresh failed");
                EntityOutcome::Failed {
                    entity_id: entity.id.clone(),
                    name: entity.display_name().to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    async fn compute(
        &self,
        entity: &EntityConfig,
        now: NaiveDateTime,
    ) -> Result<ScoredEntity, ScorecardError> {
        let snapshot = tokio::time::timeout(self.fetch_timeout, self.source.fetch_board(entity))
            .await
            .map_err(|_| ScorecardError::Timeout {
                entity: entity.id.clone(),
                seconds: self.fetch_timeout.as_secs(),
            })??;

        let health = self.scorer.score_snapshot(entity, &snapshot, now);
        let history = self.scorer.score_history(entity, &snapshot, now);
        let actions = suggest_actions(entity, &snapshot, &health);
        Ok(ScoredEntity {
            health,
            history,
            actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::types::{BoardPeriod, BoardSnapshot, HealthState};
    use crate::sources::StaticBoardSource;
    use chrono::{Duration as ChronoDuration, NaiveDate};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn snapshot(delivered: &[f64], queue: u32, active: u32) -> BoardSnapshot {
        let first = NaiveDate::from_ymd_opt(2026, 9, 21).unwrap();
        BoardSnapshot {
            periods: delivered
                .iter()
                .enumerate()
                .map(|(i, d)| {
                    let start = first + ChronoDuration::days(7 * i as i64);
                    BoardPeriod::new(format!("W{}", 39 + i), start, start + ChronoDuration::days(6), *d)
                })
                .collect(),
            queue_length: Some(queue),
            active_count: Some(active),
            ..Default::default()
        }
    }

    fn source() -> StaticBoardSource {
        let mut source = StaticBoardSource::default();
        source.insert("bawldy", snapshot(&[5.0, 3.0, 6.0, 4.0], 3, 2));
        source.insert("lumen", snapshot(&[0.0, 1.0, 0.0, 0.0], 0, 0));
        source
    }

    fn entities() -> Vec<EntityConfig> {
        vec![
            EntityConfig::new("bawldy", 4.0),
            EntityConfig::new("lumen", 4.0),
            EntityConfig::new("broken", 4.0),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_isolated() {
        let source = source().with_failure("broken", "lists endpoint returned 503");
        let refresher = Refresher::new(Arc::new(source), CompositeScorer::default());

        let report = refresher
            .refresh_all(&entities(), &AcknowledgmentStore::new(), now(), false)
            .await;

        assert_eq!(report.outcomes.len(), 3);
        let bawldy = report.outcome("bawldy").unwrap().health().unwrap();
        assert_eq!(bawldy.score, 100);
        assert_eq!(bawldy.state, HealthState::Thriving);
        assert_eq!(
            report.outcome("lumen").unwrap().health().unwrap().state,
            HealthState::Declining
        );
        assert!(report.outcome("broken").unwrap().is_failed());

        assert_eq!(report.counts.thriving, 1);
        assert_eq!(report.counts.declining, 1);
        assert_eq!(report.counts.errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_entity_times_out() {
        let source = source().with_delay(Duration::from_secs(30));
        let refresher = Refresher::new(Arc::new(source), CompositeScorer::default())
            .with_fetch_timeout(Duration::from_secs(5));

        let outcome = refresher
            .refresh_one(&entities()[0], &AcknowledgmentStore::new(), now(), false)
            .await;
        match outcome {
            EntityOutcome::Failed { error, .. } => assert!(error.contains("timed out after 5s")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_cycle_served_from_cache() {
        let source = Arc::new(source());
        let refresher = Refresher::new(source.clone(), CompositeScorer::default());
        let acks = AcknowledgmentStore::new();
        let entities = &entities()[..2];

        refresher.refresh_all(entities, &acks, now(), false).await;
        let report = refresher.refresh_all(entities, &acks, now(), false).await;

        assert_eq!(source.fetch_count(), 2);
        assert!(report.outcomes.iter().all(|o| matches!(
            o,
            EntityOutcome::Scored {
                cache: CacheStatus::Hit,
                ..
            }
        )));

        refresher.refresh_all(entities, &acks, now(), true).await;
        assert_eq!(source.fetch_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledgment_applied_at_read_time() {
        let refresher = Refresher::new(Arc::new(source()), CompositeScorer::default());
        let mut acks = AcknowledgmentStore::new();
        let lumen = EntityConfig::new("lumen", 4.0);

        let before = refresher.refresh_one(&lumen, &acks, now(), false).await;
        acks.acknowledge("lumen", now());
        let after = refresher.refresh_one(&lumen, &acks, now(), false).await;

        let presentation = |o: &EntityOutcome| match o {
            EntityOutcome::Scored { presentation, .. } => *presentation,
            EntityOutcome::Failed { .. } => panic!("unexpected failure"),
        };
        assert_eq!(presentation(&before), Presentation::Normal);
        assert_eq!(presentation(&after), Presentation::Acknowledged);
        assert_eq!(before.health(), after.health());
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = EntityOutcome::Failed {
            entity_id: "broken".to_string(),
            name: "Broken".to_string(),
            error: "timed out".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["entity_id"], "broken");
    }
}
