//! Pipeline orchestration
//!
//! This module provides the synchronous public API of the engine. It
//! orchestrates the path from raw period rows to a rollup grid, and from a
//! board snapshot to a scored entity.

use crate::aggregator::ViewRequest;
use crate::config::Config;
use crate::error::ScorecardError;
use crate::grid::{GridBuilder, RollupGrid};
use crate::metrics::MetricRegistry;
use crate::refresh::{Refresher, ScoredEntity};
use crate::schema::{PeriodRow, RowAdapter, DEFAULT_ENTITY};
use crate::scoring::actions::suggest_actions;
use crate::scoring::presentation::{present, AcknowledgmentStore};
use crate::scoring::types::{BoardSnapshot, EntityConfig, Presentation};
use crate::sources::{BoardSource, PeriodSource};
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::debug;

/// Convert raw period rows (JSON array or NDJSON) into a rollup grid JSON
/// document with the built-in catalogue.
///
/// # Example
/// ```ignore
/// let grid_json = rows_to_grid_json(rows, ViewRequest::week(2026, 10), now)?;
/// ```
pub fn rows_to_grid_json(
    input: &str,
    request: ViewRequest,
    now: NaiveDateTime,
) -> Result<String, ScorecardError> {
    ScorecardProcessor::new().grid_json(input, request, now)
}

/// Stateful processor holding configuration and acknowledgments.
///
/// Use this when acknowledgments must persist across calls.
pub struct ScorecardProcessor {
    config: Config,
    registry: MetricRegistry,
    acks: AcknowledgmentStore,
}

impl Default for ScorecardProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScorecardProcessor {
    /// Create a processor with default settings
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            registry: MetricRegistry::builtin(),
            acks: AcknowledgmentStore::new(),
        }
    }

    /// Create a processor from a validated configuration
    pub fn with_config(config: Config) -> Result<Self, ScorecardError> {
        config.validate()?;
        let registry = config.registry()?;
        Ok(Self {
            config,
            registry,
            acks: AcknowledgmentStore::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    pub fn acknowledgments(&self) -> &AcknowledgmentStore {
        &self.acks
    }

    /// Build the rollup grid for a set of rows
    pub fn grid(&self, rows: &[PeriodRow], request: ViewRequest, now: NaiveDateTime) -> RollupGrid {
        let default_entity = if self.config.grid.default_entity.is_empty() {
            DEFAULT_ENTITY
        } else {
            &self.config.grid.default_entity
        };
        let records = RowAdapter::to_records_by_entity(rows, default_entity);
        GridBuilder::new(&self.registry)
            .with_formatter(self.config.formatter())
            .with_week_slots(self.config.grid.week_slots)
            .with_to_date(self.config.grid.to_date)
            .build(records, request, now)
    }

    /// Parse rows and render the grid as JSON
    pub fn grid_json(
        &self,
        input: &str,
        request: ViewRequest,
        now: NaiveDateTime,
    ) -> Result<String, ScorecardError> {
        let rows = RowAdapter::parse(input)?;
        let grid = self.grid(&rows, request, now);
        Ok(serde_json::to_string(&grid)?)
    }

    /// Fetch rows from a source and build the rollup grid
    pub async fn grid_from_source(
        &self,
        source: &dyn PeriodSource,
        request: ViewRequest,
        now: NaiveDateTime,
    ) -> Result<RollupGrid, ScorecardError> {
        let rows = source.fetch_rows().await?;
        debug!(source = source.source_name(), rows = rows.len(), "fetched period rows");
        Ok(self.grid(&rows, request, now))
    }

    /// Score one entity from a snapshot, without caching
    pub fn score(
        &self,
        entity: &EntityConfig,
        snapshot: &BoardSnapshot,
        now: NaiveDateTime,
    ) -> (ScoredEntity, Presentation) {
        let scorer = self.config.scorer();
        let health = scorer.score_snapshot(entity, snapshot, now);
        let history = scorer.score_history(entity, snapshot, now);
        let actions = suggest_actions(entity, snapshot, &health);
        let presentation = present(&health, &self.acks, now);
        (
            ScoredEntity {
                health,
                history,
                actions,
            },
            presentation,
        )
    }

    /// Suppress a declining entity until local midnight.
    ///
    /// Expired acknowledgments are dropped at the same time.
    pub fn acknowledge(&mut self, entity_id: &str, now: NaiveDateTime) -> NaiveDateTime {
        self.acks.prune(now);
        self.acks.acknowledge(entity_id, now)
    }

    /// Load acknowledgment state from JSON
    pub fn load_acknowledgments(&mut self, json: &str) -> Result<(), ScorecardError> {
        self.acks = serde_json::from_str(json)?;
        Ok(())
    }

    /// Save acknowledgment state to JSON
    pub fn save_acknowledgments(&self) -> Result<String, ScorecardError> {
        Ok(serde_json::to_string(&self.acks)?)
    }

    /// Async refresher over a board source using this configuration
    pub fn refresher(&self, source: Arc<dyn BoardSource>) -> Refresher {
        Refresher::new(source, self.config.scorer())
            .with_staleness(self.config.health.staleness())
            .with_fetch_timeout(self.config.health.fetch_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::types::{BoardPeriod, HealthState, SubscriptionTier};
    use crate::sources::StaticPeriodSource;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn sample_rows() -> &'static str {
        r#"[
            {"week": "W41", "start": "2026-10-05", "end": "2026-10-11", "calls": 6, "mrr": "€40,000"},
            {"week": "W42", "start": "2026-10-12", "end": "2026-10-18", "calls": 2, "mrr": "€41,500"},
            {"week": "W43", "start": "2026-10-19", "end": "2026-10-25", "calls": 1}
        ]"#
    }

    #[test]
    fn test_rows_to_grid_json() {
        let json = rows_to_grid_json(sample_rows(), ViewRequest::week(2026, 10), at(2026, 10, 20, 9)).unwrap();
        let grid: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(grid["label"], "Oct 2026");
        let entity = &grid["entities"][0];
        assert_eq!(entity["entity_id"], "default");
        // six week slots plus Total
        assert_eq!(entity["columns"].as_array().unwrap().len(), 7);
        assert_eq!(entity["columns"][2]["is_current"], true);
        assert_eq!(grid["summary"]["red"], 1);
    }

    #[test]
    fn test_processor_with_config() {
        let config = Config::from_toml("[grid]\nweek_slots = 4\ndefault_entity = \"acme\"\n").unwrap();
        let processor = ScorecardProcessor::with_config(config).unwrap();
        let rows = RowAdapter::parse(sample_rows()).unwrap();
        let grid = processor.grid(&rows, ViewRequest::week(2026, 10), at(2026, 10, 20, 9));

        assert_eq!(grid.entities[0].entity_id, "acme");
        assert_eq!(grid.entities[0].columns.len(), 5);
    }

    #[test]
    fn test_processor_to_date_column() {
        let config = Config::from_toml("[grid]\nto_date = true\n").unwrap();
        let processor = ScorecardProcessor::with_config(config).unwrap();
        let rows = RowAdapter::parse(sample_rows()).unwrap();
        let grid = processor.grid(&rows, ViewRequest::week(2026, 10), at(2026, 10, 20, 9));

        let columns = &grid.entities[0].columns;
        assert_eq!(columns.len(), 9);
        assert_eq!(columns[7].label, "MTD");
        assert_eq!(columns[8].label, "QTD");
    }

    #[tokio::test]
    async fn test_grid_from_period_source() {
        let source = StaticPeriodSource::parse(sample_rows()).unwrap();
        let processor = ScorecardProcessor::new();
        let grid = processor
            .grid_from_source(&source, ViewRequest::month(2026, 10), at(2026, 10, 20, 9))
            .await
            .unwrap();

        let calls = grid.entities[0].row("calls").unwrap();
        // W43 is in progress and stays out of the month rollup
        assert_eq!(calls.cells[0].value, Some(8.0));
    }

    #[test]
    fn test_score_and_acknowledge() {
        let mut processor = ScorecardProcessor::new();
        let mut entity = EntityConfig::new("lumen", 4.0);
        entity.subscription = SubscriptionTier::Passive;
        let snapshot = BoardSnapshot {
            periods: vec![BoardPeriod::new(
                "W41",
                NaiveDate::from_ymd_opt(2026, 10, 5).unwrap(),
                NaiveDate::from_ymd_opt(2026, 10, 11).unwrap(),
                0.0,
            )],
            queue_length: Some(0),
            active_count: Some(0),
            ..Default::default()
        };
        let now = at(2026, 10, 19, 9);

        let (scored, presentation) = processor.score(&entity, &snapshot, now);
        assert_eq!(scored.health.state, HealthState::Declining);
        assert_eq!(presentation, Presentation::Dormant);
        assert!(!scored.actions.is_empty());

        processor.acknowledge("lumen", now);
        let (_, presentation) = processor.score(&entity, &snapshot, now);
        assert_eq!(presentation, Presentation::Acknowledged);

        let saved = processor.save_acknowledgments().unwrap();
        let mut restored = ScorecardProcessor::new();
        restored.load_acknowledgments(&saved).unwrap();
        assert!(restored.acknowledgments().is_active("lumen", now));
    }

    #[test]
    fn test_acknowledge_drops_expired_entries() {
        let mut processor = ScorecardProcessor::new();
        processor.acknowledge("lumen", at(2026, 10, 18, 9));
        processor.acknowledge("bawldy", at(2026, 10, 19, 9));

        let acks = processor.acknowledgments();
        assert_eq!(acks.len(), 1);
        assert!(acks.expiry("lumen").is_none());
        assert!(acks.is_active("bawldy", at(2026, 10, 19, 10)));
    }

    #[test]
    fn test_invalid_rows_input() {
        let result = rows_to_grid_json("not json", ViewRequest::week(2026, 10), at(2026, 10, 20, 9));
        assert!(result.is_err());
    }
}
