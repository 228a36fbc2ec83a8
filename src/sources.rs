//! External data sources
//!
//! The engine never fetches anything itself; hosts plug in implementations
//! of these traits. The static implementations serve files and tests.

use crate::error::ScorecardError;
use crate::schema::{PeriodRow, RowAdapter};
use crate::scoring::types::{BoardSnapshot, EntityConfig};
use crate::types::EntityId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Source of per-entity board counts (card movements, list sizes)
#[async_trait]
pub trait BoardSource: Send + Sync {
    /// Fetch the current board snapshot for one entity
    async fn fetch_board(&self, entity: &EntityConfig) -> Result<BoardSnapshot, ScorecardError>;

    /// Source type for logging
    fn source_name(&self) -> &'static str;
}

/// Source of tabular period rows
#[async_trait]
pub trait PeriodSource: Send + Sync {
    /// Fetch all rows
    async fn fetch_rows(&self) -> Result<Vec<PeriodRow>, ScorecardError>;

    /// Source type for logging
    fn source_name(&self) -> &'static str;
}

/// In-memory board source, loadable from a JSON map of entity id -> snapshot
#[derive(Debug, Default)]
pub struct StaticBoardSource {
    snapshots: HashMap<EntityId, BoardSnapshot>,
    failures: HashMap<EntityId, String>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl StaticBoardSource {
    pub fn new(snapshots: HashMap<EntityId, BoardSnapshot>) -> Self {
        Self {
            snapshots,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ScorecardError> {
        let snapshots: HashMap<EntityId, BoardSnapshot> = serde_json::from_str(json)?;
        Ok(Self::new(snapshots))
    }

    pub fn load(path: &Path) -> Result<Self, ScorecardError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn insert(&mut self, entity_id: impl Into<String>, snapshot: BoardSnapshot) {
        self.snapshots.insert(entity_id.into(), snapshot);
    }

    /// Make every fetch for `entity_id` fail
    pub fn with_failure(mut self, entity_id: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failures.insert(entity_id.into(), reason.into());
        self
    }

    /// Delay every fetch, simulating a slow upstream
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of fetches served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BoardSource for StaticBoardSource {
    async fn fetch_board(&self, entity: &EntityConfig) -> Result<BoardSnapshot, ScorecardError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = self.failures.get(&entity.id) {
            return Err(ScorecardError::upstream(&entity.id, reason));
        }
        self.snapshots
            .get(&entity.id)
            .cloned()
            .ok_or_else(|| ScorecardError::upstream(&entity.id, "no board data for entity"))
    }

    fn source_name(&self) -> &'static str {
        "static"
    }
}

/// In-memory period row source
#[derive(Debug, Clone, Default)]
pub struct StaticPeriodSource {
    rows: Vec<PeriodRow>,
}

impl StaticPeriodSource {
    pub fn new(rows: Vec<PeriodRow>) -> Self {
        Self { rows }
    }

    /// Parse a JSON array or NDJSON document
    pub fn parse(input: &str) -> Result<Self, ScorecardError> {
        Ok(Self::new(RowAdapter::parse(input)?))
    }

    pub fn load(path: &Path) -> Result<Self, ScorecardError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

#[async_trait]
impl PeriodSource for StaticPeriodSource {
    async fn fetch_rows(&self) -> Result<Vec<PeriodRow>, ScorecardError> {
        Ok(self.rows.clone())
    }

    fn source_name(&self) -> &'static str {
        "static"
    }
}
