//! Scorecard Engine - period rollups and composite health scores
//!
//! The engine turns weekly metric rows into a rollup grid through a
//! deterministic pipeline: row adaptation → delta derivation → period
//! aggregation → threshold classification → formatted grid.
//!
//! ## Modules
//!
//! - **Rollup Grid**: Aggregate weekly rows into week, month and quarter views
//! - **Scoring Module**: Score entities from board counts into health states
//! - **Refresh**: Fetch and score every entity concurrently behind a staleness cache

pub mod aggregator;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod derived;
pub mod error;
pub mod format;
pub mod grid;
pub mod metrics;
pub mod period;
pub mod pipeline;
pub mod refresh;
pub mod schema;
pub mod scoring;
pub mod sources;
pub mod types;

pub use aggregator::{PeriodAggregator, ViewRequest};
pub use config::Config;
pub use error::ScorecardError;
pub use grid::{GridBuilder, RollupGrid};
pub use metrics::MetricRegistry;
pub use pipeline::{rows_to_grid_json, ScorecardProcessor};

// Schema exports
pub use schema::{PeriodRow, RowAdapter};

// Scoring exports
pub use scoring::{CompositeScorer, EntityHealth, HealthState};

// Refresh exports
pub use cache::HealthCache;
pub use refresh::{RefreshReport, Refresher};
pub use sources::{BoardSource, PeriodSource};

/// Engine version reported by the CLI
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
