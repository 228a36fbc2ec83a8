//! Operator action suggestions
//!
//! Rule-based hints derived from the same board counts the scorer reads.

use crate::scoring::types::{BoardSnapshot, EntityConfig, EntityHealth, SubMetricKey};
use serde::{Deserialize, Serialize};

/// Queue length below which new work should be written
const LOW_QUEUE: u32 = 2;

/// Share of the weekly target below which delivery is lagging
const LAGGING_SHARE: f64 = 0.5;

/// Score below which iterating on proven winners is suggested
const ITERATE_BELOW: u8 = 50;

/// Minimum number of items a refill should request
const MIN_REFILL: f64 = 2.0;

/// Iterations requested per winners batch
const ITERATION_BATCH: u32 = 10;

/// A suggested operator action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Write new items for the queue
    RefillQueue { count: u32 },
    /// Put someone on the waiting queue
    AssignEditor,
    /// Produce iterations of winning components
    IterateWinners { count: u32 },
}

/// Suggestions for one entity, each at most once, in a stable order
pub fn suggest_actions(
    entity: &EntityConfig,
    snapshot: &BoardSnapshot,
    health: &EntityHealth,
) -> Vec<SuggestedAction> {
    let queue = snapshot.queue_length.unwrap_or(0);
    let active = snapshot.active_count.unwrap_or(0);
    let delivered = health
        .sub_metric(SubMetricKey::Cadence)
        .map(|s| s.raw_value)
        .unwrap_or(0.0);

    let mut actions = Vec::new();

    let lagging = delivered < entity.weekly_target * LAGGING_SHARE;
    if queue < LOW_QUEUE || lagging {
        let gap = (entity.weekly_target - delivered).max(MIN_REFILL);
        actions.push(SuggestedAction::RefillQueue {
            count: gap.ceil() as u32,
        });
    }

    if active == 0 && queue > 0 {
        actions.push(SuggestedAction::AssignEditor);
    }

    if entity.has_winning_components && health.score < ITERATE_BELOW {
        actions.push(SuggestedAction::IterateWinners {
            count: ITERATION_BATCH,
        });
    }

    actions
}
