//! Composite health scoring module
//!
//! Scores each entity from its board counts and classifies it as declining,
//! stable, thriving or provisioning. Presentation overrides (dormant,
//! acknowledged) are tracked apart from the numeric score.
//!
//! Pipeline: BoardSnapshot → inputs at latest finalized period → curves → weighted composite → state

pub mod actions;
pub mod composite;
pub mod curves;
pub mod presentation;
pub mod types;

pub use actions::{suggest_actions, SuggestedAction};
pub use composite::{derive_state, CompositeScorer, StateThresholds, WeightTable};
pub use curves::ScoreCurve;
pub use presentation::{present, AcknowledgmentStore, StateCounts};
pub use types::{
    BoardPeriod, BoardSnapshot, EntityConfig, EntityHealth, HealthState, PeriodScore,
    Presentation, SubMetricInputs, SubMetricKey, SubMetricScore, SubscriptionTier,
};
