//! Derived metric computation
//!
//! Some metrics are not stored but computed from another metric's change
//! across periods, e.g. the weekly change of a cumulative MRR figure:
//! - delta(i) = value(i) - value of the most recent earlier period with a
//!   present base value
//! - no earlier present value: delta is 0, not absent
//! - base value absent in period i: delta is absent

use crate::metrics::MetricRegistry;
use crate::types::PeriodRecord;

/// Deriver filling in delta metrics on a sorted record sequence
pub struct DeltaDeriver;

impl DeltaDeriver {
    /// Return a copy of `records` with every derived metric populated.
    ///
    /// `records` must already be in chronological order. The full history is
    /// used so that the first period of any later window can fall back to the
    /// most recent prior period outside that window.
    pub fn derive(records: &[PeriodRecord], registry: &MetricRegistry) -> Vec<PeriodRecord> {
        let mut out = records.to_vec();
        for (derived_key, base_key) in registry.derived() {
            for i in 0..records.len() {
                let delta = delta_at(records, i, base_key);
                out[i].values.insert(derived_key.to_string(), delta);
            }
        }
        out
    }
}

/// Delta of `base_key` at position `index` of a sorted record sequence
pub fn delta_at(records: &[PeriodRecord], index: usize, base_key: &str) -> Option<f64> {
    let current = records.get(index)?.value(base_key)?;
    let previous = records[..index]
        .iter()
        .rev()
        .find_map(|r| r.value(base_key));

    Some(match previous {
        Some(prev) => current - prev,
        None => 0.0,
    })
}
