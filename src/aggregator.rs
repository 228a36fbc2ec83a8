//! Period aggregation
//!
//! Turns an unordered sequence of week-level [`PeriodRecord`]s into the
//! columns of a week, month or quarter view:
//! 1. order and de-duplicate records, then derive delta metrics
//! 2. detect the in-progress period (see [`crate::period`])
//! 3. roll weeks up per metric strategy, skipping absent values
//! 4. pad week views to a fixed slot count and append a Total column
//!
//! The current period is shown but never feeds a rollup.

use crate::derived::DeltaDeriver;
use crate::error::ScorecardError;
use crate::metrics::MetricRegistry;
use crate::period;
use crate::types::{
    AggregationStrategy, ColumnKind, Granularity, MetricValues, PeriodColumn, PeriodRecord,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Default number of week columns in a week view
pub const DEFAULT_WEEK_SLOTS: usize = 6;

/// Label of the synthetic week-view total column
pub const TOTAL_LABEL: &str = "Total";

/// Which view to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRequest {
    pub granularity: Granularity,
    pub year: i32,
    /// Month (1-12) for week/month views, quarter (1-4) for quarter views
    pub index: u32,
}

impl ViewRequest {
    pub fn week(year: i32, month: u32) -> Self {
        Self {
            granularity: Granularity::Week,
            year,
            index: month,
        }
    }

    pub fn month(year: i32, month: u32) -> Self {
        Self {
            granularity: Granularity::Month,
            year,
            index: month,
        }
    }

    pub fn quarter(year: i32, quarter: u32) -> Self {
        Self {
            granularity: Granularity::Quarter,
            year,
            index: quarter,
        }
    }

    /// Parse `2026-10` (month) or `2026-Q4` (quarter) for the given granularity
    pub fn parse(granularity: Granularity, value: &str) -> Result<Self, ScorecardError> {
        let (year, rest) = value
            .split_once('-')
            .ok_or_else(|| ScorecardError::Parse(format!("invalid period: {}", value)))?;
        let year: i32 = year
            .trim()
            .parse()
            .map_err(|_| ScorecardError::Parse(format!("invalid year in period: {}", value)))?;
        let rest = rest.trim();

        let (index, max) = match granularity {
            Granularity::Quarter => {
                let q = rest.trim_start_matches(['Q', 'q']);
                (q.parse::<u32>().ok(), 4)
            }
            Granularity::Week | Granularity::Month => (rest.parse::<u32>().ok(), 12),
        };

        match index {
            Some(i) if (1..=max).contains(&i) => Ok(Self {
                granularity,
                year,
                index: i,
            }),
            _ => Err(ScorecardError::Parse(format!(
                "invalid {} period: {}",
                granularity.as_str(),
                value
            ))),
        }
    }

    /// The view containing `date` at this granularity
    pub fn containing(granularity: Granularity, date: NaiveDate) -> Self {
        use chrono::Datelike;
        let index = match granularity {
            Granularity::Quarter => period::quarter_of(date.month()),
            _ => date.month(),
        };
        Self {
            granularity,
            year: date.year(),
            index,
        }
    }
}

/// Aggregate present values with one strategy.
///
/// Returns `None` when no value is present, never zero.
pub fn aggregate(values: &[Option<f64>], strategy: AggregationStrategy) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }

    Some(match strategy {
        AggregationStrategy::Sum => present.iter().sum(),
        AggregationStrategy::Average => {
            let mean = present.iter().sum::<f64>() / present.len() as f64;
            // f64::round rounds half away from zero
            mean.round()
        }
        AggregationStrategy::LastValue => present[present.len() - 1],
    })
}

/// Establish chronological order and drop superseded duplicates.
///
/// A later occurrence of a period key (re-ingestion) replaces the earlier one.
pub fn sort_records(records: Vec<PeriodRecord>) -> Vec<PeriodRecord> {
    let mut latest: HashMap<String, usize> = HashMap::with_capacity(records.len());
    for (i, r) in records.iter().enumerate() {
        if let Some(prev) = latest.insert(r.period_key.clone(), i) {
            debug!(period = %r.period_key, superseded = prev, "period re-ingested, keeping latest row");
        }
    }

    let mut kept: Vec<PeriodRecord> = records
        .into_iter()
        .enumerate()
        .filter(|(i, r)| latest.get(&r.period_key) == Some(i))
        .map(|(_, r)| r)
        .collect();

    kept.sort_by(|a, b| {
        a.start_date
            .cmp(&b.start_date)
            .then_with(|| a.end_date.cmp(&b.end_date))
            .then_with(|| a.period_key.cmp(&b.period_key))
    });
    kept
}

/// Append empty columns until `slots` is reached.
///
/// Each synthetic column starts seven days after the previous column; when
/// there is no previous column, `first_start` seeds the sequence. Sequences
/// already at or above `slots` are returned unchanged.
pub fn pad_columns(
    mut columns: Vec<PeriodColumn>,
    slots: usize,
    first_start: Option<NaiveDate>,
) -> Vec<PeriodColumn> {
    while columns.len() < slots {
        let next_start = match columns.last() {
            Some(prev) => prev.start_date.map(period::next_week),
            None => first_start,
        };
        let label = next_start.map(period::week_label).unwrap_or_default();
        columns.push(PeriodColumn::padding(label, next_start));
    }
    columns
}

/// Strategy-driven period aggregator
pub struct PeriodAggregator<'a> {
    registry: &'a MetricRegistry,
    week_slots: usize,
}

impl<'a> PeriodAggregator<'a> {
    pub fn new(registry: &'a MetricRegistry) -> Self {
        Self {
            registry,
            week_slots: DEFAULT_WEEK_SLOTS,
        }
    }

    pub fn with_week_slots(registry: &'a MetricRegistry, week_slots: usize) -> Self {
        Self {
            registry,
            week_slots,
        }
    }

    pub fn week_slots(&self) -> usize {
        self.week_slots
    }

    /// Sort, de-duplicate and derive: the canonical form every view starts from
    pub fn prepare(&self, records: Vec<PeriodRecord>) -> Vec<PeriodRecord> {
        let sorted = sort_records(records);
        DeltaDeriver::derive(&sorted, self.registry)
    }

    /// Roll a window of records up into one set of metric values.
    ///
    /// Every registry key appears in the output; keys only seen in the
    /// records are rolled up with the passthrough strategy.
    pub fn rollup(&self, window: &[&PeriodRecord]) -> MetricValues {
        let mut keys: BTreeSet<&str> = self
            .registry
            .definitions()
            .iter()
            .map(|d| d.key.as_str())
            .collect();
        for record in window {
            keys.extend(record.values.keys().map(String::as_str));
        }

        keys.into_iter()
            .map(|key| {
                let values: Vec<Option<f64>> = window.iter().map(|r| r.value(key)).collect();
                let strategy = self.registry.strategy(key);
                (key.to_string(), aggregate(&values, strategy))
            })
            .collect()
    }

    /// Render the columns of a view
    pub fn view(
        &self,
        records: Vec<PeriodRecord>,
        request: ViewRequest,
        now: NaiveDateTime,
    ) -> Vec<PeriodColumn> {
        let prepared = self.prepare(records);
        match request.granularity {
            Granularity::Week => self.week_columns(&prepared, request.year, request.index, now),
            Granularity::Month => {
                vec![self.month_column(&prepared, request.year, request.index, now)]
            }
            Granularity::Quarter => {
                self.quarter_columns(&prepared, request.year, request.index, now)
            }
        }
    }

    /// Week view over prepared records: raw weeks of the month, padded, plus Total
    pub fn week_columns(
        &self,
        prepared: &[PeriodRecord],
        year: i32,
        month: u32,
        now: NaiveDateTime,
    ) -> Vec<PeriodColumn> {
        let current = period::current_index(prepared, now);

        let mut columns = Vec::new();
        let mut finalized: Vec<&PeriodRecord> = Vec::new();
        for (i, record) in prepared.iter().enumerate() {
            if !period::in_month(record.start_date, year, month) {
                continue;
            }
            let is_current = Some(i) == current;
            columns.push(PeriodColumn::from_record(
                record,
                period::week_label(record.start_date),
                is_current,
            ));
            if !is_current {
                finalized.push(record);
            }
        }

        let (first, last) = (
            columns.first().and_then(|c| c.start_date),
            columns.last().and_then(|c| c.end_date),
        );

        let mut columns = pad_columns(
            columns,
            self.week_slots,
            period::first_monday_of_month(year, month),
        );

        columns.push(PeriodColumn {
            label: TOTAL_LABEL.to_string(),
            kind: ColumnKind::Total,
            start_date: first,
            end_date: last,
            is_empty: finalized.is_empty(),
            is_current: false,
            is_total: true,
            values: self.rollup(&finalized),
        });
        columns
    }

    /// One monthly rollup over prepared records
    pub fn month_column(
        &self,
        prepared: &[PeriodRecord],
        year: i32,
        month: u32,
        now: NaiveDateTime,
    ) -> PeriodColumn {
        let current = period::current_index(prepared, now);
        let mut has_weeks = false;
        let mut is_current = false;
        let mut finalized: Vec<&PeriodRecord> = Vec::new();

        for (i, record) in prepared.iter().enumerate() {
            if !period::in_month(record.start_date, year, month) {
                continue;
            }
            has_weeks = true;
            if Some(i) == current {
                is_current = true;
            } else {
                finalized.push(record);
            }
        }

        PeriodColumn {
            label: period::month_label(year, month),
            kind: ColumnKind::Month,
            start_date: NaiveDate::from_ymd_opt(year, month, 1),
            end_date: period::last_day_of_month(year, month),
            is_empty: !has_weeks,
            is_current,
            is_total: false,
            values: self.rollup(&finalized),
        }
    }

    /// Quarter view over prepared records: three consecutive month rollups
    pub fn quarter_columns(
        &self,
        prepared: &[PeriodRecord],
        year: i32,
        quarter: u32,
        now: NaiveDateTime,
    ) -> Vec<PeriodColumn> {
        period::quarter_months(quarter)
            .iter()
            .map(|&month| self.month_column(prepared, year, month, now))
            .collect()
    }

    /// Month-to-date or quarter-to-date total over finalized weeks
    pub fn to_date_column(
        &self,
        prepared: &[PeriodRecord],
        request: ViewRequest,
        now: NaiveDateTime,
    ) -> PeriodColumn {
        let current = period::current_index(prepared, now);
        let months: Vec<u32> = match request.granularity {
            Granularity::Quarter => period::quarter_months(request.index).to_vec(),
            _ => vec![request.index],
        };
        let label = match request.granularity {
            Granularity::Quarter => "QTD",
            _ => "MTD",
        };

        let window: Vec<&PeriodRecord> = prepared
            .iter()
            .enumerate()
            .filter(|(i, r)| {
                Some(*i) != current
                    && months
                        .iter()
                        .any(|&m| period::in_month(r.start_date, request.year, m))
            })
            .map(|(_, r)| r)
            .collect();

        PeriodColumn {
            label: label.to_string(),
            kind: ColumnKind::Total,
            start_date: window.first().map(|r| r.start_date),
            end_date: window.last().map(|r| r.end_date),
            is_empty: window.is_empty(),
            is_current: false,
            is_total: true,
            values: self.rollup(&window),
        }
    }
}
