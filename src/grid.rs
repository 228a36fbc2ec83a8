//! Rollup grid output
//!
//! Combines aggregation, classification and formatting into the
//! entity × column × metric grid consumed by dashboards, plus the header
//! summary of green/yellow/red counts across all entities.

use crate::aggregator::{PeriodAggregator, ViewRequest, DEFAULT_WEEK_SLOTS};
use crate::format::ValueFormatter;
use crate::metrics::MetricRegistry;
use crate::period;
use crate::types::{
    ColumnKind, DisplayUnit, EntityId, Granularity, PeriodColumn, PeriodRecord, Status,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// MTD and QTD windows for a view.
///
/// A quarter view takes its MTD from the month of `now` when `now` falls in
/// the quarter, otherwise from the quarter's last month.
fn to_date_windows(request: ViewRequest, now: NaiveDateTime) -> [ViewRequest; 2] {
    use chrono::Datelike;
    match request.granularity {
        Granularity::Quarter => {
            let months = period::quarter_months(request.index);
            let month = if now.year() == request.year && months.contains(&now.month()) {
                now.month()
            } else {
                months[2]
            };
            [ViewRequest::month(request.year, month), request]
        }
        Granularity::Week | Granularity::Month => [
            ViewRequest::month(request.year, request.index),
            ViewRequest::quarter(request.year, period::quarter_of(request.index)),
        ],
    }
}

/// One formatted and classified value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub value: Option<f64>,
    pub formatted: String,
    pub status: Status,
}

/// Column header without the values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnHeader {
    pub label: String,
    pub kind: ColumnKind,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_empty: bool,
    pub is_current: bool,
    pub is_total: bool,
}

impl From<&PeriodColumn> for ColumnHeader {
    fn from(column: &PeriodColumn) -> Self {
        Self {
            label: column.label.clone(),
            kind: column.kind,
            start_date: column.start_date,
            end_date: column.end_date,
            is_empty: column.is_empty,
            is_current: column.is_current,
            is_total: column.is_total,
        }
    }
}

/// One metric across all columns of a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRow {
    pub key: String,
    pub name: String,
    pub unit: DisplayUnit,
    /// False for keys missing from the registry (passthrough rows)
    pub known: bool,
    pub cells: Vec<GridCell>,
}

/// One entity's grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityGrid {
    pub entity_id: EntityId,
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<GridRow>,
}

impl EntityGrid {
    pub fn row(&self, key: &str) -> Option<&GridRow> {
        self.rows.iter().find(|r| r.key == key)
    }
}

/// Status counts over the latest finalized week of every entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricHealthSummary {
    pub green: usize,
    pub yellow: usize,
    pub red: usize,
    pub neutral: usize,
}

impl MetricHealthSummary {
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Green => self.green += 1,
            Status::Yellow => self.yellow += 1,
            Status::Red => self.red += 1,
            Status::Neutral => self.neutral += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.green + self.yellow + self.red + self.neutral
    }

    /// Summary for one entity's records.
    ///
    /// Uses the latest finalized week only; an in-progress week never counts.
    pub fn from_records(prepared: &[PeriodRecord], registry: &MetricRegistry, now: NaiveDateTime) -> Self {
        let mut summary = Self::default();
        let Some(idx) = period::latest_finalized_index(prepared, now) else {
            return summary;
        };
        let snapshot = &prepared[idx];
        for def in registry.definitions() {
            if def.visible_in(Granularity::Week) {
                summary.record(registry.classify(&def.key, snapshot.value(&def.key)));
            }
        }
        summary
    }

    pub fn merge(&mut self, other: &Self) {
        self.green += other.green;
        self.yellow += other.yellow;
        self.red += other.red;
        self.neutral += other.neutral;
    }
}

/// The complete rendered view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupGrid {
    pub view: ViewRequest,
    pub label: String,
    pub generated_for: NaiveDateTime,
    pub entities: Vec<EntityGrid>,
    pub summary: MetricHealthSummary,
}

/// Builds [`RollupGrid`]s from period records
pub struct GridBuilder<'a> {
    registry: &'a MetricRegistry,
    formatter: ValueFormatter,
    week_slots: usize,
    include_to_date: bool,
}

impl<'a> GridBuilder<'a> {
    pub fn new(registry: &'a MetricRegistry) -> Self {
        Self {
            registry,
            formatter: ValueFormatter::default(),
            week_slots: DEFAULT_WEEK_SLOTS,
            include_to_date: false,
        }
    }

    pub fn with_formatter(mut self, formatter: ValueFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_week_slots(mut self, week_slots: usize) -> Self {
        self.week_slots = week_slots;
        self
    }

    /// Append a QTD column to week and quarter views
    pub fn with_to_date(mut self, include: bool) -> Self {
        self.include_to_date = include;
        self
    }

    /// Render the view for every entity.
    ///
    /// Entities are independent: one entity's records never influence another's columns.
    pub fn build(
        &self,
        records: BTreeMap<EntityId, Vec<PeriodRecord>>,
        request: ViewRequest,
        now: NaiveDateTime,
    ) -> RollupGrid {
        let mut summary = MetricHealthSummary::default();
        let mut entities = Vec::with_capacity(records.len());

        for (entity_id, entity_records) in records {
            let aggregator = PeriodAggregator::with_week_slots(self.registry, self.week_slots);
            let prepared = aggregator.prepare(entity_records);
            summary.merge(&MetricHealthSummary::from_records(&prepared, self.registry, now));
            entities.push(self.entity_grid(&aggregator, entity_id, &prepared, request, now));
        }

        RollupGrid {
            view: request,
            label: view_label(request),
            generated_for: now,
            entities,
            summary,
        }
    }

    /// Render one entity from already prepared records
    pub fn entity_grid(
        &self,
        aggregator: &PeriodAggregator<'_>,
        entity_id: EntityId,
        prepared: &[PeriodRecord],
        request: ViewRequest,
        now: NaiveDateTime,
    ) -> EntityGrid {
        let mut columns = match request.granularity {
            Granularity::Week => aggregator.week_columns(prepared, request.year, request.index, now),
            Granularity::Month => vec![aggregator.month_column(prepared, request.year, request.index, now)],
            Granularity::Quarter => {
                aggregator.quarter_columns(prepared, request.year, request.index, now)
            }
        };

        if self.include_to_date {
            for window in to_date_windows(request, now) {
                columns.push(aggregator.to_date_column(prepared, window, now));
            }
        }

        let rows = self.rows(&columns, request.granularity);
        debug!(entity = %entity_id, columns = columns.len(), rows = rows.len(), "rendered entity grid");

        EntityGrid {
            entity_id,
            columns: columns.iter().map(ColumnHeader::from).collect(),
            rows,
        }
    }

    fn rows(&self, columns: &[PeriodColumn], granularity: Granularity) -> Vec<GridRow> {
        let mut rows: Vec<GridRow> = self
            .registry
            .definitions()
            .iter()
            .filter(|def| def.visible_in(granularity))
            .map(|def| GridRow {
                key: def.key.clone(),
                name: def.name.clone(),
                unit: def.unit,
                known: true,
                cells: columns.iter().map(|c| self.cell(&def.key, c)).collect(),
            })
            .collect();

        let unknown: BTreeSet<&str> = columns
            .iter()
            .flat_map(|c| c.values.keys())
            .map(String::as_str)
            .filter(|k| !self.registry.contains(k))
            .collect();

        for key in unknown {
            let def = self.registry.lookup(key);
            rows.push(GridRow {
                key: def.key.clone(),
                name: def.name.clone(),
                unit: def.unit,
                known: false,
                cells: columns.iter().map(|c| self.cell(key, c)).collect(),
            });
        }
        rows
    }

    fn cell(&self, key: &str, column: &PeriodColumn) -> GridCell {
        let value = column.value(key);
        let unit = self
            .registry
            .get(key)
            .map(|d| d.unit)
            .unwrap_or(DisplayUnit::Count);
        // Totals and in-progress columns are informational only
        let status = if column.is_total || column.is_current {
            Status::Neutral
        } else {
            self.registry.classify(key, value)
        };

        GridCell {
            value,
            formatted: self.formatter.format(value, unit),
            status,
        }
    }
}

/// Human label of a view, e.g. `Oct 2026` or `Q4 2026`
pub fn view_label(request: ViewRequest) -> String {
    match request.granularity {
        Granularity::Quarter => period::quarter_label(request.year, request.index),
        _ => period::month_label(request.year, request.index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn at(y: i32, m: u32, day: u32, h: u32) -> NaiveDateTime {
        d(y, m, day).and_hms_opt(h, 0, 0).unwrap()
    }

    fn week(key: &str, start: NaiveDate) -> PeriodRecord {
        PeriodRecord::new(key, start, start + Duration::days(6))
    }

    fn brand() -> Vec<PeriodRecord> {
        vec![
            week("W41", d(2026, 10, 5))
                .with_value("calls", Some(6.0))
                .with_value("cpl", Some(120.0))
                .with_value("mrr", Some(40_000.0)),
            week("W42", d(2026, 10, 12))
                .with_value("calls", Some(2.0))
                .with_value("cpl", Some(70.0))
                .with_value("mrr", Some(41_500.0)),
            // future relative to now
            week("W43", d(2026, 10, 19))
                .with_value("calls", Some(1.0))
                .with_value("mrr", Some(41_000.0)),
        ]
    }

    fn single(records: Vec<PeriodRecord>) -> BTreeMap<EntityId, Vec<PeriodRecord>> {
        let mut map = BTreeMap::new();
        map.insert("acme".to_string(), records);
        map
    }

    #[test]
    fn test_week_grid_cells() {
        let registry = MetricRegistry::builtin();
        let builder = GridBuilder::new(&registry).with_week_slots(4);
        let grid = builder.build(single(brand()), ViewRequest::week(2026, 10), at(2026, 10, 20, 9));

        let entity = &grid.entities[0];
        let labels: Vec<&str> = entity.columns.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["10/05", "10/12", "10/19", "10/26", "Total"]);

        let calls = entity.row("calls").unwrap();
        assert_eq!(calls.cells[0].status, Status::Green);
        assert_eq!(calls.cells[1].status, Status::Red);
        // current week shown but neutral
        assert_eq!(calls.cells[2].formatted, "1");
        assert_eq!(calls.cells[2].status, Status::Neutral);
        // padding
        assert_eq!(calls.cells[3].formatted, "—");
        // Total: 6 + 2, informational
        assert_eq!(calls.cells[4].value, Some(8.0));
        assert_eq!(calls.cells[4].status, Status::Neutral);

        let mrr = entity.row("mrr").unwrap();
        assert_eq!(mrr.cells[0].formatted, "€40.0k");
        assert_eq!(mrr.cells[4].value, Some(41_500.0));

        let delta = entity.row("mrrDelta").unwrap();
        assert_eq!(delta.cells[0].formatted, "€0");
        assert_eq!(delta.cells[1].formatted, "+€1.5k");
        assert_eq!(delta.cells[2].formatted, "-€500");
    }

    #[test]
    fn test_scope_filter_per_view() {
        let registry = MetricRegistry::builtin();
        let builder = GridBuilder::new(&registry);
        let now = at(2026, 12, 1, 0);

        let week = builder.build(single(brand()), ViewRequest::week(2026, 10), now);
        assert!(week.entities[0].row("mrrDelta").is_some());
        assert!(week.entities[0].row("editorsCount").is_none());

        let quarter = builder.build(single(brand()), ViewRequest::quarter(2026, 4), now);
        assert!(quarter.entities[0].row("mrrDelta").is_none());
        assert!(quarter.entities[0].row("editorsCount").is_some());
        assert_eq!(quarter.label, "Q4 2026");
        assert_eq!(quarter.entities[0].columns.len(), 3);
    }

    #[test]
    fn test_unknown_key_is_passthrough_row() {
        let registry = MetricRegistry::builtin();
        let builder = GridBuilder::new(&registry).with_week_slots(4);
        let records = vec![week("W41", d(2026, 10, 5)).with_value("npsRaw", Some(64.0))];
        let grid = builder.build(single(records), ViewRequest::week(2026, 10), at(2026, 11, 1, 0));

        let row = grid.entities[0].row("npsRaw").unwrap();
        assert!(!row.known);
        assert_eq!(row.cells[0].formatted, "64");
        assert_eq!(row.cells[0].status, Status::Neutral);
    }

    #[test]
    fn test_summary_uses_latest_finalized_week() {
        let registry = MetricRegistry::builtin();
        let aggregator = PeriodAggregator::new(&registry);
        let prepared = aggregator.prepare(brand());

        // W43 is in progress: the snapshot is W42
        let summary = MetricHealthSummary::from_records(&prepared, &registry, at(2026, 10, 20, 9));
        // calls 2 red, cpl 70 green, mrr 41.5k yellow, mrrDelta +1500 green
        assert_eq!(summary.green, 2);
        assert_eq!(summary.yellow, 1);
        assert_eq!(summary.red, 1);
        let week_visible = registry
            .definitions()
            .iter()
            .filter(|d| d.visible_in(Granularity::Week))
            .count();
        assert_eq!(summary.total(), week_visible);
    }

    #[test]
    fn test_summary_merges_entities() {
        let registry = MetricRegistry::builtin();
        let builder = GridBuilder::new(&registry);
        let mut records = single(brand());
        records.insert("empty".to_string(), Vec::new());
        let grid = builder.build(records, ViewRequest::week(2026, 10), at(2026, 10, 20, 9));
        assert_eq!(grid.entities.len(), 2);
        assert_eq!(grid.summary.red, 1);
    }

    #[test]
    fn test_to_date_columns() {
        let registry = MetricRegistry::builtin();
        let builder = GridBuilder::new(&registry).with_week_slots(4).with_to_date(true);
        let now = at(2026, 10, 20, 9);
        let grid = builder.build(single(brand()), ViewRequest::week(2026, 10), now);
        let entity = &grid.entities[0];
        let labels: Vec<&str> = entity.columns.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["10/05", "10/12", "10/19", "10/26", "Total", "MTD", "QTD"]);

        let calls = entity.row("calls").unwrap();
        assert_eq!(calls.cells[5].value, Some(8.0));
        assert_eq!(calls.cells[5].status, Status::Neutral);
        assert_eq!(calls.cells[6].value, Some(8.0));

        let month = builder.build(single(brand()), ViewRequest::month(2026, 10), now);
        let labels: Vec<&str> = month.entities[0].columns.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Oct 2026", "MTD", "QTD"]);

        let quarter = builder.build(single(brand()), ViewRequest::quarter(2026, 4), now);
        let columns = &quarter.entities[0].columns;
        assert_eq!(columns.len(), 5);
        assert_eq!(columns[3].label, "MTD");
        assert_eq!(columns[4].label, "QTD");
        assert_eq!(quarter.entities[0].row("calls").unwrap().cells[3].value, Some(8.0));
    }
}
