//! Adapter from tabular rows to period records
//!
//! Parses JSON arrays or NDJSON of [`PeriodRow`]s and converts them into
//! [`PeriodRecord`]s grouped by entity. Malformed rows are dropped with a
//! warning; the rest of the batch is kept.

use crate::error::ScorecardError;
use crate::schema::row::{PeriodRow, RowValidationError};
use crate::types::{EntityId, PeriodRecord};
use std::collections::BTreeMap;
use tracing::warn;

/// Entity id used for rows that do not name one
pub const DEFAULT_ENTITY: &str = "default";

/// Adapter for converting tabular rows to period records
pub struct RowAdapter;

impl RowAdapter {
    /// Parse a JSON string containing an array of rows.
    ///
    /// Elements that are not a readable row are dropped with a warning.
    pub fn parse_array(json: &str) -> Result<Vec<PeriodRow>, ScorecardError> {
        let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
        Ok(values
            .into_iter()
            .enumerate()
            .filter_map(|(idx, value)| read_row(idx, serde_json::from_value(value)))
            .collect())
    }

    /// Parse NDJSON (newline-delimited JSON) rows.
    ///
    /// Unreadable lines are dropped with a warning. Input where no line is
    /// readable is rejected as a whole.
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<PeriodRow>, ScorecardError> {
        let mut rows = Vec::new();
        let mut first_error = None;
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<PeriodRow>(trimmed) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!(line = line_num + 1, error = %e, "dropping unreadable row line");
                    first_error.get_or_insert_with(|| {
                        format!("Failed to parse line {}: {}", line_num + 1, e)
                    });
                }
            }
        }
        match first_error {
            Some(message) if rows.is_empty() => Err(ScorecardError::Parse(message)),
            _ => Ok(rows),
        }
    }

    /// Parse either format, sniffing a leading `[`
    pub fn parse(input: &str) -> Result<Vec<PeriodRow>, ScorecardError> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    /// Convert rows to records, dropping malformed ones
    pub fn to_records(rows: &[PeriodRow]) -> Vec<PeriodRecord> {
        rows.iter()
            .enumerate()
            .filter_map(|(idx, row)| convert(idx, row))
            .collect()
    }

    /// Convert rows to records grouped by entity.
    ///
    /// Rows without an entity belong to `default_entity`.
    pub fn to_records_by_entity(
        rows: &[PeriodRow],
        default_entity: &str,
    ) -> BTreeMap<EntityId, Vec<PeriodRecord>> {
        let mut grouped: BTreeMap<EntityId, Vec<PeriodRecord>> = BTreeMap::new();
        for (idx, row) in rows.iter().enumerate() {
            if let Some(record) = convert(idx, row) {
                let entity = row
                    .entity
                    .as_deref()
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .unwrap_or(default_entity);
                grouped.entry(entity.to_string()).or_default().push(record);
            }
        }
        grouped
    }

    /// Validate a batch of rows, returning only rows with problems
    pub fn validate_rows(rows: &[PeriodRow]) -> Vec<ValidationResult> {
        rows.iter()
            .enumerate()
            .map(|(idx, row)| ValidationResult {
                index: idx,
                period: row.period.clone(),
                errors: row.validate(),
            })
            .filter(|r| !r.errors.is_empty())
            .collect()
    }
}

fn read_row(idx: usize, parsed: Result<PeriodRow, serde_json::Error>) -> Option<PeriodRow> {
    match parsed {
        Ok(row) => Some(row),
        Err(e) => {
            let err = ScorecardError::MalformedPeriodRow {
                row: idx,
                reason: e.to_string(),
            };
            warn!(row = idx, error = %err, "dropping unreadable period row");
            None
        }
    }
}

fn convert(idx: usize, row: &PeriodRow) -> Option<PeriodRecord> {
    match row.to_record() {
        Ok((record, cell_errors)) => {
            for e in &cell_errors {
                warn!(row = idx, period = %record.period_key, error = %e, "unreadable cell treated as absent");
            }
            Some(record)
        }
        Err(e) => {
            let err = ScorecardError::MalformedPeriodRow {
                row: idx,
                reason: e.to_string(),
            };
            warn!(row = idx, error = %err, "dropping malformed period row");
            None
        }
    }
}

/// Validation outcome for one row
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ValidationResult {
    pub index: usize,
    pub period: Option<String>,
    #[serde(serialize_with = "errors_as_strings")]
    pub errors: Vec<RowValidationError>,
}

impl ValidationResult {
    /// Whether the row will be dropped
    pub fn is_dropped(&self) -> bool {
        self.errors.iter().any(RowValidationError::is_fatal)
    }
}

fn errors_as_strings<S: serde::Serializer>(
    errors: &[RowValidationError],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(|e| e.to_string()))
}
