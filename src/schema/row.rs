//! Tabular period row schema
//!
//! One row per entity and week, as exported from a spreadsheet:
//!
//! ```json
//! {"week": "W41", "start": "2026-10-05", "end": "2026-10-11", "calls": 6, "mrr": "€41,500"}
//! ```
//!
//! Every field other than the period id, dates and entity is a metric cell.

use crate::types::{MetricValues, PeriodRecord};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accepted date formats, tried in order
pub const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Days added to a start date when a row has no end date
const WEEK_SPAN_DAYS: i64 = 6;

/// Raw cell contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

/// One raw tabular row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRow {
    /// Period identifier
    #[serde(alias = "week", alias = "period_key", default, deserialize_with = "text_or_number")]
    pub period: Option<String>,
    #[serde(alias = "start_date", default, deserialize_with = "text_or_number")]
    pub start: Option<String>,
    #[serde(alias = "end_date", default, deserialize_with = "text_or_number")]
    pub end: Option<String>,
    /// Owning entity, if the sheet holds several
    #[serde(alias = "entity_id", alias = "brand", default, deserialize_with = "text_or_number")]
    pub entity: Option<String>,
    /// Metric key -> cell
    #[serde(flatten)]
    pub cells: BTreeMap<String, Option<CellValue>>,
}

/// Key columns exported as numbers (`"week": 41`) are read as text
fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Key {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(Option::<Key>::deserialize(deserializer)?.map(|key| match key {
        Key::Text(s) => s,
        Key::Integer(i) => i.to_string(),
        Key::Float(f) => crate::format::number(f),
    }))
}

/// Row-level validation problems
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowValidationError {
    #[error("missing period identifier")]
    MissingPeriod,

    #[error("missing start date")]
    MissingStart,

    #[error("unparseable date: {0}")]
    InvalidDate(String),

    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("cell {key} is not a number: {raw}")]
    InvalidCell { key: String, raw: String },
}

impl RowValidationError {
    /// Whether the error drops the whole row (cell errors only blank the cell)
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RowValidationError::InvalidCell { .. })
    }
}

impl PeriodRow {
    /// Convert to a record, blanking unreadable cells.
    ///
    /// Returns the record and the cell errors, or the first fatal error.
    pub fn to_record(&self) -> Result<(PeriodRecord, Vec<RowValidationError>), RowValidationError> {
        let period = self
            .period
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(RowValidationError::MissingPeriod)?;

        let start = match self.start.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => parse_date(s)?,
            _ => return Err(RowValidationError::MissingStart),
        };
        let end = match self.end.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => parse_date(s)?,
            _ => start + Duration::days(WEEK_SPAN_DAYS),
        };
        if start > end {
            return Err(RowValidationError::InvertedRange { start, end });
        }

        let mut values = MetricValues::new();
        let mut cell_errors = Vec::new();
        for (key, cell) in &self.cells {
            match parse_cell(cell.as_ref()) {
                Ok(value) => {
                    values.insert(key.clone(), value);
                }
                Err(raw) => {
                    values.insert(key.clone(), None);
                    cell_errors.push(RowValidationError::InvalidCell {
                        key: key.clone(),
                        raw,
                    });
                }
            }
        }

        Ok((
            PeriodRecord {
                period_key: period.to_string(),
                start_date: start,
                end_date: end,
                values,
            },
            cell_errors,
        ))
    }

    /// Every problem with this row, fatal or not
    pub fn validate(&self) -> Vec<RowValidationError> {
        match self.to_record() {
            Ok((_, cell_errors)) => cell_errors,
            Err(fatal) => vec![fatal],
        }
    }
}

/// Parse a date in any of the accepted formats
pub fn parse_date(raw: &str) -> Result<NaiveDate, RowValidationError> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| RowValidationError::InvalidDate(raw.to_string()))
}

/// Parse one cell; blank means absent, `Err` carries the unreadable text
pub fn parse_cell(cell: Option<&CellValue>) -> Result<Option<f64>, String> {
    match cell {
        None => Ok(None),
        Some(CellValue::Number(n)) if n.is_finite() => Ok(Some(*n)),
        Some(CellValue::Number(n)) => Err(n.to_string()),
        Some(CellValue::Text(s)) => parse_number(s).ok_or_else(|| s.clone()),
        Some(CellValue::Other(v)) => Err(v.to_string()),
    }
}

/// Parse a spreadsheet-formatted number such as `€41,500`, `35%`, `48h` or `42.5k`.
///
/// Blank and dash placeholders parse as absent.
pub fn parse_number(raw: &str) -> Option<Option<f64>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || matches!(trimmed, "-" | "—" | "n/a" | "N/A") {
        return Some(None);
    }

    let mut text: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '€' | '$' | '%' | ',' | ' ' | '\u{a0}'))
        .collect();
    if text.ends_with('h') {
        text.pop();
    }
    let multiplier = if text.ends_with(['k', 'K']) {
        text.pop();
        1000.0
    } else {
        1.0
    };

    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| Some(v * multiplier))
}
