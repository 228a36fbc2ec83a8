//! Value formatting
//!
//! Renders metric values for the rollup grid. Output is stable for a given
//! [`DisplayUnit`]: the same value and unit always produce the same text.

use crate::types::DisplayUnit;
use serde::{Deserialize, Serialize};

/// Placeholder for absent values
pub const ABSENT: &str = "—";

/// Default currency symbol
pub const DEFAULT_CURRENCY: &str = "€";

/// Default magnitude from which currency is abbreviated to thousands
pub const DEFAULT_ABBREVIATE_ABOVE: f64 = 1000.0;

/// Unit-driven value formatter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueFormatter {
    pub currency_symbol: String,
    pub abbreviate_above: f64,
}

impl Default for ValueFormatter {
    fn default() -> Self {
        Self {
            currency_symbol: DEFAULT_CURRENCY.to_string(),
            abbreviate_above: DEFAULT_ABBREVIATE_ABOVE,
        }
    }
}

impl ValueFormatter {
    pub fn new(currency_symbol: impl Into<String>, abbreviate_above: f64) -> Self {
        Self {
            currency_symbol: currency_symbol.into(),
            abbreviate_above,
        }
    }

    /// Format a possibly absent value
    pub fn format(&self, value: Option<f64>, unit: DisplayUnit) -> String {
        match value {
            Some(v) if v.is_finite() => self.format_value(v, unit),
            _ => ABSENT.to_string(),
        }
    }

    fn format_value(&self, value: f64, unit: DisplayUnit) -> String {
        match unit {
            DisplayUnit::Count => number(value),
            DisplayUnit::Percent => format!("{}%", number(value)),
            DisplayUnit::Hours => format!("{}h", number(value)),
            DisplayUnit::Currency => self.currency(value),
            DisplayUnit::CountDelta => signed(value, number(value.abs())),
            DisplayUnit::CurrencyDelta => signed(value, self.currency(value.abs())),
        }
    }

    fn currency(&self, value: f64) -> String {
        if value.abs() >= self.abbreviate_above {
            format!("{}{:.1}k", self.currency_symbol, value / 1000.0)
        } else {
            format!("{}{}", self.currency_symbol, number(value))
        }
    }
}

/// Integers without decimals, otherwise up to two decimals with trailing zeros trimmed
pub fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let text = format!("{:.2}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Sign follows the displayed precision, so a delta shown as zero is unsigned
fn signed(value: f64, magnitude: String) -> String {
    let shown = (value * 100.0).round() / 100.0;
    if shown > 0.0 {
        format!("+{}", magnitude)
    } else if shown < 0.0 {
        format!("-{}", magnitude)
    } else {
        magnitude
    }
}
