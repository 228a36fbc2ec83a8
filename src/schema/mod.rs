//! Tabular input schema
//!
//! Period rows as exported from the weekly scorecard sheet, and the adapter
//! turning them into [`crate::types::PeriodRecord`]s.

mod adapter;
mod row;

pub use adapter::*;
pub use row::*;
