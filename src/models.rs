//! Core data structures shared across the pipeline stages.

use serde::{Deserialize, Serialize};

/// Calendar month, carried through the pipeline as the `mes` join key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    /// All months in calendar order.
    pub const ALL: [Month; 12] = [
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
    ];

    /// Three-letter uppercase abbreviation used in export files and join keys.
    pub fn abbrev(self) -> &'static str {
        match self {
            Month::Jan => "JAN",
            Month::Feb => "FEB",
            Month::Mar => "MAR",
            Month::Apr => "APR",
            Month::May => "MAY",
            Month::Jun => "JUN",
            Month::Jul => "JUL",
            Month::Aug => "AUG",
            Month::Sep => "SEP",
            Month::Oct => "OCT",
            Month::Nov => "NOV",
            Month::Dec => "DEC",
        }
    }

    /// Calendar number, 1 through 12.
    pub fn number(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_number(number: u8) -> Option<Month> {
        if number == 0 {
            return None;
        }
        Month::ALL.get(number as usize - 1).copied()
    }

    pub fn from_abbrev(abbrev: &str) -> Option<Month> {
        let normalized = abbrev.trim().to_uppercase();
        Month::ALL.iter().copied().find(|m| m.abbrev() == normalized)
    }
}

/// Yield metric measured for a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Production,
    Area,
}

impl Metric {
    /// Column name the metric occupies in the monthly table.
    pub fn column_name(self) -> &'static str {
        match self {
            Metric::Production => crate::constants::columns::PRODUCCION,
            Metric::Area => crate::constants::columns::AREA,
        }
    }
}

/// One wide spreadsheet row: a canton-year and its positional data cells.
///
/// The canton is kept raw here; normalization happens during conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct WideYieldRow {
    pub canton: String,
    pub anio: i32,
    pub valores: Vec<Option<f64>>,
}

/// Long-form yield observation: one (canton, year, month, metric) cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YieldRecord {
    pub canton: String,
    pub anio: i32,
    pub mes: Month,
    pub metric: Metric,
    pub valor: Option<f64>,
}

/// Normalize a region identifier into the canonical join key.
///
/// Both table producers call this before handing frames to the merger; the
/// merger itself never normalizes, so a producer that skips this step shows
/// up as unmatched keys rather than being silently repaired downstream.
pub fn normalize_region(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Numeric coercion applied to every data cell: blanks and non-numeric
/// text become nulls, never errors.
pub fn parse_numeric(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse().ok()
}
