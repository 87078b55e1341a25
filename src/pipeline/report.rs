//! Quality summary of the final merged dataset.

use std::fmt;

use polars::prelude::*;
use serde::Serialize;

use crate::constants::columns;
use crate::error::Result;

/// Structured key-value summary of the final table.
///
/// Logged and returned to the caller; never written into the artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub total_rows: usize,
    pub total_columns: usize,
    pub distinct_cantons: usize,
    pub distinct_years: usize,
    pub distinct_months: usize,
    pub missing_values: usize,
    pub completeness_pct: f64,
}

impl QualityReport {
    /// Compute the report from the merged frame.
    pub fn from_frame(frame: &DataFrame) -> Result<Self> {
        let total_rows = frame.height();
        let total_columns = frame.width();
        let missing_values: usize = frame.get_columns().iter().map(|c| c.null_count()).sum();
        let cells = total_rows * total_columns;
        let completeness_pct = if cells == 0 {
            // An empty table has nothing complete about it.
            0.0
        } else {
            (1.0 - missing_values as f64 / cells as f64) * 100.0
        };

        Ok(Self {
            total_rows,
            total_columns,
            distinct_cantons: distinct_count(frame, columns::CANTON)?,
            distinct_years: distinct_count(frame, columns::ANIO)?,
            distinct_months: distinct_count(frame, columns::MES)?,
            missing_values,
            completeness_pct,
        })
    }
}

/// Distinct values in a column; 0 when the column is absent.
fn distinct_count(frame: &DataFrame, name: &str) -> Result<usize> {
    match frame.column(name) {
        Ok(column) => Ok(column.as_materialized_series().n_unique()?),
        Err(_) => Ok(0),
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows={} columns={} cantons={} years={} months={} missing={} completeness={:.2}%",
            self.total_rows,
            self.total_columns,
            self.distinct_cantons,
            self.distinct_years,
            self.distinct_months,
            self.missing_values,
            self.completeness_pct
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new("canton".into(), vec!["TURRIALBA", "TURRIALBA", "CARTAGO"]),
            Column::new("anio".into(), vec![2020i32, 2021, 2020]),
            Column::new("mes".into(), vec!["JAN", "JAN", "FEB"]),
            Column::new("T2M".into(), vec![Some(21.5), None, Some(19.0)]),
            Column::new("produccion".into(), vec![Some(100.0), Some(90.0), None]),
        ])
        .unwrap()
    }

    #[test]
    fn report_counts_rows_columns_and_distincts() {
        let report = QualityReport::from_frame(&sample_frame()).unwrap();
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.total_columns, 5);
        assert_eq!(report.distinct_cantons, 2);
        assert_eq!(report.distinct_years, 2);
        assert_eq!(report.distinct_months, 2);
        assert_eq!(report.missing_values, 2);
    }

    #[test]
    fn completeness_follows_the_cell_ratio() {
        let report = QualityReport::from_frame(&sample_frame()).unwrap();
        let expected = (1.0 - 2.0 / 15.0) * 100.0;
        assert!((report.completeness_pct - expected).abs() < 1e-9);
        assert!(report.completeness_pct >= 0.0 && report.completeness_pct <= 100.0);
    }

    #[test]
    fn fully_populated_table_is_100_percent_complete() {
        let frame = DataFrame::new(vec![
            Column::new("canton".into(), vec!["X"]),
            Column::new("anio".into(), vec![2020i32]),
            Column::new("mes".into(), vec!["JAN"]),
        ])
        .unwrap();
        let report = QualityReport::from_frame(&frame).unwrap();
        assert_eq!(report.completeness_pct, 100.0);
        assert_eq!(report.missing_values, 0);
    }

    #[test]
    fn empty_frame_reports_zero_without_dividing_by_zero() {
        let report = QualityReport::from_frame(&DataFrame::default()).unwrap();
        assert_eq!(report.total_rows, 0);
        assert_eq!(report.total_columns, 0);
        assert_eq!(report.distinct_cantons, 0);
        assert_eq!(report.completeness_pct, 0.0);
    }
}
