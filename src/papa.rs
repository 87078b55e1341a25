//! Wide-to-long conversion of the potato yield table.
//!
//! The spreadsheet export carries one row per canton-year: an identifier
//! column, a year column, then value columns alternating between monthly
//! production and cultivated area in calendar order. [`WideToLongConverter`]
//! reshapes those rows into one record per (canton, anio, mes, metric), and
//! [`monthly_frame`] collapses the records into the keyed table handed to
//! the merger.

use std::collections::BTreeMap;
use std::path::Path;

use polars::prelude::*;
use tracing::{debug, info};

use crate::config::NullHandling;
use crate::constants::{columns, MAX_WIDE_VALUES, YEAR_COLUMN_ALIASES};
use crate::error::{PipelineError, Result};
use crate::models::{normalize_region, parse_numeric, Metric, Month, WideYieldRow, YieldRecord};

/// Read the wide yield table from a CSV export.
///
/// The first column is the canton. The year column is located by header
/// name and removed from the data cells; every remaining cell is read
/// positionally as an optional number.
pub fn read_wide_table(path: &Path) -> Result<Vec<WideYieldRow>> {
    if !path.exists() {
        return Err(PipelineError::InputNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let year_idx = headers
        .iter()
        .position(is_year_header)
        .ok_or_else(|| PipelineError::MissingYieldColumn {
            column: columns::ANIO.to_string(),
        })?;
    if year_idx == 0 {
        // The identifier column must come first; a year in slot zero means
        // the export has no canton column at all.
        return Err(PipelineError::MissingYieldColumn {
            column: columns::CANTON.to_string(),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let canton = record.get(0).unwrap_or("").to_string();
        if canton.is_empty() {
            debug!("skipping wide row without a canton identifier");
            continue;
        }
        let anio = match record.get(year_idx).and_then(|cell| cell.trim().parse::<i32>().ok()) {
            Some(year) => year,
            None => {
                debug!("skipping wide row for '{}' with unparseable year", canton);
                continue;
            }
        };
        let valores = record
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != 0 && *idx != year_idx)
            .map(|(_, cell)| parse_numeric(cell))
            .collect();
        rows.push(WideYieldRow { canton, anio, valores });
    }

    info!("read {} wide yield rows from {}", rows.len(), path.display());
    Ok(rows)
}

fn is_year_header(header: &str) -> bool {
    let lowered = header.trim().to_lowercase();
    YEAR_COLUMN_ALIASES.iter().any(|alias| *alias == lowered)
}

/// Pure reshape of wide yield rows into long-form records.
#[derive(Debug, Clone, Default)]
pub struct WideToLongConverter {
    region_filter: Option<String>,
    null_handling: NullHandling,
}

impl WideToLongConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict conversion to one canton, matched on the normalized key.
    pub fn with_region_filter(mut self, region: impl Into<String>) -> Self {
        self.region_filter = Some(normalize_region(&region.into()));
        self
    }

    pub fn with_null_handling(mut self, null_handling: NullHandling) -> Self {
        self.null_handling = null_handling;
        self
    }

    /// Reshape wide rows into long-form yield records.
    ///
    /// Data cells pair positionally: cell `2i` is month `i+1` production
    /// and cell `2i+1` is month `i+1` area. A trailing unpaired value
    /// becomes a production-only record; cells beyond the 24 calendar
    /// slots are ignored. A filter that matches nothing yields an empty
    /// vector, not an error.
    pub fn convert(&self, rows: &[WideYieldRow]) -> Vec<YieldRecord> {
        let mut records = Vec::new();
        for row in rows {
            let canton = normalize_region(&row.canton);
            if let Some(filter) = &self.region_filter {
                if &canton != filter {
                    continue;
                }
            }

            let cells = self.effective_cells(row);
            for (slot, valor) in cells.into_iter().take(MAX_WIDE_VALUES).enumerate() {
                let mes = Month::ALL[slot / 2];
                let metric = if slot % 2 == 0 { Metric::Production } else { Metric::Area };
                records.push(YieldRecord {
                    canton: canton.clone(),
                    anio: row.anio,
                    mes,
                    metric,
                    valor,
                });
            }
        }
        records
    }

    fn effective_cells(&self, row: &WideYieldRow) -> Vec<Option<f64>> {
        match self.null_handling {
            NullHandling::PreservePosition => {
                // Trailing nulls are just unfilled months; interior nulls
                // keep their calendar slot.
                let mut cells = row.valores.clone();
                while matches!(cells.last(), Some(None)) {
                    cells.pop();
                }
                cells
            }
            NullHandling::CompactLegacy => {
                row.valores.iter().copied().flatten().map(Some).collect()
            }
        }
    }
}

/// Collapse long records into one row per (canton, anio, mes) with the two
/// metric columns, in deterministic (canton, anio, calendar month) order.
pub fn monthly_frame(records: &[YieldRecord]) -> Result<DataFrame> {
    let mut grouped: BTreeMap<(String, i32, Month), (Option<f64>, Option<f64>)> = BTreeMap::new();
    for record in records {
        let entry = grouped
            .entry((record.canton.clone(), record.anio, record.mes))
            .or_default();
        match record.metric {
            Metric::Production => entry.0 = record.valor,
            Metric::Area => entry.1 = record.valor,
        }
    }

    let mut cantons = Vec::with_capacity(grouped.len());
    let mut anios = Vec::with_capacity(grouped.len());
    let mut meses: Vec<&'static str> = Vec::with_capacity(grouped.len());
    let mut producciones = Vec::with_capacity(grouped.len());
    let mut areas = Vec::with_capacity(grouped.len());
    for ((canton, anio, mes), (produccion, area)) in grouped {
        cantons.push(canton);
        anios.push(anio);
        meses.push(mes.abbrev());
        producciones.push(produccion);
        areas.push(area);
    }

    let frame = DataFrame::new(vec![
        Column::new(columns::CANTON.into(), cantons),
        Column::new(columns::ANIO.into(), anios),
        Column::new(columns::MES.into(), meses),
        Column::new(columns::PRODUCCION.into(), producciones),
        Column::new(columns::AREA.into(), areas),
    ])?;
    Ok(frame)
}
