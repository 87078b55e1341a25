//! Parser for a single atmospheric export file.
//!
//! Exports carry an arbitrary preamble, then a column-header line starting
//! with `PARAMETER,YEAR` followed by the twelve month columns, then one
//! data row per (parameter, year). Parsing melts the month columns into
//! long form, averages duplicate (year, month, parameter) cells and pivots
//! the parameters back into one column each, keyed by (anio, mes).

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use polars::prelude::*;
use tracing::{debug, warn};

use crate::constants::{columns, HEADER_MARKER, MONTH_COLUMNS, PARAMETER_COLUMN, YEAR_COLUMN};
use crate::error::FileParseError;
use crate::models::{normalize_region, parse_numeric, Month};

/// Stateless parser for atmospheric export files.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtmosphericFileParser;

impl AtmosphericFileParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one export into a pivoted (canton, anio, mes, parameters...)
    /// table. Every failure here is non-fatal to the batch; the loader
    /// logs the reason and skips the file.
    pub fn parse(
        &self,
        path: &Path,
        region_id: &str,
    ) -> std::result::Result<DataFrame, FileParseError> {
        let raw = fs::read_to_string(path)?;
        let data_start = raw
            .lines()
            .position(|line| line.trim_start().starts_with(HEADER_MARKER))
            .ok_or(FileParseError::MissingHeader)?;
        let data_section = raw.lines().skip(data_start).collect::<Vec<_>>().join("\n");

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(data_section.as_bytes());

        let headers = reader.headers()?.clone();
        let layout = ColumnLayout::resolve(&headers)?;

        // (year, month) -> parameter -> mean accumulator. A cell entry is
        // created even when the value is null so the pivot keeps the slot.
        let mut groups: BTreeMap<(i32, Month), BTreeMap<String, MeanAcc>> = BTreeMap::new();
        let mut parameters: BTreeSet<String> = BTreeSet::new();
        let mut skipped_rows = 0usize;

        for record in reader.records() {
            let record = record?;
            let parameter = record.get(layout.parameter).unwrap_or("").to_string();
            if parameter.is_empty() {
                skipped_rows += 1;
                continue;
            }
            let anio = match record
                .get(layout.year)
                .and_then(|cell| cell.trim().parse::<i32>().ok())
            {
                Some(year) => year,
                None => {
                    skipped_rows += 1;
                    continue;
                }
            };
            parameters.insert(parameter.clone());
            for (slot, month) in Month::ALL.iter().enumerate() {
                let value = record.get(layout.months[slot]).and_then(parse_numeric);
                let acc = groups
                    .entry((anio, *month))
                    .or_default()
                    .entry(parameter.clone())
                    .or_default();
                if let Some(v) = value {
                    acc.push(v);
                }
            }
        }

        if skipped_rows > 0 {
            warn!(
                "{}: skipped {} rows without a usable parameter/year",
                path.display(),
                skipped_rows
            );
        }
        if groups.is_empty() {
            return Err(FileParseError::EmptyTable);
        }

        let frame = build_frame(&groups, &parameters, &normalize_region(region_id))?;
        debug!(
            "parsed {} into {} rows x {} columns",
            path.display(),
            frame.height(),
            frame.width()
        );
        Ok(frame)
    }
}

/// Indices of the required columns inside the header record.
struct ColumnLayout {
    parameter: usize,
    year: usize,
    months: [usize; 12],
}

impl ColumnLayout {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, FileParseError> {
        fn find(headers: &csv::StringRecord, name: &str, missing: &mut Vec<String>) -> usize {
            match headers.iter().position(|h| h == name) {
                Some(idx) => idx,
                None => {
                    missing.push(name.to_string());
                    0
                }
            }
        }

        let mut missing = Vec::new();
        let parameter = find(headers, PARAMETER_COLUMN, &mut missing);
        let year = find(headers, YEAR_COLUMN, &mut missing);
        let mut months = [0usize; 12];
        for (slot, name) in MONTH_COLUMNS.iter().enumerate() {
            months[slot] = find(headers, name, &mut missing);
        }
        if !missing.is_empty() {
            return Err(FileParseError::MissingColumns { missing });
        }
        Ok(Self {
            parameter,
            year,
            months,
        })
    }
}

/// Mean over the non-null duplicates of one (year, month, parameter) cell.
#[derive(Debug, Default, Clone, Copy)]
struct MeanAcc {
    sum: f64,
    count: u32,
}

impl MeanAcc {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

fn build_frame(
    groups: &BTreeMap<(i32, Month), BTreeMap<String, MeanAcc>>,
    parameters: &BTreeSet<String>,
    canton: &str,
) -> Result<DataFrame, FileParseError> {
    let height = groups.len();
    let mut anios = Vec::with_capacity(height);
    let mut meses: Vec<&'static str> = Vec::with_capacity(height);
    let mut param_values: BTreeMap<&String, Vec<Option<f64>>> = parameters
        .iter()
        .map(|p| (p, Vec::with_capacity(height)))
        .collect();

    for ((anio, mes), cells) in groups {
        anios.push(*anio);
        meses.push(mes.abbrev());
        for (parameter, values) in param_values.iter_mut() {
            values.push(cells.get(*parameter).copied().and_then(MeanAcc::mean));
        }
    }

    let mut cols = Vec::with_capacity(3 + parameters.len());
    cols.push(Column::new(
        columns::CANTON.into(),
        vec![canton.to_string(); height],
    ));
    cols.push(Column::new(columns::ANIO.into(), anios));
    cols.push(Column::new(columns::MES.into(), meses));
    for (parameter, values) in param_values {
        cols.push(Column::new(parameter.as_str().into(), values));
    }
    Ok(DataFrame::new(cols)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PREAMBLE: &str = "-BEGIN HEADER-\n\
        NASA/POWER style export for a single location\n\
        Dates (month/day/year): 01/01/2020 through 12/31/2020\n\
        -END HEADER-\n";

    fn write_export(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn header_line() -> String {
        format!("PARAMETER,YEAR,{}", MONTH_COLUMNS.join(","))
    }

    #[test]
    fn parses_a_well_formed_export() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "{}{}\nT2M,2020,21.1,21.5,22.0,22.4,22.8,22.5,22.1,22.3,22.6,22.4,21.9,21.4\n\
             PRECTOT,2020,5.0,4.0,3.0,2.0,1.0,0.5,0.4,0.6,1.5,3.5,5.5,6.0\n",
            PREAMBLE,
            header_line()
        );
        let path = write_export(&dir, "Turrialba.csv", &body);

        let frame = AtmosphericFileParser::new()
            .parse(&path, "Turrialba")
            .unwrap();

        assert_eq!(frame.height(), 12);
        let names: Vec<&str> = frame.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["canton", "anio", "mes", "PRECTOT", "T2M"]);

        let cantons = frame.column("canton").unwrap().str().unwrap();
        assert_eq!(cantons.get(0), Some("TURRIALBA"));
        let meses = frame.column("mes").unwrap().str().unwrap();
        assert_eq!(meses.get(0), Some("JAN"));
        assert_eq!(meses.get(11), Some("DEC"));
        let t2m = frame.column("T2M").unwrap().f64().unwrap();
        assert_eq!(t2m.get(0), Some(21.1));
        assert_eq!(t2m.get(11), Some(21.4));
    }

    #[test]
    fn header_may_sit_anywhere_in_the_file() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "one\ntwo\nthree\nfour\nfive\n  {}\nT2M,2020,1,2,3,4,5,6,7,8,9,10,11,12\n",
            header_line()
        );
        let path = write_export(&dir, "x.csv", &body);
        let frame = AtmosphericFileParser::new().parse(&path, "x").unwrap();
        assert_eq!(frame.height(), 12);
    }

    #[test]
    fn missing_marker_fails_with_missing_header() {
        let dir = TempDir::new().unwrap();
        let path = write_export(&dir, "x.csv", "just,some,rows\n1,2,3\n");
        let err = AtmosphericFileParser::new().parse(&path, "x").unwrap_err();
        assert!(matches!(err, FileParseError::MissingHeader));
    }

    #[test]
    fn missing_month_columns_are_listed() {
        let dir = TempDir::new().unwrap();
        // Header line keeps the marker prefix but drops NOV and DEC.
        let body = "PARAMETER,YEAR,JAN,FEB,MAR,APR,MAY,JUN,JUL,AUG,SEP,OCT\n\
                    T2M,2020,1,2,3,4,5,6,7,8,9,10\n";
        let path = write_export(&dir, "x.csv", body);
        let err = AtmosphericFileParser::new().parse(&path, "x").unwrap_err();
        match err {
            FileParseError::MissingColumns { missing } => {
                assert_eq!(missing, vec!["NOV".to_string(), "DEC".to_string()]);
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn empty_data_section_fails_with_empty_table() {
        let dir = TempDir::new().unwrap();
        let body = format!("{}{}\n", PREAMBLE, header_line());
        let path = write_export(&dir, "x.csv", &body);
        let err = AtmosphericFileParser::new().parse(&path, "x").unwrap_err();
        assert!(matches!(err, FileParseError::EmptyTable));
    }

    #[test]
    fn rows_with_unparseable_years_are_skipped() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "{}\nT2M,ANN,1,2,3,4,5,6,7,8,9,10,11,12\n\
             T2M,2020,1,2,3,4,5,6,7,8,9,10,11,12\n",
            header_line()
        );
        let path = write_export(&dir, "x.csv", &body);
        let frame = AtmosphericFileParser::new().parse(&path, "x").unwrap();
        assert_eq!(frame.height(), 12);
        let anios = frame.column("anio").unwrap().i32().unwrap();
        assert_eq!(anios.get(0), Some(2020));
    }

    #[test]
    fn non_numeric_cells_become_null() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "{}\nT2M,2020,-999,n/a,,3.5,5,6,7,8,9,10,11,12\n",
            header_line()
        );
        let path = write_export(&dir, "x.csv", &body);
        let frame = AtmosphericFileParser::new().parse(&path, "x").unwrap();
        let t2m = frame.column("T2M").unwrap().f64().unwrap();
        assert_eq!(t2m.get(0), Some(-999.0));
        assert_eq!(t2m.get(1), None);
        assert_eq!(t2m.get(2), None);
        assert_eq!(t2m.get(3), Some(3.5));
    }

    #[test]
    fn duplicate_parameter_rows_are_averaged() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "{}\nT2M,2020,10,2,3,4,5,6,7,8,9,10,11,12\n\
             T2M,2020,20,2,3,4,5,6,7,8,9,10,11,12\n",
            header_line()
        );
        let path = write_export(&dir, "x.csv", &body);
        let frame = AtmosphericFileParser::new().parse(&path, "x").unwrap();
        assert_eq!(frame.height(), 12);
        let t2m = frame.column("T2M").unwrap().f64().unwrap();
        assert_eq!(t2m.get(0), Some(15.0));
    }

    #[test]
    fn multiple_years_sort_by_year_then_month() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "{}\nT2M,2021,1,2,3,4,5,6,7,8,9,10,11,12\n\
             T2M,2020,1,2,3,4,5,6,7,8,9,10,11,12\n",
            header_line()
        );
        let path = write_export(&dir, "x.csv", &body);
        let frame = AtmosphericFileParser::new().parse(&path, "x").unwrap();
        assert_eq!(frame.height(), 24);
        let anios = frame.column("anio").unwrap().i32().unwrap();
        assert_eq!(anios.get(0), Some(2020));
        assert_eq!(anios.get(23), Some(2021));
    }

    #[test]
    fn region_id_is_normalized_onto_the_canton_column() {
        let dir = TempDir::new().unwrap();
        let body = format!("{}\nT2M,2020,1,2,3,4,5,6,7,8,9,10,11,12\n", header_line());
        let path = write_export(&dir, "x.csv", &body);
        let frame = AtmosphericFileParser::new().parse(&path, " oreamuno ").unwrap();
        let cantons = frame.column("canton").unwrap().str().unwrap();
        assert_eq!(cantons.get(0), Some("OREAMUNO"));
    }
}
