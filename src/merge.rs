//! Keyed merge of the atmospheric and yield tables.
//!
//! The join key is (canton, anio, mes). Both producers normalize the
//! canton before this point; the merger deliberately does not touch it, so
//! an upstream normalization bug surfaces as unmatched keys here instead
//! of being papered over. Unmatched keys are counted per side and logged
//! before the join runs, since silent row loss is the costliest way this
//! pipeline can fail.

use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::config::JoinStrategy;
use crate::constants::columns;
use crate::error::{PipelineError, Result};
use crate::models::Month;

const MES_ORDER: &str = "__orden_mes";

/// Joins the two pipeline tables on (canton, anio, mes).
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetMerger {
    strategy: JoinStrategy,
}

impl DatasetMerger {
    pub fn new(strategy: JoinStrategy) -> Self {
        Self { strategy }
    }

    /// Merge the atmospheric table with the monthly yield table.
    ///
    /// The result carries the atmospheric parameter columns followed by
    /// the yield metric columns, one row per key, sorted by (canton, anio,
    /// calendar month).
    pub fn merge(&self, clima: &DataFrame, papa: &DataFrame) -> Result<DataFrame> {
        ensure_key_columns(clima, "atmospheric")?;
        ensure_key_columns(papa, "yield")?;

        self.report_unmatched(clima, papa)?;

        let join_type = match self.strategy {
            JoinStrategy::Inner => JoinType::Inner,
            JoinStrategy::Left => JoinType::Left,
        };
        let merged = clima
            .clone()
            .lazy()
            .join(
                papa.clone().lazy(),
                join_keys(),
                join_keys(),
                JoinArgs::new(join_type),
            )
            .with_column(month_order_expr().alias(MES_ORDER))
            .sort_by_exprs(
                [col(columns::CANTON), col(columns::ANIO), col(MES_ORDER)],
                SortMultipleOptions::default(),
            )
            .select([col("*").exclude([MES_ORDER])])
            .collect()?;

        info!(
            "merged dataset: {} rows x {} columns",
            merged.height(),
            merged.width()
        );
        Ok(merged)
    }

    /// Count join keys that will not find a partner, per side.
    fn report_unmatched(&self, clima: &DataFrame, papa: &DataFrame) -> Result<()> {
        let clima_only = clima
            .clone()
            .lazy()
            .join(
                papa.clone().lazy(),
                join_keys(),
                join_keys(),
                JoinArgs::new(JoinType::Anti),
            )
            .collect()?
            .height();
        let papa_only = papa
            .clone()
            .lazy()
            .join(
                clima.clone().lazy(),
                join_keys(),
                join_keys(),
                JoinArgs::new(JoinType::Anti),
            )
            .collect()?
            .height();

        if clima_only == 0 && papa_only == 0 {
            debug!("all (canton, anio, mes) keys matched on both sides");
        } else {
            warn!(
                "unmatched join keys: {} atmospheric rows, {} yield rows",
                clima_only, papa_only
            );
        }
        Ok(())
    }
}

fn join_keys() -> [Expr; 3] {
    [col(columns::CANTON), col(columns::ANIO), col(columns::MES)]
}

/// Maps the month abbreviation to its calendar number for sorting.
fn month_order_expr() -> Expr {
    Month::ALL
        .iter()
        .enumerate()
        .rev()
        .fold(lit(0i32), |acc, (idx, month)| {
            when(col(columns::MES).eq(lit(month.abbrev())))
                .then(lit(idx as i32 + 1))
                .otherwise(acc)
        })
}

fn ensure_key_columns(frame: &DataFrame, side: &'static str) -> Result<()> {
    for key in [columns::CANTON, columns::ANIO, columns::MES] {
        if frame.column(key).is_err() {
            return Err(PipelineError::MissingKeyColumn {
                side,
                column: key.to_string(),
            });
        }
    }
    Ok(())
}
