//! Reduction operations for [`crate::types::DataSet`].
//!
//! Besides the single-column [`reduce`], this module provides the two aggregate rates used to
//! compare neighborhoods against a wider area: [`ratio_of_sums`] (e.g. total unemployed over
//! total workforce) and [`weighted_mean`] (e.g. poverty percentage weighted by population).

use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{DataSet, DataType, Value};

/// Built-in reduction operations over a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceOp {
    /// Count all rows (including nulls).
    Count,
    /// Sum numeric values, ignoring nulls.
    Sum,
    /// Minimum numeric value, ignoring nulls.
    Min,
    /// Maximum numeric value, ignoring nulls.
    Max,
    /// Arithmetic mean of numeric values, ignoring nulls. Always `Float64`.
    Mean,
}

/// Reduce a column using a built-in [`ReduceOp`].
///
/// - Returns `None` if `column` does not exist in the schema.
/// - For `Sum`/`Min`/`Max`/`Mean`, returns `Some(Value::Null)` if there are no non-null values.
/// - `Sum` over an `Int64` column returns `Some(Value::Null)` if the total overflows `i64`.
/// - For `Count`, always returns `Some(Value::Int64(row_count))`.
pub fn reduce(dataset: &DataSet, column: &str, op: ReduceOp) -> Option<Value> {
    let idx = dataset.schema.index_of(column)?;

    match op {
        ReduceOp::Count => Some(Value::Int64(dataset.row_count() as i64)),
        ReduceOp::Mean => {
            let (sum, n) = dataset
                .column(column)?
                .filter_map(Value::as_f64)
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            Some(if n == 0 { Value::Null } else { Value::Float64(sum / n as f64) })
        }
        ReduceOp::Sum | ReduceOp::Min | ReduceOp::Max => {
            reduce_numeric_typed(dataset, idx, dataset.schema.fields[idx].data_type, op)
        }
    }
}

fn reduce_numeric_typed(
    dataset: &DataSet,
    idx: usize,
    data_type: DataType,
    op: ReduceOp,
) -> Option<Value> {
    match data_type {
        DataType::Int64 => {
            let mut acc: Option<i64> = None;
            for row in &dataset.rows {
                if let Some(Value::Int64(v)) = row.get(idx) {
                    let next = match (op, acc) {
                        (ReduceOp::Sum, Some(a)) => a.checked_add(*v),
                        (ReduceOp::Min, Some(a)) => Some(a.min(*v)),
                        (ReduceOp::Max, Some(a)) => Some(a.max(*v)),
                        (_, _) => Some(*v),
                    };
                    // Overflowed sum has no exact integer value.
                    let Some(next) = next else {
                        return Some(Value::Null);
                    };
                    acc = Some(next);
                }
            }
            Some(acc.map(Value::Int64).unwrap_or(Value::Null))
        }
        DataType::Float64 => {
            let mut acc: Option<f64> = None;
            for row in &dataset.rows {
                if let Some(Value::Float64(v)) = row.get(idx) {
                    if v.is_nan() {
                        continue;
                    }
                    acc = Some(match (op, acc) {
                        (ReduceOp::Sum, Some(a)) => a + v,
                        (ReduceOp::Min, Some(a)) => a.min(*v),
                        (ReduceOp::Max, Some(a)) => a.max(*v),
                        (_, _) => *v,
                    });
                }
            }
            Some(acc.map(Value::Float64).unwrap_or(Value::Null))
        }
        _ => Some(Value::Null),
    }
}

/// `sum(numerator) / sum(denominator) * scale` over rows where both are present and the
/// denominator is positive.
///
/// A row with a zero or negative denominator has no rate of its own, so it contributes to
/// neither sum. Returns `Value::Null` when no row qualifies.
pub fn ratio_of_sums(
    dataset: &DataSet,
    numerator: &str,
    denominator: &str,
    scale: f64,
) -> PipelineResult<Value> {
    let (n, d) = (column_index(dataset, numerator)?, column_index(dataset, denominator)?);
    let (num, den) = dataset.reduce_rows((0.0, 0.0), |(sn, sd), row| {
        match (row[n].as_f64(), row[d].as_f64()) {
            (Some(a), Some(b)) if b > 0.0 => (sn + a, sd + b),
            _ => (sn, sd),
        }
    });
    Ok(if den == 0.0 { Value::Null } else { Value::Float64(num / den * scale) })
}

/// `sum(value * weight) / sum(weight)` over rows with both present and a positive weight.
pub fn weighted_mean(dataset: &DataSet, value: &str, weight: &str) -> PipelineResult<Value> {
    let (v, w) = (column_index(dataset, value)?, column_index(dataset, weight)?);
    let (num, den) = dataset.reduce_rows((0.0, 0.0), |(sn, sw), row| {
        match (row[v].as_f64(), row[w].as_f64()) {
            (Some(x), Some(wt)) if wt > 0.0 => (sn + x * wt, sw + wt),
            _ => (sn, sw),
        }
    });
    Ok(if den == 0.0 { Value::Null } else { Value::Float64(num / den) })
}

fn column_index(dataset: &DataSet, name: &str) -> PipelineResult<usize> {
    dataset
        .schema
        .index_of(name)
        .ok_or_else(|| PipelineError::column_not_found(name, dataset.schema.field_names()))
}

/// A named summary computed after the merge.
///
/// Without a `source` the summary reads the merged table. With one it reads that source's
/// prepared table (after its filter and projection, before any join), so area-level rates are
/// not weighted by how many left rows each area matched.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Summary {
    pub name: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(flatten)]
    pub kind: SummaryKind,
}

/// The reduction behind a [`Summary`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    /// A single-column [`ReduceOp`].
    Column { column: String, op: ReduceOp },
    /// See [`ratio_of_sums`].
    RatioOfSums {
        numerator: String,
        denominator: String,
        #[serde(default = "default_scale")]
        scale: f64,
    },
    /// See [`weighted_mean`].
    WeightedMean { value: String, weight: String },
}

fn default_scale() -> f64 {
    100.0
}

impl Summary {
    /// Evaluate this summary against `dataset`.
    pub fn evaluate(&self, dataset: &DataSet) -> PipelineResult<Value> {
        match &self.kind {
            SummaryKind::Column { column, op } => reduce(dataset, column, *op)
                .ok_or_else(|| PipelineError::column_not_found(column, dataset.schema.field_names())),
            SummaryKind::RatioOfSums {
                numerator,
                denominator,
                scale,
            } => ratio_of_sums(dataset, numerator, denominator, *scale),
            SummaryKind::WeightedMean { value, weight } => weighted_mean(dataset, value, weight),
        }
    }
}
