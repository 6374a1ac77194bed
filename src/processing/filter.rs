//! Row filtering for [`crate::types::DataSet`].

use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{DataSet, Value};

/// Returns a new [`DataSet`] containing only rows for which `predicate` returns `true`.
///
/// This is a convenience wrapper around [`DataSet::filter_rows`].
pub fn filter<F>(dataset: &DataSet, predicate: F) -> DataSet
where
    F: FnMut(&[Value]) -> bool,
{
    dataset.filter_rows(predicate)
}

/// A named-column row predicate.
///
/// Comparisons use [`Value::matches`]: a `Null` cell never satisfies `Equals` or `In`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Column equals the value.
    Equals { column: String, value: Value },
    /// Column equals any of the values.
    In { column: String, values: Vec<Value> },
    /// Column is not the missing marker.
    NotNull { column: String },
}

impl Predicate {
    pub fn equals(column: impl Into<String>, value: Value) -> Self {
        Predicate::Equals {
            column: column.into(),
            value,
        }
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Predicate::In {
            column: column.into(),
            values,
        }
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Predicate::NotNull {
            column: column.into(),
        }
    }

    /// Column this predicate reads.
    pub fn column(&self) -> &str {
        match self {
            Predicate::Equals { column, .. }
            | Predicate::In { column, .. }
            | Predicate::NotNull { column } => column,
        }
    }

    fn test(&self, cell: &Value) -> bool {
        match self {
            Predicate::Equals { value, .. } => cell.matches(value),
            Predicate::In { values, .. } => values.iter().any(|v| cell.matches(v)),
            Predicate::NotNull { .. } => match cell {
                Value::Null => false,
                Value::Float64(v) => !v.is_nan(),
                _ => true,
            },
        }
    }
}

/// Keep rows where every predicate holds.
///
/// All referenced columns are resolved before any row is scanned, so a missing column is a
/// [`PipelineError::ColumnNotFound`] even when the table is empty. Row order is preserved.
pub fn filter_by(dataset: &DataSet, predicates: &[Predicate]) -> PipelineResult<DataSet> {
    let resolved = predicates
        .iter()
        .map(|p| {
            dataset
                .schema
                .index_of(p.column())
                .map(|idx| (idx, p))
                .ok_or_else(|| PipelineError::column_not_found(p.column(), dataset.schema.field_names()))
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    Ok(dataset.filter_rows(|row| resolved.iter().all(|(idx, p)| p.test(&row[*idx]))))
}

/// Serde form of [`Predicate`], as written in pipeline configs.
///
/// ```json
/// {"column": "City", "equals": "Chicago"}
/// {"column": "zip_code", "in": [60621, 60636]}
/// {"column": "RCDTS", "not_null": true}
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredicateConfig {
    pub column: String,
    #[serde(default)]
    pub equals: Option<ScalarConfig>,
    #[serde(default, rename = "in")]
    pub one_of: Option<Vec<ScalarConfig>>,
    #[serde(default)]
    pub not_null: bool,
}

/// A literal value in a config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScalarConfig {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<ScalarConfig> for Value {
    fn from(s: ScalarConfig) -> Self {
        match s {
            ScalarConfig::Bool(b) => Value::Bool(b),
            ScalarConfig::Int(i) => Value::Int64(i),
            ScalarConfig::Float(f) => Value::Float64(f),
            ScalarConfig::Text(t) => Value::Utf8(t),
        }
    }
}

impl TryFrom<PredicateConfig> for Predicate {
    type Error = PipelineError;

    fn try_from(c: PredicateConfig) -> PipelineResult<Self> {
        match (c.equals, c.one_of, c.not_null) {
            (Some(v), None, false) => Ok(Predicate::equals(c.column, v.into())),
            (None, Some(vs), false) => Ok(Predicate::is_in(
                c.column,
                vs.into_iter().map(Value::from).collect(),
            )),
            (None, None, true) => Ok(Predicate::not_null(c.column)),
            _ => Err(PipelineError::InvalidConfig {
                message: format!(
                    "filter on '{}' must set exactly one of 'equals', 'in', 'not_null'",
                    c.column
                ),
            }),
        }
    }
}
