//! Row mapping and derived columns for [`crate::types::DataSet`].

use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{DataSet, DataType, Field, Schema, Value};

use super::normalize::{normalize, text_of, KeyTransform};

/// Returns a new [`DataSet`] by applying `mapper` to every row.
///
/// This is a convenience wrapper around [`DataSet::map_rows`].
///
/// # Panics
///
/// Panics if `mapper` returns rows with a different length than the schema field count.
pub fn map<F>(dataset: &DataSet, mapper: F) -> DataSet
where
    F: FnMut(&[Value]) -> Vec<Value>,
{
    dataset.map_rows(mapper)
}

/// Append a column computed from each row.
///
/// Fails with [`PipelineError::DuplicateColumn`] if `name` already exists.
pub fn with_column<F>(dataset: &DataSet, field: Field, mut compute: F) -> PipelineResult<DataSet>
where
    F: FnMut(&[Value]) -> Value,
{
    if dataset.schema.index_of(&field.name).is_some() {
        return Err(PipelineError::DuplicateColumn { column: field.name });
    }

    let mut fields = dataset.schema.fields.clone();
    fields.push(field);
    let rows = dataset
        .rows
        .iter()
        .map(|row| {
            let mut out = Vec::with_capacity(row.len() + 1);
            out.extend_from_slice(row);
            out.push(compute(row.as_slice()));
            out
        })
        .collect();
    Ok(DataSet::new(Schema::new(fields), rows))
}

/// How a derived column is computed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivation {
    /// Normalize one column's value through [`KeyTransform`] steps.
    Normalize {
        source: String,
        steps: Vec<KeyTransform>,
    },
    /// Concatenate the text forms of several columns; any `Null` part gives `Null`.
    Concat { columns: Vec<String> },
    /// `numerator / denominator * 100`; `Null` when either is missing or the denominator is 0.
    Percentage {
        numerator: String,
        denominator: String,
    },
}

/// A derived column: its name plus how to compute it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeriveColumn {
    pub name: String,
    #[serde(flatten)]
    pub derivation: Derivation,
}

impl DeriveColumn {
    pub fn new(name: impl Into<String>, derivation: Derivation) -> Self {
        Self {
            name: name.into(),
            derivation,
        }
    }
}

/// Append the derived column described by `spec`.
///
/// Input columns are resolved up front; a missing one is [`PipelineError::ColumnNotFound`].
pub fn derive(dataset: &DataSet, spec: &DeriveColumn) -> PipelineResult<DataSet> {
    let schema = &dataset.schema;
    let resolve = |name: &str| {
        schema
            .index_of(name)
            .ok_or_else(|| PipelineError::column_not_found(name, schema.field_names()))
    };

    match &spec.derivation {
        Derivation::Normalize { source, steps } => {
            let idx = resolve(source)?;
            let data_type = steps
                .last()
                .map(KeyTransform::output_type)
                .unwrap_or(schema.fields[idx].data_type);
            with_column(dataset, Field::new(&spec.name, data_type), |row| {
                normalize(&row[idx], steps)
            })
        }
        Derivation::Concat { columns } => {
            let idxs = columns
                .iter()
                .map(|c| resolve(c))
                .collect::<PipelineResult<Vec<_>>>()?;
            with_column(dataset, Field::new(&spec.name, DataType::Utf8), |row| {
                let mut out = String::new();
                for &i in &idxs {
                    if row[i].is_null() {
                        return Value::Null;
                    }
                    out.push_str(&text_of(&row[i]));
                }
                Value::Utf8(out)
            })
        }
        Derivation::Percentage {
            numerator,
            denominator,
        } => {
            let n = resolve(numerator)?;
            let d = resolve(denominator)?;
            with_column(dataset, Field::new(&spec.name, DataType::Float64), |row| {
                match (row[n].as_f64(), row[d].as_f64()) {
                    (Some(num), Some(den)) if den != 0.0 => Value::Float64(num / den * 100.0),
                    _ => Value::Null,
                }
            })
        }
    }
}
