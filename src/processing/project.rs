//! Column projection and renaming.

use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{DataSet, Field, Schema};

/// Keep only `columns`, in the given order.
///
/// Fails with [`PipelineError::ColumnNotFound`] for an unknown column and
/// [`PipelineError::DuplicateColumn`] when a name is requested twice. Row order and count are
/// unchanged.
pub fn select<S: AsRef<str>>(dataset: &DataSet, columns: &[S]) -> PipelineResult<DataSet> {
    let mut idxs: Vec<usize> = Vec::with_capacity(columns.len());
    for (i, name) in columns.iter().enumerate() {
        let name = name.as_ref();
        if columns[..i].iter().any(|c| c.as_ref() == name) {
            return Err(PipelineError::DuplicateColumn {
                column: name.to_string(),
            });
        }
        let idx = dataset
            .schema
            .index_of(name)
            .ok_or_else(|| PipelineError::column_not_found(name, dataset.schema.field_names()))?;
        idxs.push(idx);
    }

    let schema = Schema::new(idxs.iter().map(|&i| dataset.schema.fields[i].clone()).collect());
    let rows = dataset
        .rows
        .iter()
        .map(|row| idxs.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok(DataSet::new(schema, rows))
}

/// One `from -> to` column rename.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

impl Rename {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Rename columns, keeping their position, type and values.
///
/// Renames are applied simultaneously, so swapping two names is allowed. Fails with
/// [`PipelineError::ColumnNotFound`] if a source column is missing, and
/// [`PipelineError::SchemaConflict`] if one column is renamed twice or the result would contain
/// the same name twice.
pub fn rename(dataset: &DataSet, renames: &[Rename]) -> PipelineResult<DataSet> {
    let mut fields: Vec<Field> = dataset.schema.fields.clone();
    for (i, r) in renames.iter().enumerate() {
        if renames[..i].iter().any(|prev| prev.from == r.from) {
            return Err(PipelineError::SchemaConflict {
                column: r.from.clone(),
                message: "column is renamed twice".to_string(),
            });
        }
        let idx = dataset
            .schema
            .index_of(&r.from)
            .ok_or_else(|| PipelineError::column_not_found(&r.from, dataset.schema.field_names()))?;
        fields[idx].name = r.to.clone();
    }

    let schema = Schema::new(fields);
    if let Some(dup) = schema.first_duplicate() {
        return Err(PipelineError::SchemaConflict {
            column: dup.to_string(),
            message: "rename produces the same column name twice".to_string(),
        });
    }

    Ok(DataSet::new(schema, dataset.rows.clone()))
}
