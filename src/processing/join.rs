//! Key joins between two [`DataSet`]s.
//!
//! The right side is indexed once by key (first occurrence wins) and probed for every left row,
//! so output row order always follows the left table.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{DataSet, Field, KeyValue, Schema, Value};

/// Which left rows survive the join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// Every left row, exactly once; unmatched rows get `Null` right-side columns.
    #[default]
    Left,
    /// Only left rows with a matching right row.
    Inner,
}

/// What to do when a right-side non-key column has the same name as a left column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Fail with [`PipelineError::SchemaConflict`].
    #[default]
    Error,
    /// Append this suffix to the right-side column name.
    Suffix(String),
}

/// Join behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOptions {
    pub kind: JoinKind,
    pub on_conflict: ConflictPolicy,
}

impl JoinOptions {
    pub fn left() -> Self {
        Self::default()
    }

    pub fn inner() -> Self {
        Self {
            kind: JoinKind::Inner,
            ..Self::default()
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.on_conflict = ConflictPolicy::Suffix(suffix.into());
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// Join `left` with `right` on the shared `keys`.
///
/// Output schema: every left column, then the right table's non-key columns in right order.
/// Right rows are matched by [`Value::matches`] on all keys; `Null` keys never match. When
/// several right rows share a key, the first one in right-row order is used.
///
/// Errors:
/// - [`PipelineError::InvalidConfig`] for an empty key list
/// - [`PipelineError::DuplicateColumn`] for a key listed twice
/// - [`PipelineError::KeyColumnMismatch`] if a key is missing from either side or its types can
///   never compare equal
/// - [`PipelineError::SchemaConflict`] if output column names collide
///
/// # Examples
///
/// ```rust
/// use school_econ_merge::processing::{join, JoinOptions};
/// use school_econ_merge::types::{DataSet, DataType, Field, Schema, Value};
///
/// let left = DataSet::new(
///     Schema::new(vec![Field::new("id", DataType::Int64), Field::new("ela", DataType::Int64)]),
///     vec![vec![Value::Int64(1), Value::Int64(80)], vec![Value::Int64(2), Value::Int64(70)]],
/// );
/// let right = DataSet::new(
///     Schema::new(vec![Field::new("id", DataType::Int64), Field::new("sci", DataType::Int64)]),
///     vec![vec![Value::Int64(1), Value::Int64(90)]],
/// );
///
/// let out = join(&left, &right, &["id"], &JoinOptions::left()).unwrap();
/// assert_eq!(out.row_count(), 2);
/// assert_eq!(out.rows[1], vec![Value::Int64(2), Value::Int64(70), Value::Null]);
/// ```
pub fn join<S: AsRef<str>>(
    left: &DataSet,
    right: &DataSet,
    keys: &[S],
    options: &JoinOptions,
) -> PipelineResult<DataSet> {
    if keys.is_empty() {
        return Err(PipelineError::InvalidConfig {
            message: "join requires at least one key column".to_string(),
        });
    }

    let mut left_keys = Vec::with_capacity(keys.len());
    let mut right_keys = Vec::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        let key = key.as_ref();
        if keys[..i].iter().any(|k| k.as_ref() == key) {
            return Err(PipelineError::DuplicateColumn {
                column: key.to_string(),
            });
        }
        let l = key_index(&left.schema, key, Side::Left)?;
        let r = key_index(&right.schema, key, Side::Right)?;
        let (lt, rt) = (left.schema.fields[l].data_type, right.schema.fields[r].data_type);
        if !lt.is_join_compatible(rt) {
            return Err(PipelineError::KeyColumnMismatch {
                column: key.to_string(),
                reason: format!("has type {lt:?} in the left table but {rt:?} in the right table"),
            });
        }
        left_keys.push(l);
        right_keys.push(r);
    }

    let carried: Vec<usize> = (0..right.schema.fields.len())
        .filter(|i| !right_keys.contains(i))
        .collect();
    let schema = output_schema(&left.schema, &right.schema, &carried, &options.on_conflict)?;

    let index = build_index(right, &right_keys);
    let mut rows = Vec::with_capacity(left.row_count());
    for row in &left.rows {
        let matched = row_key(row, &left_keys).and_then(|k| index.get(&k).copied());
        let right_values: Vec<Value> = match matched {
            Some(r) => carried.iter().map(|&c| right.rows[r][c].clone()).collect(),
            None if options.kind == JoinKind::Left => vec![Value::Null; carried.len()],
            None => continue,
        };
        let mut out = Vec::with_capacity(row.len() + right_values.len());
        out.extend_from_slice(row);
        out.extend(right_values);
        rows.push(out);
    }

    Ok(DataSet::new(schema, rows))
}

fn key_index(schema: &Schema, key: &str, side: Side) -> PipelineResult<usize> {
    schema
        .index_of(key)
        .ok_or_else(|| PipelineError::KeyColumnMismatch {
            column: key.to_string(),
            reason: format!(
                "is missing from the {side} table; columns={:?}",
                schema.field_names().collect::<Vec<_>>()
            ),
        })
}

fn output_schema(
    left: &Schema,
    right: &Schema,
    carried: &[usize],
    policy: &ConflictPolicy,
) -> PipelineResult<Schema> {
    let mut fields: Vec<Field> = left.fields.clone();
    for &c in carried {
        let mut field = right.fields[c].clone();
        if fields.iter().any(|f| f.name == field.name) {
            match policy {
                ConflictPolicy::Error => {
                    return Err(PipelineError::SchemaConflict {
                        column: field.name,
                        message: "column exists in both tables and is not a join key".to_string(),
                    });
                }
                ConflictPolicy::Suffix(suffix) => {
                    field.name = format!("{}{suffix}", field.name);
                    if fields.iter().any(|f| f.name == field.name) || right.index_of(&field.name).is_some() {
                        return Err(PipelineError::SchemaConflict {
                            column: field.name,
                            message: "suffixed column name is already taken".to_string(),
                        });
                    }
                }
            }
        }
        fields.push(field);
    }
    Ok(Schema::new(fields))
}

fn row_key(row: &[Value], idxs: &[usize]) -> Option<Vec<KeyValue>> {
    idxs.iter().map(|&i| row[i].key()).collect()
}

fn build_index(right: &DataSet, key_idxs: &[usize]) -> HashMap<Vec<KeyValue>, usize> {
    let mut index = HashMap::with_capacity(right.row_count());
    for (r, row) in right.rows.iter().enumerate() {
        if let Some(key) = row_key(row, key_idxs) {
            index.entry(key).or_insert(r);
        }
    }
    index
}
