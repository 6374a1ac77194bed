#![cfg(feature = "excel")]

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::error::{PipelineError, PipelineResult};
use crate::types::{exact_i64, DataSet, DataType, Schema, Value};

use super::ReadOptions;

/// Read one sheet of a workbook (`.xlsx`, `.xls`, `.ods`, etc.) into an in-memory `DataSet`.
///
/// Behavior:
/// - Picks `sheet_name` if provided; otherwise uses the first sheet in the workbook
/// - A named sheet that does not exist is [`PipelineError::SourceNotFound`]
/// - Detects the first non-empty row as the header row
/// - Validates that all schema fields exist as headers
/// - Skips `options.skip_rows` rows after the header, then converts cells into typed `Value`s
pub fn read_excel_from_path(
    path: impl AsRef<Path>,
    sheet_name: Option<&str>,
    schema: &Schema,
    options: &ReadOptions,
) -> PipelineResult<DataSet> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)?;

    let names = workbook.sheet_names().to_vec();
    let sheet = match sheet_name {
        Some(name) if names.iter().any(|n| n == name) => name.to_string(),
        Some(name) => {
            return Err(PipelineError::SourceNotFound {
                path: path.to_path_buf(),
                message: format!("sheet '{name}' not found; sheets={names:?}"),
            });
        }
        None => names
            .first()
            .cloned()
            .ok_or_else(|| PipelineError::SchemaMismatch {
                message: "workbook has no sheets".to_string(),
            })?,
    };

    let range = workbook.worksheet_range(&sheet)?;
    let rows = read_sheet_range(&sheet, &range, schema, options)?;
    Ok(DataSet::new(schema.clone(), rows))
}

fn read_sheet_range(
    sheet: &str,
    range: &calamine::Range<Data>,
    schema: &Schema,
    options: &ReadOptions,
) -> PipelineResult<Vec<Vec<Value>>> {
    let (header_row_idx, col_idxs) = build_header_projection(range, schema)
        .map_err(|e| wrap_schema_err_with_sheet(sheet, e))?;

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (idx0, row) in range.rows().enumerate() {
        if idx0 <= header_row_idx + options.skip_rows {
            continue;
        }

        // Report 1-based row number (Excel-like).
        let user_row = idx0 + 1;

        let mut out_row: Vec<Value> = Vec::with_capacity(schema.fields.len());
        for (field, &col_idx) in schema.fields.iter().zip(col_idxs.iter()) {
            let cell = row.get(col_idx).unwrap_or(&Data::Empty);
            let col_label = format!("{sheet}:{name}", name = field.name);
            let parsed = convert_cell(user_row, &col_label, field.data_type, cell);
            out_row.push(options.coerce(parsed)?);
        }
        rows.push(out_row);
    }

    Ok(rows)
}

fn wrap_schema_err_with_sheet(sheet: &str, err: PipelineError) -> PipelineError {
    match err {
        PipelineError::SchemaMismatch { message } => PipelineError::SchemaMismatch {
            message: format!("sheet '{sheet}': {message}"),
        },
        other => other,
    }
}

fn build_header_projection(
    range: &calamine::Range<Data>,
    schema: &Schema,
) -> PipelineResult<(usize, Vec<usize>)> {
    let (header_row_idx, header_cells) = range
        .rows()
        .enumerate()
        .find(|(_, row)| row.iter().any(|c| !matches!(c, Data::Empty)))
        .map(|(idx0, row)| (idx0, row.iter().map(cell_to_text).collect::<Vec<_>>()))
        .ok_or_else(|| PipelineError::SchemaMismatch {
            message: "sheet has no non-empty rows (no header row found)".to_string(),
        })?;

    // Build a projection of schema field -> column index by searching header_cells.
    let mut col_idxs: Vec<usize> = Vec::with_capacity(schema.fields.len());
    for f in &schema.fields {
        match header_cells.iter().position(|h| h.trim() == f.name) {
            Some(idx) => col_idxs.push(idx),
            None => {
                return Err(PipelineError::SchemaMismatch {
                    message: format!(
                        "missing required column '{}'. headers={:?}",
                        f.name, header_cells
                    ),
                });
            }
        }
    }

    Ok((header_row_idx, col_idxs))
}

// Integral floats print without a fraction so numeric ZIPs and school codes stay key-shaped.
fn cell_to_text(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => match exact_i64(*f) {
            Some(i) => i.to_string(),
            None => f.to_string(),
        },
        Data::Bool(b) => b.to_string(),
        Data::DateTime(f) => f.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
        Data::Empty => "".to_string(),
    }
}

fn convert_cell(row: usize, column: &str, data_type: DataType, c: &Data) -> PipelineResult<Value> {
    if matches!(c, Data::Empty) {
        return Ok(Value::Null);
    }
    if let Data::String(s) = c {
        if s.trim().is_empty() {
            return Ok(Value::Null);
        }
    }

    match data_type {
        DataType::Utf8 => Ok(Value::Utf8(match c {
            Data::String(s) => s.clone(),
            other => cell_to_text(other),
        })),
        DataType::Bool => parse_bool_cell(row, column, c).map(Value::Bool),
        DataType::Int64 => parse_i64_cell(row, column, c).map(Value::Int64),
        DataType::Float64 => parse_f64_cell(row, column, c).map(Value::Float64),
    }
}

fn parse_error(row: usize, column: &str, raw: String, message: impl Into<String>) -> PipelineError {
    PipelineError::ParseError {
        row,
        column: column.to_string(),
        raw,
        message: message.into(),
    }
}

fn parse_bool_cell(row: usize, column: &str, c: &Data) -> PipelineResult<bool> {
    match c {
        Data::Bool(b) => Ok(*b),
        Data::Int(i) => Ok(*i != 0),
        Data::Float(f) => Ok(*f != 0.0),
        Data::String(s) => super::parse_bool(s).map_err(|m| parse_error(row, column, s.clone(), m)),
        _ => Err(parse_error(row, column, c.to_string(), "expected bool")),
    }
}

fn parse_i64_cell(row: usize, column: &str, c: &Data) -> PipelineResult<i64> {
    match c {
        Data::Int(i) => Ok(*i),
        Data::Float(f) => exact_i64(*f).ok_or_else(|| {
            parse_error(
                row,
                column,
                c.to_string(),
                "expected integer (got non-integer or out-of-range float)",
            )
        }),
        Data::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| parse_error(row, column, s.clone(), e.to_string())),
        _ => Err(parse_error(row, column, c.to_string(), "expected integer")),
    }
}

fn parse_f64_cell(row: usize, column: &str, c: &Data) -> PipelineResult<f64> {
    match c {
        Data::Float(f) => Ok(*f),
        Data::Int(i) => Ok(*i as f64),
        Data::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| parse_error(row, column, s.clone(), e.to_string())),
        _ => Err(parse_error(row, column, c.to_string(), "expected number")),
    }
}
