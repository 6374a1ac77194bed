//! Output writers.
//!
//! [`write_dataset`] writes the final table to a single file. The data goes to a temporary sibling
//! file first and is renamed over the destination only once it is complete, so a failed run never
//! leaves a partial output behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{DataSet, Value};

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkFormat {
    Csv,
    /// Single-sheet `.xlsx` workbook (feature `xlsx_writer`).
    Xlsx,
}

impl SinkFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            _ => None,
        }
    }
}

/// Where and how to write the output table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSpec {
    pub path: PathBuf,
    /// If `None`, inferred from the extension (defaults to CSV).
    pub format: Option<SinkFormat>,
    /// Text written for [`Value::Null`] cells.
    pub null_marker: String,
}

impl SinkSpec {
    pub fn csv(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: Some(SinkFormat::Csv),
            null_marker: String::new(),
        }
    }

    pub fn with_null_marker(mut self, marker: impl Into<String>) -> Self {
        self.null_marker = marker.into();
        self
    }

    fn resolved_format(&self) -> SinkFormat {
        self.format
            .or_else(|| {
                self.path
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(SinkFormat::from_extension)
            })
            .unwrap_or(SinkFormat::Csv)
    }
}

/// Write `dataset` to `spec.path`, header first, preserving column and row order.
pub fn write_dataset(dataset: &DataSet, spec: &SinkSpec) -> PipelineResult<()> {
    let path = spec.path.as_path();
    let write_err = |message: String| PipelineError::WriteError {
        path: path.to_path_buf(),
        message,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }

    let tmp = temp_path(path);
    let written = match spec.resolved_format() {
        SinkFormat::Csv => write_csv(dataset, &tmp, &spec.null_marker),
        SinkFormat::Xlsx => write_xlsx(dataset, &tmp, &spec.null_marker),
    };

    let result = written.and_then(|()| fs::rename(&tmp, path).map_err(|e| e.to_string()));
    if let Err(message) = result {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(message));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

fn cell_text(value: &Value, null_marker: &str) -> String {
    match value {
        Value::Null => null_marker.to_string(),
        other => other.to_string(),
    }
}

fn write_csv(dataset: &DataSet, path: &Path, null_marker: &str) -> Result<(), String> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| e.to_string())?;
    wtr.write_record(dataset.schema.field_names())
        .map_err(|e| e.to_string())?;
    for row in &dataset.rows {
        wtr.write_record(row.iter().map(|v| cell_text(v, null_marker)))
            .map_err(|e| e.to_string())?;
    }
    wtr.flush().map_err(|e| e.to_string())
}

// Spreadsheet numbers are doubles; integers beyond this magnitude are written as text so no
// digit is lost.
#[cfg(feature = "xlsx_writer")]
const MAX_EXACT_XLSX_INT: u64 = 1 << 53;

#[cfg(feature = "xlsx_writer")]
fn write_xlsx(dataset: &DataSet, path: &Path, null_marker: &str) -> Result<(), String> {
    use rust_xlsxwriter::Workbook;

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();

    for (c, name) in dataset.schema.field_names().enumerate() {
        let col = u16::try_from(c).map_err(|_| format!("too many columns for xlsx: {c}"))?;
        ws.write_string(0, col, name).map_err(|e| e.to_string())?;
    }
    for (r, row) in dataset.rows.iter().enumerate() {
        let xr = u32::try_from(r + 1).map_err(|_| format!("too many rows for xlsx: {r}"))?;
        for (c, value) in row.iter().enumerate() {
            let col = c as u16;
            let res = match value {
                Value::Null if null_marker.is_empty() => continue,
                Value::Null => ws.write_string(xr, col, null_marker),
                Value::Int64(v) if v.unsigned_abs() > MAX_EXACT_XLSX_INT => {
                    ws.write_string(xr, col, &v.to_string())
                }
                Value::Int64(v) => ws.write_number(xr, col, *v as f64),
                Value::Float64(v) => ws.write_number(xr, col, *v),
                Value::Bool(b) => ws.write_boolean(xr, col, *b),
                Value::Utf8(s) => ws.write_string(xr, col, s),
            };
            res.map_err(|e| e.to_string())?;
        }
    }

    wb.save(path).map_err(|e| e.to_string())
}

#[cfg(not(feature = "xlsx_writer"))]
fn write_xlsx(_dataset: &DataSet, _path: &Path, _null_marker: &str) -> Result<(), String> {
    Err("xlsx output not enabled (enable cargo feature 'xlsx_writer')".to_string())
}
