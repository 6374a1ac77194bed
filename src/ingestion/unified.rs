//! Unified source reader.
//!
//! Most callers should use [`read_source`], which reads one [`SourceSpec`] into an in-memory
//! [`crate::types::DataSet`].
//!
//! - If [`SourceSpec::format`] is `None`, the format is inferred from the file extension.
//! - A missing file or sheet is reported as [`PipelineError::SourceNotFound`] before any parsing.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{DataSet, Schema};

use super::{csv, ReadOptions};

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Comma-separated values.
    Csv,
    /// Spreadsheet/workbook formats (feature-gated behind `excel`).
    Excel,
}

impl SourceFormat {
    /// Parse a source format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(Self::Excel),
            _ => None,
        }
    }
}

/// Everything needed to read one source table.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    /// Path to the input file.
    pub path: PathBuf,
    /// Sheet to read from a workbook; `None` reads the first sheet. Ignored for CSV.
    pub sheet: Option<String>,
    /// If `None`, auto-detect format from file extension.
    pub format: Option<SourceFormat>,
    /// Columns to read, with their types. Names must match header cells.
    pub schema: Schema,
    /// Row skipping and parse leniency.
    pub options: ReadOptions,
}

impl SourceSpec {
    /// A spec reading `schema` from `path` with default options.
    pub fn new(path: impl Into<PathBuf>, schema: Schema) -> Self {
        Self {
            path: path.into(),
            sheet: None,
            format: None,
            schema,
            options: ReadOptions::default(),
        }
    }

    /// Select a workbook sheet by name.
    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    /// Override format inference.
    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Replace reader options.
    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }

    /// Format this spec will be read with.
    pub fn resolved_format(&self) -> PipelineResult<SourceFormat> {
        match self.format {
            Some(f) => Ok(f),
            None => infer_format_from_path(&self.path),
        }
    }
}

/// Read a source table.
///
/// # Examples
///
/// ```no_run
/// use school_econ_merge::ingestion::{read_source, SourceSpec};
/// use school_econ_merge::types::{DataType, Field, Schema};
///
/// # fn main() -> Result<(), school_econ_merge::PipelineError> {
/// let schema = Schema::new(vec![
///     Field::new("RCDTS", DataType::Utf8),
///     Field::new("City", DataType::Utf8),
///     Field::new("% ELA Proficiency", DataType::Float64),
/// ]);
/// let spec = SourceSpec::new("report_card.xlsx", schema).with_sheet("ELAMathScience");
/// let ds = read_source(&spec)?;
/// println!("rows={}", ds.row_count());
/// # Ok(())
/// # }
/// ```
pub fn read_source(spec: &SourceSpec) -> PipelineResult<DataSet> {
    let path = spec.path.as_path();
    if !path.is_file() {
        return Err(PipelineError::SourceNotFound {
            path: path.to_path_buf(),
            message: "file does not exist".to_string(),
        });
    }
    if let Some(dup) = spec.schema.first_duplicate() {
        return Err(PipelineError::DuplicateColumn {
            column: dup.to_string(),
        });
    }

    match spec.resolved_format()? {
        SourceFormat::Csv => csv::read_csv_from_path(path, &spec.schema, &spec.options),
        SourceFormat::Excel => read_excel_dispatch(path, spec),
    }
}

fn infer_format_from_path(path: &Path) -> PipelineResult<SourceFormat> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PipelineError::SchemaMismatch {
            message: format!(
                "cannot infer format: path has no extension ({})",
                path.display()
            ),
        })?;

    SourceFormat::from_extension(ext).ok_or_else(|| PipelineError::SchemaMismatch {
        message: format!(
            "cannot infer format from extension '{ext}' for path ({})",
            path.display()
        ),
    })
}

fn read_excel_dispatch(path: &Path, spec: &SourceSpec) -> PipelineResult<DataSet> {
    // Avoid unused warnings when the feature is off.
    let _ = (path, spec);

    #[cfg(feature = "excel")]
    {
        super::excel::read_excel_from_path(path, spec.sheet.as_deref(), &spec.schema, &spec.options)
    }

    #[cfg(not(feature = "excel"))]
    {
        Err(PipelineError::SchemaMismatch {
            message: "excel ingestion not enabled (enable cargo feature 'excel')".to_string(),
        })
    }
}
