use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error type returned by every stage of the merge pipeline.
///
/// A single enum is shared by ingestion, processing, the sink and the orchestrator. Errors raised
/// inside [`crate::pipeline::Pipeline::run`] are wrapped in [`PipelineError::Stage`] so the message
/// names the failing stage and source; use [`PipelineError::root`] to inspect the underlying kind.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input file does not exist, or the requested sheet is absent from the workbook.
    #[error("source not found: {path} ({message})")]
    SourceNotFound { path: PathBuf, message: String },

    /// The input does not conform to the provided schema (missing columns, no header row, etc.).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A value could not be parsed into the required [`crate::types::DataType`].
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },

    /// A stage referenced a column that the table does not have.
    #[error("column '{column}' not found; available columns: {available:?}")]
    ColumnNotFound {
        column: String,
        available: Vec<String>,
    },

    /// A column name was requested or produced twice.
    #[error("duplicate column '{column}'")]
    DuplicateColumn { column: String },

    /// A join key is absent from one side, or has incompatible types on the two sides.
    #[error("key column '{column}' {reason}")]
    KeyColumnMismatch { column: String, reason: String },

    /// Two columns would end up with the same output name, or one column is renamed twice.
    #[error("schema conflict on column '{column}': {message}")]
    SchemaConflict { column: String, message: String },

    /// The sink could not write the output file.
    #[error("failed to write {path}: {message}")]
    WriteError { path: PathBuf, message: String },

    /// The pipeline configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "excel")]
    /// Workbook reader error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// Configuration file could not be decoded.
    #[error("config error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error raised while running a named pipeline stage.
    #[error("stage '{stage}'{} failed: {source}", source_label(.source_name))]
    Stage {
        stage: crate::observability::Stage,
        source_name: Option<String>,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Returns the innermost error, unwrapping any [`PipelineError::Stage`] layers.
    pub fn root(&self) -> &PipelineError {
        let mut cur = self;
        while let PipelineError::Stage { source, .. } = cur {
            cur = source;
        }
        cur
    }

    pub(crate) fn column_not_found<'a>(
        column: &str,
        available: impl Iterator<Item = &'a str>,
    ) -> Self {
        PipelineError::ColumnNotFound {
            column: column.to_owned(),
            available: available.map(str::to_owned).collect(),
        }
    }
}

fn source_label(name: &Option<String>) -> String {
    match name {
        Some(n) => format!(" (source '{n}')"),
        None => String::new(),
    }
}
