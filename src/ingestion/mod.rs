//! Source readers.
//!
//! Most callers should use [`read_source`] (from [`unified`]) which:
//!
//! - auto-detects format by file extension (or you can override via [`SourceSpec::format`])
//! - maps missing files and sheets to [`crate::PipelineError::SourceNotFound`]
//! - reads into an in-memory [`crate::types::DataSet`] using the source's [`crate::types::Schema`]
//!
//! Format-specific functions are also available under [`csv`] and (feature `excel`) `excel`.

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod unified;

use crate::error::{PipelineError, PipelineResult};
use crate::types::Value;

pub use unified::{read_source, SourceFormat, SourceSpec};

/// Reader behavior shared by all formats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Number of data rows to discard directly after the header row.
    pub skip_rows: usize,
    /// Turn unparseable numeric/bool cells into [`Value::Null`] instead of failing.
    pub coerce_invalid: bool,
}

impl ReadOptions {
    fn coerce(&self, parsed: PipelineResult<Value>) -> PipelineResult<Value> {
        match parsed {
            Err(PipelineError::ParseError { .. }) if self.coerce_invalid => Ok(Value::Null),
            other => other,
        }
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err("expected bool (true/false/1/0/yes/no)".to_string()),
    }
}
