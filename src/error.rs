use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PriceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Failed to write workbook: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{table}: column layout does not match (missing: {missing:?}, unexpected: {extra:?})")]
    SchemaMismatch {
        table: String,
        missing: Vec<String>,
        extra: Vec<String>,
    },

    #[error("{table}: required columns not found: {columns:?}")]
    MissingColumns { table: String, columns: Vec<String> },

    #[error("Reference data unavailable at {}: {reason}", path.display())]
    ReferenceUnavailable { path: PathBuf, reason: String },

    #[error("Permission denied: invalid authorization code")]
    Unauthorized,

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Uploaded file must be a .{expected} file (got .{found})")]
    FormatMismatch { expected: String, found: String },
}

pub type Result<T> = std::result::Result<T, PriceError>;
