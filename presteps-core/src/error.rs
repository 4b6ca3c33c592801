use std::path::PathBuf;

use thiserror::Error;

/// A document could not be turned into text runs.
///
/// Every variant names the offending document so batch callers can report
/// failures per file. Decoding is never retried internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("{document}: empty input")]
    Empty { document: String },

    #[error("{document}: not a readable PDF: {reason}")]
    Malformed { document: String, reason: String },

    #[error("{document}: document is password-protected (use force to attempt extraction)")]
    Encrypted { document: String },

    #[error("{document}: decryption failed: {reason}")]
    Decryption { document: String, reason: String },

    #[error("{document}: document has no pages")]
    NoPages { document: String },
}

impl DecodeError {
    /// Name of the document that failed
    pub fn document(&self) -> &str {
        match self {
            DecodeError::Empty { document }
            | DecodeError::Malformed { document, .. }
            | DecodeError::Encrypted { document }
            | DecodeError::Decryption { document, .. }
            | DecodeError::NoPages { document } => document,
        }
    }

    /// Replace the document name carried by the error
    pub fn with_document(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        match &mut self {
            DecodeError::Empty { document }
            | DecodeError::Malformed { document, .. }
            | DecodeError::Encrypted { document }
            | DecodeError::Decryption { document, .. }
            | DecodeError::NoPages { document } => *document = name,
        }
        self
    }
}

/// Persisted data (extraction JSON or an annotation table) violates its schema.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Paragraph {index}: malformed bounding box {bbox:?}")]
    InvalidBoundingBox { index: usize, bbox: [f64; 4] },

    #[error("Paragraph {index}: page {page} out of range for {page_count} pages")]
    PageOutOfRange {
        index: usize,
        page: usize,
        page_count: usize,
    },

    #[error("Paragraph {index}: pages must be in ascending order")]
    PageOrder { index: usize },

    #[error("Paragraph {index}: empty text")]
    EmptyText { index: usize },

    #[error("Paragraph {index}: invalid font size {font_size}")]
    InvalidFontSize { index: usize, font_size: f64 },
}

/// Configuration rejected before any document is processed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("low threshold {low} must be less than high threshold {high}")]
    ThresholdOrder { low: f64, high: f64 },

    #[error("{name} must be a positive finite number, got {value}")]
    InvalidTunable { name: &'static str, value: f64 },

    #[error("validation ratio must be within [0, 1), got {0}")]
    InvalidValidationRatio(f64),

    #[error("Invalid configuration file: {0}")]
    Load(String),
}

/// Crate-level error
#[derive(Error, Debug)]
pub enum PrestepsError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PrestepsError {
    /// True for errors raised while reading or writing files
    pub fn is_io(&self) -> bool {
        matches!(self, PrestepsError::Io(_) | PrestepsError::Write { .. })
    }
}

impl From<serde_json::Error> for PrestepsError {
    fn from(err: serde_json::Error) -> Self {
        PrestepsError::Format(FormatError::Json(err))
    }
}

impl From<csv::Error> for PrestepsError {
    fn from(err: csv::Error) -> Self {
        PrestepsError::Format(FormatError::Csv(err))
    }
}

pub type Result<T> = std::result::Result<T, PrestepsError>;
