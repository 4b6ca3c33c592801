//! # presteps
//!
//! Preprocessing steps for document-level NLP training data: turn PDF
//! reports into structured JSON paragraphs, then align those paragraphs
//! with reference answers to produce labeled training records.
//!
//! ## Features
//!
//! - **Extraction**: positioned text runs decoded from page content streams,
//!   grouped into paragraphs with page index, bounding box, font and size
//! - **Persistence**: a stable JSON document format written atomically
//! - **Curation**: fuzzy matching of paragraphs against annotation tables,
//!   thresholded into positive, negative and ambiguous records
//! - **Datasets**: JSON, JSON Lines or CSV output with seeded train/val splits
//! - **Batch runs**: per-document results on a fixed worker pool
//!
//! ## Quick Start
//!
//! ### Extracting a PDF
//!
//! ```rust,no_run
//! use presteps::{Extractor, DocumentSerializer, Result};
//! use std::path::Path;
//!
//! # fn main() -> Result<()> {
//! let extractor = Extractor::default();
//! let document = extractor.extract_file(Path::new("annual_report.pdf"))?;
//!
//! for paragraph in document.paragraphs() {
//!     println!("page {}: {}", paragraph.page, paragraph.text);
//! }
//! DocumentSerializer::new().write_file(&document, Path::new("annual_report_output.json"))?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Curating training records
//!
//! ```rust,no_run
//! use presteps::curation::{AnnotationLoader, Curator, DatasetWriter};
//! use presteps::{CurationConfig, DocumentSerializer, Result};
//! use std::path::Path;
//!
//! # fn main() -> Result<()> {
//! let document = DocumentSerializer::new().read_file(Path::new("annual_report_output.json"))?;
//! let annotations = AnnotationLoader::load_csv(Path::new("annotations.csv"))?;
//!
//! let curator = Curator::new(CurationConfig::default())?;
//! let records = curator.curate(&document, &annotations);
//! DatasetWriter::default().write(&records, Path::new("train.json"))?;
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod batch;
pub mod config;
pub mod curation;
pub mod document;
pub mod error;
pub mod extraction;
pub mod geometry;
pub mod paragraph;
pub mod serializer;
pub mod text;

pub use config::{
    AmbiguousPolicy, CurationConfig, DecodeOptions, ExtractionSettings, KpiCurationOptions,
    LayoutOptions, MatchThresholds, ServerSettings,
};
pub use document::{Paragraph, StructuredDocument, TextRun};
pub use error::{ConfigError, DecodeError, FormatError, PrestepsError, Result};
pub use extraction::{ExtractionOutcome, Extractor};
pub use geometry::BoundingBox;
pub use paragraph::ParagraphBuilder;
pub use serializer::DocumentSerializer;
pub use text::PageDecoder;

/// Current version of presteps
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
