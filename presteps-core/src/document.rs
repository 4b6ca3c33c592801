//! Extraction data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FormatError;
use crate::geometry::BoundingBox;

/// Positioned text as decoded from one text-showing operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// Zero-based page index
    pub page: usize,
    pub text: String,
    /// Page-local box in native user-space units
    pub bbox: BoundingBox,
    pub font: String,
    pub font_size: f64,
}

impl TextRun {
    /// Text is absent or whitespace only
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A reading-order block of runs from a single page.
///
/// Only the derived attributes are kept: the concatenated text, the union
/// of the run boxes and the typography of the first run. Member runs are
/// consumed when the paragraph is built and cannot be recovered from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub page: usize,
    pub text: String,
    pub bbox: BoundingBox,
    pub font: String,
    pub font_size: f64,
}

impl Paragraph {
    /// Number of alphabetic characters in the text
    pub fn alphabetic_len(&self) -> usize {
        self.text.chars().filter(|c| c.is_alphabetic()).count()
    }
}

/// Full extracted representation of one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredDocument {
    source: String,
    page_count: usize,
    created_at: DateTime<Utc>,
    paragraphs: Vec<Paragraph>,
}

impl StructuredDocument {
    /// Create a document stamped with the current time
    pub fn new(source: impl Into<String>, page_count: usize, paragraphs: Vec<Paragraph>) -> Self {
        Self::with_timestamp(source, page_count, Utc::now(), paragraphs)
    }

    pub fn with_timestamp(
        source: impl Into<String>,
        page_count: usize,
        created_at: DateTime<Utc>,
        paragraphs: Vec<Paragraph>,
    ) -> Self {
        Self {
            source: source.into(),
            page_count,
            created_at,
            paragraphs,
        }
    }

    /// Source filename
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Paragraphs in page order, then reading order
    pub fn paragraphs(&self) -> &[Paragraph] {
        &self.paragraphs
    }

    pub fn paragraphs_on_page(&self, page: usize) -> impl Iterator<Item = &Paragraph> {
        self.paragraphs.iter().filter(move |p| p.page == page)
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    /// Source name without directory, extension or `_output` suffix,
    /// lowercased. Used to scope annotations to documents.
    pub fn stem(&self) -> String {
        document_stem(&self.source)
    }

    /// Check the structural invariants a persisted document must satisfy
    pub fn validate(&self) -> Result<(), FormatError> {
        let mut last_page = 0;
        for (index, paragraph) in self.paragraphs.iter().enumerate() {
            if !paragraph.bbox.is_valid() {
                return Err(FormatError::InvalidBoundingBox {
                    index,
                    bbox: paragraph.bbox.to_array(),
                });
            }
            if paragraph.page >= self.page_count {
                return Err(FormatError::PageOutOfRange {
                    index,
                    page: paragraph.page,
                    page_count: self.page_count,
                });
            }
            if paragraph.page < last_page {
                return Err(FormatError::PageOrder { index });
            }
            if paragraph.text.trim().is_empty() {
                return Err(FormatError::EmptyText { index });
            }
            if !paragraph.font_size.is_finite() || paragraph.font_size < 0.0 {
                return Err(FormatError::InvalidFontSize {
                    index,
                    font_size: paragraph.font_size,
                });
            }
            last_page = paragraph.page;
        }
        Ok(())
    }
}

/// Normalized document identifier shared by extraction outputs and
/// annotation tables: `reports/ACME_2022.pdf`, `ACME_2022_output.json` and
/// `acme_2022` all map to `acme_2022`.
pub fn document_stem(name: &str) -> String {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let stem = match file.rfind('.') {
        Some(dot) if dot > 0 => &file[..dot],
        _ => file,
    };
    let stem = stem.strip_suffix("_output").unwrap_or(stem);
    stem.trim().to_lowercase()
}
