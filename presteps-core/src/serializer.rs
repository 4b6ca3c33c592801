//! JSON persistence for [`StructuredDocument`]
//!
//! The persisted layout is
//!
//! ```json
//! {
//!   "source": "report.pdf",
//!   "page_count": 2,
//!   "created_at": "2024-05-01T10:00:00Z",
//!   "paragraphs": [
//!     {"page": 0, "text": "...", "bbox": [x0, y0, x1, y1], "font": "Helvetica", "font_size": 12.0}
//!   ]
//! }
//! ```
//!
//! Unknown fields are ignored when reading.

use std::fs;
use std::path::Path;

use crate::atomic::write_atomic;
use crate::document::StructuredDocument;
use crate::error::{FormatError, Result};

/// Suffix appended to a document stem to name its extraction output
pub const OUTPUT_SUFFIX: &str = "_output.json";

/// Renders and parses the persisted extraction format
#[derive(Debug, Clone, Copy)]
pub struct DocumentSerializer {
    pretty: bool,
}

impl Default for DocumentSerializer {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl DocumentSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-line output instead of indented
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    pub fn to_json(&self, document: &StructuredDocument) -> std::result::Result<String, FormatError> {
        let json = if self.pretty {
            serde_json::to_string_pretty(document)?
        } else {
            serde_json::to_string(document)?
        };
        Ok(json)
    }

    /// Parse and validate a persisted document
    pub fn from_json(&self, text: &str) -> std::result::Result<StructuredDocument, FormatError> {
        let document: StructuredDocument = serde_json::from_str(text)?;
        document.validate()?;
        Ok(document)
    }

    /// Atomically write a document to `path`
    pub fn write_file(&self, document: &StructuredDocument, path: &Path) -> Result<()> {
        let json = self.to_json(document)?;
        write_atomic(path, json.as_bytes())
    }

    pub fn read_file(&self, path: &Path) -> Result<StructuredDocument> {
        let text = fs::read_to_string(path)?;
        Ok(self.from_json(&text)?)
    }
}

/// Output filename for a source document: `report.pdf` -> `report_output.json`
pub fn output_file_name(source: &str) -> String {
    let file = source.rsplit(['/', '\\']).next().unwrap_or(source);
    let stem = match file.rfind('.') {
        Some(dot) if dot > 0 => &file[..dot],
        _ => file,
    };
    format!("{stem}{OUTPUT_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Paragraph;
    use crate::geometry::BoundingBox;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn sample() -> StructuredDocument {
        StructuredDocument::with_timestamp(
            "report.pdf",
            2,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            vec![
                Paragraph {
                    page: 0,
                    text: "Total emissions: 120 tCO2e".to_string(),
                    bbox: BoundingBox::new(72.0, 697.6, 228.0, 709.6),
                    font: "Helvetica".to_string(),
                    font_size: 12.0,
                },
                Paragraph {
                    page: 1,
                    text: "Scope 3 is excluded.".to_string(),
                    bbox: BoundingBox::new(72.1, 500.25, 190.0, 512.0),
                    font: "Helvetica-Bold".to_string(),
                    font_size: 11.5,
                },
            ],
        )
    }

    #[test]
    fn test_round_trip() {
        let serializer = DocumentSerializer::new();
        let document = sample();
        let json = serializer.to_json(&document).unwrap();
        assert_eq!(serializer.from_json(&json).unwrap(), document);

        let compact = DocumentSerializer::compact().to_json(&document).unwrap();
        assert!(!compact.contains('\n'));
        assert_eq!(serializer.from_json(&compact).unwrap(), document);
    }

    #[test]
    fn test_layout() {
        let json = DocumentSerializer::compact().to_json(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["source"], "report.pdf");
        assert_eq!(value["page_count"], 2);
        assert_eq!(value["created_at"], "2024-05-01T10:00:00Z");
        assert_eq!(value["paragraphs"][0]["bbox"], serde_json::json!([72.0, 697.6, 228.0, 709.6]));
        assert_eq!(value["paragraphs"][1]["font"], "Helvetica-Bold");
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let json = r#"{
            "source": "a.pdf", "page_count": 1, "created_at": "2024-01-01T00:00:00Z",
            "generator": "v9",
            "paragraphs": [{"page": 0, "text": "x", "bbox": [0, 0, 1, 1],
                            "font": "F", "font_size": 10, "confidence": 0.5}]
        }"#;
        let document = DocumentSerializer::new().from_json(json).unwrap();
        assert_eq!(document.paragraphs().len(), 1);
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let json = r#"{"source": "a.pdf", "created_at": "2024-01-01T00:00:00Z", "paragraphs": []}"#;
        assert!(matches!(
            DocumentSerializer::new().from_json(json),
            Err(FormatError::Json(_))
        ));
    }

    #[test]
    fn test_malformed_bbox_is_rejected() {
        let short = r#"{"source": "a.pdf", "page_count": 1, "created_at": "2024-01-01T00:00:00Z",
            "paragraphs": [{"page": 0, "text": "x", "bbox": [0, 0, 1], "font": "F", "font_size": 10}]}"#;
        assert!(matches!(
            DocumentSerializer::new().from_json(short),
            Err(FormatError::Json(_))
        ));

        let inverted = r#"{"source": "a.pdf", "page_count": 1, "created_at": "2024-01-01T00:00:00Z",
            "paragraphs": [{"page": 0, "text": "x", "bbox": [5, 0, 1, 1], "font": "F", "font_size": 10}]}"#;
        assert!(matches!(
            DocumentSerializer::new().from_json(inverted),
            Err(FormatError::InvalidBoundingBox { index: 0, .. })
        ));
    }

    #[test]
    fn test_page_out_of_range_is_rejected() {
        let json = r#"{"source": "a.pdf", "page_count": 1, "created_at": "2024-01-01T00:00:00Z",
            "paragraphs": [{"page": 1, "text": "x", "bbox": [0, 0, 1, 1], "font": "F", "font_size": 10}]}"#;
        assert!(matches!(
            DocumentSerializer::new().from_json(json),
            Err(FormatError::PageOutOfRange { page: 1, .. })
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(output_file_name("report.pdf"));
        let serializer = DocumentSerializer::new();
        serializer.write_file(&sample(), &path).unwrap();
        assert_eq!(serializer.read_file(&path).unwrap(), sample());
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("reports/ACME 2022.pdf"), "ACME 2022_output.json");
        assert_eq!(output_file_name("plain"), "plain_output.json");
    }
}
