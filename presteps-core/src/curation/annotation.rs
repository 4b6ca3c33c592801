//! Question/answer reference tables

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::normalize::clean_text;
use crate::document::document_stem;
use crate::error::{FormatError, Result};

const QUESTION_ID: &[&str] = &["question_id", "kpi_id"];
const EXPECTED_ANSWER: &[&str] = &["expected_answer", "answer"];
const SOURCE_DOCUMENT: &[&str] = &["source_document", "source_file"];

/// One reference question/answer pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationEntry {
    pub question_id: String,
    pub expected_answer: String,
    /// Document the answer was taken from; `None` matches every document
    pub source_document: Option<String>,
}

impl AnnotationEntry {
    pub fn new(question_id: impl Into<String>, expected_answer: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            expected_answer: expected_answer.into(),
            source_document: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_document = Some(source.into());
        self
    }

    /// Whether this annotation applies to a document with the given stem
    pub fn applies_to(&self, stem: &str) -> bool {
        match &self.source_document {
            Some(source) => document_stem(source) == stem,
            None => true,
        }
    }
}

/// Reads annotation tables from CSV with a header row
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotationLoader;

impl AnnotationLoader {
    pub fn load_csv(path: &Path) -> Result<Vec<AnnotationEntry>> {
        let file = File::open(path)?;
        let entries = Self::from_reader(file)?;
        info!(path = %path.display(), annotations = entries.len(), "loaded annotations");
        Ok(entries)
    }

    /// Parse CSV data. Column names are matched case-insensitively and
    /// `kpi_id`, `answer` and `source_file` are accepted as aliases.
    pub fn from_reader<R: Read>(reader: R) -> std::result::Result<Vec<AnnotationEntry>, FormatError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{FEFF}').to_lowercase())
            .collect();
        let column = |aliases: &[&str]| headers.iter().position(|h| aliases.contains(&h.as_str()));

        let question_column =
            column(QUESTION_ID).ok_or_else(|| FormatError::MissingColumn(QUESTION_ID[0].to_string()))?;
        let answer_column = column(EXPECTED_ANSWER)
            .ok_or_else(|| FormatError::MissingColumn(EXPECTED_ANSWER[0].to_string()))?;
        let source_column = column(SOURCE_DOCUMENT);

        let mut entries = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let question_id = record.get(question_column).unwrap_or_default().to_string();
            let expected_answer = clean_text(record.get(answer_column).unwrap_or_default());

            if question_id.is_empty() || expected_answer.is_empty() {
                // Header is line 1
                warn!(line = row + 2, "annotation row without question id or answer, skipping");
                continue;
            }

            let source_document = source_column
                .and_then(|c| record.get(c))
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            entries.push(AnnotationEntry {
                question_id,
                expected_answer,
                source_document,
            });
        }
        Ok(entries)
    }
}
