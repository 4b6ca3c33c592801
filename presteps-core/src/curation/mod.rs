//! Curation: aligning extracted paragraphs with reference answers
//!
//! ```text
//! StructuredDocument + [AnnotationEntry]
//!     -> CurationMatcher   (one MatchScore per applicable pair)
//!     -> LabelAssigner     (thresholds, ambiguous policy, sampling)
//!     -> [TrainingRecord]
//!     -> DatasetWriter     (json | jsonl | csv, atomic)
//! ```
//!
//! [`kpi`] builds question-answering examples from KPI annotation sheets
//! and writes them through the same [`DatasetWriter`].

pub mod annotation;
pub mod dataset;
pub mod kpi;
pub mod labels;
pub mod matcher;
pub mod normalize;
pub mod similarity;

pub use annotation::{AnnotationEntry, AnnotationLoader};
pub use dataset::{DatasetFormat, DatasetRecord, DatasetWriter, SplitCounts};
pub use kpi::{KpiAnnotation, KpiAnnotationLoader, KpiCurator, KpiExample, KpiMapping, RelevanceEntry};
pub use labels::{Label, LabelAssigner, TrainingRecord};
pub use matcher::{CurationMatcher, MatchScore};
pub use similarity::{NormalizedLevenshtein, PartialRatio, SimilarityMetric, TokenJaccard};

use tracing::info;

use crate::config::CurationConfig;
use crate::document::StructuredDocument;
use crate::error::ConfigError;

/// Matcher and label assigner for one configuration
#[derive(Debug)]
pub struct Curator {
    matcher: CurationMatcher,
    assigner: LabelAssigner,
}

impl Curator {
    /// Validates the configuration before anything is matched
    pub fn new(config: CurationConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            matcher: CurationMatcher::new(),
            assigner: LabelAssigner::new(config)?,
        })
    }

    pub fn with_matcher(mut self, matcher: CurationMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &CurationConfig {
        self.assigner.config()
    }

    /// Labeled training records for one document
    pub fn curate(
        &self,
        document: &StructuredDocument,
        annotations: &[AnnotationEntry],
    ) -> Vec<TrainingRecord> {
        let scores = self.matcher.match_document(document, annotations);
        let records = self.assigner.assign(document, annotations, &scores);
        info!(
            document = document.source(),
            pairs = scores.len(),
            records = records.len(),
            positives = records.iter().filter(|r| r.label == Label::Positive).count(),
            "curated document"
        );
        records
    }
}
