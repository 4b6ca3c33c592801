//! Paragraph/annotation scoring

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Range;
use std::thread;

use tracing::debug;

use super::annotation::AnnotationEntry;
use super::normalize::{clean_text, normalize_for_matching};
use super::similarity::{Alignment, NormalizedLevenshtein, PartialRatio, SimilarityMetric};
use crate::document::StructuredDocument;

/// Pair count below which matching stays on the calling thread
const PARALLEL_MIN_PAIRS: usize = 4096;

/// Similarity of one paragraph and one annotation
#[derive(Debug, Clone, PartialEq)]
pub struct MatchScore {
    /// Index into the document's paragraphs
    pub paragraph: usize,
    /// Index into the annotation slice
    pub annotation: usize,
    pub score: f64,
    /// Matched character span of the normalized paragraph text
    pub span: Range<usize>,
    /// Paragraph bounding box area, smaller is more specific
    pub area: f64,
    pub page: usize,
}

impl MatchScore {
    /// Order from best to worst: higher score, then smaller area, then
    /// earlier page, then earlier paragraph
    pub fn rank(&self, other: &MatchScore) -> Ordering {
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then(self.area.partial_cmp(&other.area).unwrap_or(Ordering::Equal))
            .then(self.page.cmp(&other.page))
            .then(self.paragraph.cmp(&other.paragraph))
    }
}

/// Scores every paragraph of a document against every annotation that
/// applies to it
pub struct CurationMatcher {
    metric: Box<dyn SimilarityMetric>,
    parallelism: usize,
}

impl Default for CurationMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CurationMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurationMatcher")
            .field("metric", &self.metric.name())
            .field("parallelism", &self.parallelism)
            .finish()
    }
}

impl CurationMatcher {
    /// Matcher using best-substring Levenshtein similarity
    pub fn new() -> Self {
        Self::with_metric(PartialRatio::new(NormalizedLevenshtein))
    }

    pub fn with_metric(metric: impl SimilarityMetric + 'static) -> Self {
        Self {
            metric: Box::new(metric),
            parallelism: num_cpus::get(),
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn metric(&self) -> &dyn SimilarityMetric {
        self.metric.as_ref()
    }

    /// Score all applicable pairs, annotation-major: all paragraphs for
    /// the first annotation, then the second, and so on. Annotations with a
    /// source document only apply when its stem equals the document's.
    pub fn match_document(
        &self,
        document: &StructuredDocument,
        annotations: &[AnnotationEntry],
    ) -> Vec<MatchScore> {
        let stem = document.stem();
        let applicable: Vec<(usize, Vec<char>)> = annotations
            .iter()
            .enumerate()
            .filter(|(_, a)| a.applies_to(&stem))
            .map(|(i, a)| (i, prepare(&a.expected_answer)))
            .collect();
        let paragraphs: Vec<Vec<char>> = document
            .paragraphs()
            .iter()
            .map(|p| prepare(&p.text))
            .collect();

        let pairs = applicable.len() * paragraphs.len();
        let shards = if pairs >= PARALLEL_MIN_PAIRS {
            self.parallelism.min(applicable.len()).max(1)
        } else {
            1
        };
        debug!(
            document = document.source(),
            annotations = applicable.len(),
            paragraphs = paragraphs.len(),
            shards,
            "matching"
        );

        if shards == 1 {
            return self.score_shard(document, &paragraphs, &applicable);
        }

        let chunk_size = applicable.len().div_ceil(shards);
        let paragraphs = &paragraphs;
        thread::scope(|scope| {
            let handles: Vec<_> = applicable
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || self.score_shard(document, paragraphs, chunk)))
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(scores) => scores,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn score_shard(
        &self,
        document: &StructuredDocument,
        paragraphs: &[Vec<char>],
        annotations: &[(usize, Vec<char>)],
    ) -> Vec<MatchScore> {
        let mut scores = Vec::with_capacity(annotations.len() * paragraphs.len());
        for (annotation, answer) in annotations {
            for (index, (text, paragraph)) in paragraphs.iter().zip(document.paragraphs()).enumerate() {
                // Spans are only meaningful inside a paragraph longer than the answer
                let alignment = if answer.len() > text.len() {
                    Alignment {
                        score: self.metric.score(text, answer),
                        span: 0..text.len(),
                    }
                } else {
                    self.metric.align(text, answer)
                };
                scores.push(MatchScore {
                    paragraph: index,
                    annotation: *annotation,
                    score: alignment.score.clamp(0.0, 1.0),
                    span: alignment.span,
                    area: paragraph.bbox.area(),
                    page: paragraph.page,
                });
            }
        }
        scores
    }

    /// Best scoring pair per annotation, by [`MatchScore::rank`], in
    /// annotation order
    pub fn best_per_annotation(scores: &[MatchScore]) -> Vec<&MatchScore> {
        let mut best: BTreeMap<usize, &MatchScore> = BTreeMap::new();
        for score in scores {
            best.entry(score.annotation)
                .and_modify(|current| {
                    if score.rank(current) == Ordering::Less {
                        *current = score;
                    }
                })
                .or_insert(score);
        }
        best.into_values().collect()
    }
}

fn prepare(text: &str) -> Vec<char> {
    normalize_for_matching(&clean_text(text)).chars().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Paragraph;
    use crate::geometry::BoundingBox;

    fn paragraph(page: usize, text: &str, bbox: BoundingBox) -> Paragraph {
        Paragraph {
            page,
            text: text.to_string(),
            bbox,
            font: "Helvetica".to_string(),
            font_size: 10.0,
        }
    }

    fn document(paragraphs: Vec<Paragraph>) -> StructuredDocument {
        StructuredDocument::new("acme_2022.pdf", 3, paragraphs)
    }

    fn small() -> BoundingBox {
        BoundingBox::new(0.0, 0.0, 10.0, 10.0)
    }

    fn large() -> BoundingBox {
        BoundingBox::new(0.0, 0.0, 100.0, 100.0)
    }

    #[test]
    fn test_scores_every_pair() {
        let doc = document(vec![
            paragraph(0, "Total emissions: 120 tCO2e", small()),
            paragraph(1, "Revenue grew", small()),
        ]);
        let annotations = vec![
            AnnotationEntry::new("Q1", "120 tCO2e"),
            AnnotationEntry::new("Q2", "revenue"),
        ];
        let scores = CurationMatcher::new().match_document(&doc, &annotations);
        assert_eq!(scores.len(), 4);
        assert_eq!((scores[0].annotation, scores[0].paragraph), (0, 0));
        assert_eq!(scores[0].score, 1.0);
        assert_eq!((scores[3].annotation, scores[3].paragraph), (1, 1));
        assert_eq!(scores[3].score, 1.0);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(&s.score)));
    }

    #[test]
    fn test_case_and_whitespace_are_ignored() {
        let doc = document(vec![paragraph(0, "Revenue", small())]);
        let upper = CurationMatcher::new().match_document(&doc, &[AnnotationEntry::new("Q", "revenue")]);
        let doc = document(vec![paragraph(0, "revenue", small())]);
        let lower = CurationMatcher::new().match_document(&doc, &[AnnotationEntry::new("Q", "  revenue ")]);
        assert_eq!(upper[0].score, lower[0].score);
        assert_eq!(upper[0].score, 1.0);
    }

    #[test]
    fn test_score_does_not_depend_on_length_order() {
        let metric = PartialRatio::new(NormalizedLevenshtein);
        let pairs = [
            ("Revenue", "revenue grew by five percent"),
            ("revenue grew by five percent", "Revenue"),
            ("scope 2", "the scope 1 emissions"),
            ("the scope 1 emissions", "scope 2"),
        ];
        for (text, answer) in pairs {
            let doc = document(vec![paragraph(0, text, small())]);
            let scores = CurationMatcher::new().match_document(&doc, &[AnnotationEntry::new("Q", answer)]);
            let expected = metric.similarity(&text.to_lowercase(), &answer.to_lowercase());
            assert_eq!(scores[0].score, expected, "{text:?} vs {answer:?}");
        }

        let doc = document(vec![paragraph(0, "Revenue", small())]);
        let scores = CurationMatcher::new()
            .match_document(&doc, &[AnnotationEntry::new("Q", "revenue grew by five percent")]);
        assert_eq!(scores[0].score, 1.0);
        assert_eq!(scores[0].span, 0..7);
    }

    #[test]
    fn test_document_scoping() {
        let doc = document(vec![paragraph(0, "Net zero by 2050", small())]);
        let annotations = vec![
            AnnotationEntry::new("Q1", "2050").with_source("ACME_2022.pdf"),
            AnnotationEntry::new("Q2", "2050").with_source("other.pdf"),
            AnnotationEntry::new("Q3", "2050"),
        ];
        let scores = CurationMatcher::new().match_document(&doc, &annotations);
        let matched: Vec<usize> = scores.iter().map(|s| s.annotation).collect();
        assert_eq!(matched, vec![0, 2]);
    }

    #[test]
    fn test_duplicate_question_ids_scored_independently() {
        let doc = document(vec![paragraph(0, "Net zero by 2050", small())]);
        let annotations = vec![
            AnnotationEntry::new("Q1", "2050"),
            AnnotationEntry::new("Q1", "net zero"),
        ];
        let scores = CurationMatcher::new().match_document(&doc, &annotations);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[1].span, 0..8);
    }

    #[test]
    fn test_best_prefers_smaller_area_then_earlier_page() {
        let doc = document(vec![
            paragraph(1, "emissions of 120 tCO2e", large()),
            paragraph(2, "emissions of 120 tCO2e", small()),
            paragraph(0, "scope 1: 120 tCO2e", small()),
        ]);
        let annotations = vec![AnnotationEntry::new("Q1", "120 tCO2e")];
        let scores = CurationMatcher::new().match_document(&doc, &annotations);
        let best = CurationMatcher::best_per_annotation(&scores);
        assert_eq!(best.len(), 1);
        // All score 1.0; two share the smaller area, page 0 wins
        assert_eq!(best[0].paragraph, 2);

        let doc = document(vec![
            paragraph(0, "emissions of 120 tCO2e", large()),
            paragraph(1, "emissions of 120 tCO2e", small()),
        ]);
        let scores = CurationMatcher::new().match_document(&doc, &annotations);
        assert_eq!(CurationMatcher::best_per_annotation(&scores)[0].paragraph, 1);
    }

    #[test]
    fn test_sharded_matching_matches_sequential() {
        let paragraphs: Vec<Paragraph> = (0..80)
            .map(|i| paragraph(0, &format!("paragraph {i} reports {} tonnes", i * 7), small()))
            .collect();
        let doc = document(paragraphs);
        let annotations: Vec<AnnotationEntry> = (0..60)
            .map(|i| AnnotationEntry::new(format!("Q{i}"), format!("{} tonnes", i * 7)))
            .collect();

        let sequential = CurationMatcher::new()
            .with_parallelism(1)
            .match_document(&doc, &annotations);
        let parallel = CurationMatcher::new()
            .with_parallelism(4)
            .match_document(&doc, &annotations);
        assert_eq!(sequential.len(), 80 * 60);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_pluggable_metric() {
        use crate::curation::similarity::TokenJaccard;
        let doc = document(vec![paragraph(0, "zero net", small())]);
        let matcher = CurationMatcher::with_metric(TokenJaccard);
        let scores = matcher.match_document(&doc, &[AnnotationEntry::new("Q", "net zero")]);
        assert_eq!(scores[0].score, 1.0);
        assert_eq!(matcher.metric().name(), "token_jaccard");
    }
}
