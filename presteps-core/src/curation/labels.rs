//! Labels and training records

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::annotation::AnnotationEntry;
use super::matcher::MatchScore;
use crate::config::{AmbiguousPolicy, CurationConfig, MatchThresholds};
use crate::document::StructuredDocument;
use crate::error::ConfigError;
use crate::geometry::BoundingBox;

/// Relevance of a paragraph to an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Positive,
    Negative,
    Ambiguous,
}

impl Label {
    /// Positive above `high`, negative below `low`, ambiguous otherwise
    pub fn from_score(score: f64, thresholds: &MatchThresholds) -> Self {
        if score > thresholds.high {
            Label::Positive
        } else if score < thresholds.low {
            Label::Negative
        } else {
            Label::Ambiguous
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Positive => "positive",
            Label::Negative => "negative",
            Label::Ambiguous => "ambiguous",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labeled (paragraph, annotation) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub text: String,
    pub question_id: String,
    pub expected_answer: String,
    pub label: Label,
    pub score: f64,
    pub source: String,
    pub page: usize,
    pub bbox: BoundingBox,
    /// Character offsets where the expected answer occurs in `text`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answer_start: Vec<usize>,
}

/// Turns match scores into training records according to a
/// [`CurationConfig`]
#[derive(Debug, Clone)]
pub struct LabelAssigner {
    config: CurationConfig,
}

impl LabelAssigner {
    /// Fails when the thresholds or ratios are invalid
    pub fn new(config: CurationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CurationConfig {
        &self.config
    }

    /// Label every score and keep the records the configuration retains.
    /// Record order follows score order.
    pub fn assign(
        &self,
        document: &StructuredDocument,
        annotations: &[AnnotationEntry],
        scores: &[MatchScore],
    ) -> Vec<TrainingRecord> {
        let thresholds = &self.config.thresholds;
        let mut labeled: Vec<(&MatchScore, Label)> = scores
            .iter()
            .map(|score| (score, Label::from_score(score.score, thresholds)))
            .filter(|(_, label)| {
                *label != Label::Ambiguous || self.config.ambiguous == AmbiguousPolicy::Keep
            })
            .collect();

        if self.config.top_one {
            labeled = keep_best_positive(labeled);
        }
        if let Some(ratio) = self.config.negatives_per_positive {
            labeled = self.sample_negatives(labeled, ratio);
        }

        let records: Vec<TrainingRecord> = labeled
            .into_iter()
            .filter_map(|(score, label)| {
                let paragraph = document.paragraphs().get(score.paragraph)?;
                let annotation = annotations.get(score.annotation)?;
                Some(TrainingRecord {
                    answer_start: answer_offsets(&paragraph.text, &annotation.expected_answer),
                    text: paragraph.text.clone(),
                    question_id: annotation.question_id.clone(),
                    expected_answer: annotation.expected_answer.clone(),
                    label,
                    score: score.score,
                    source: document.source().to_string(),
                    page: paragraph.page,
                    bbox: paragraph.bbox,
                })
            })
            .collect();

        debug!(
            document = document.source(),
            scores = scores.len(),
            records = records.len(),
            "assigned labels"
        );
        records
    }

    /// Keep at most `ratio` negatives per positive of the same annotation,
    /// picked with the configured seed. Annotations without positives keep
    /// no negatives.
    fn sample_negatives<'s>(
        &self,
        labeled: Vec<(&'s MatchScore, Label)>,
        ratio: usize,
    ) -> Vec<(&'s MatchScore, Label)> {
        let mut positives: BTreeMap<usize, usize> = BTreeMap::new();
        let mut negatives: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, (score, label)) in labeled.iter().enumerate() {
            match label {
                Label::Positive => *positives.entry(score.annotation).or_default() += 1,
                Label::Negative => negatives.entry(score.annotation).or_default().push(index),
                Label::Ambiguous => {}
            }
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut kept: HashSet<usize> = HashSet::new();
        for (annotation, candidates) in &negatives {
            let quota = positives.get(annotation).copied().unwrap_or(0) * ratio;
            if quota >= candidates.len() {
                kept.extend(candidates.iter().copied());
            } else {
                kept.extend(
                    sample(&mut rng, candidates.len(), quota)
                        .into_iter()
                        .map(|i| candidates[i]),
                );
            }
        }

        labeled
            .into_iter()
            .enumerate()
            .filter(|(index, (_, label))| *label != Label::Negative || kept.contains(index))
            .map(|(_, pair)| pair)
            .collect()
    }
}

/// Drop all positives except the best ranked one of each annotation
fn keep_best_positive(labeled: Vec<(&MatchScore, Label)>) -> Vec<(&MatchScore, Label)> {
    let mut best: BTreeMap<usize, &MatchScore> = BTreeMap::new();
    for (score, label) in &labeled {
        if *label != Label::Positive {
            continue;
        }
        let current = best.entry(score.annotation).or_insert(*score);
        if score.rank(current).is_lt() {
            *current = *score;
        }
    }

    labeled
        .into_iter()
        .filter(|(score, label)| {
            *label != Label::Positive
                || best
                    .get(&score.annotation)
                    .is_some_and(|b| std::ptr::eq(*b, *score))
        })
        .collect()
}

/// Character offsets of case-insensitive occurrences of `answer` in `text`.
/// An answer that starts or ends with a digit only matches where the
/// neighbouring character is not a digit, so `12` is not found in `2012`.
pub fn answer_offsets(text: &str, answer: &str) -> Vec<usize> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Vec::new();
    }
    let Ok(pattern) = RegexBuilder::new(&regex::escape(answer))
        .case_insensitive(true)
        .build()
    else {
        return Vec::new();
    };

    let digit_start = answer.starts_with(|c: char| c.is_ascii_digit());
    let digit_end = answer.ends_with(|c: char| c.is_ascii_digit());

    let mut offsets = Vec::new();
    let mut from = 0;
    while let Some(found) = pattern.find_at(text, from) {
        let before = text[..found.start()].chars().next_back();
        let after = text[found.end()..].chars().next();
        let bounded = !(digit_start && before.is_some_and(|c| c.is_ascii_digit()))
            && !(digit_end && after.is_some_and(|c| c.is_ascii_digit()));
        if bounded {
            offsets.push(text[..found.start()].chars().count());
        }
        // Step one character to allow overlapping candidates
        from = found.start() + text[found.start()..].chars().next().map_or(1, char::len_utf8);
        if from > text.len() {
            break;
        }
    }
    offsets
}
