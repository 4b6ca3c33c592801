//! String similarity metrics
//!
//! Metrics work on character slices of already normalized text and return
//! a value in `[0, 1]` where identical inputs score `1.0`.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

/// Given two strings, return a similarity in `[0, 1]`
pub trait SimilarityMetric: Send + Sync {
    /// Similarity of two character sequences. Must be symmetric.
    fn score(&self, a: &[char], b: &[char]) -> f64;

    /// Similarity together with the span of `text` that produced it, in
    /// character offsets. Whole-string metrics report the whole text.
    fn align(&self, text: &[char], pattern: &[char]) -> Alignment {
        Alignment {
            score: self.score(text, pattern),
            span: 0..text.len(),
        }
    }

    /// The score when it is strictly greater than `floor`. Metrics that can
    /// tell early that `floor` is out of reach override this.
    fn score_above(&self, a: &[char], b: &[char], floor: f64) -> Option<f64> {
        let score = self.score(a, b);
        (score > floor).then_some(score)
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        self.score(&a, &b)
    }

    fn name(&self) -> &'static str;
}

/// Score plus the matched span of the compared text
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub score: f64,
    pub span: Range<usize>,
}

/// `1 - levenshtein(a, b) / max(len(a), len(b))`; two empty strings are
/// identical
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedLevenshtein;

impl SimilarityMetric for NormalizedLevenshtein {
    fn score(&self, a: &[char], b: &[char]) -> f64 {
        let max_len = a.len().max(b.len());
        if max_len == 0 {
            return 1.0;
        }
        1.0 - levenshtein(a, b) as f64 / max_len as f64
    }

    fn score_above(&self, a: &[char], b: &[char], floor: f64) -> Option<f64> {
        let max_len = a.len().max(b.len());
        if max_len == 0 {
            return (1.0 > floor).then_some(1.0);
        }
        // score > floor  <=>  distance < (1 - floor) * max_len
        let limit = ((1.0 - floor) * max_len as f64).ceil().max(0.0) as usize;
        if max_len - common_chars(a, b) >= limit {
            return None;
        }
        let distance = levenshtein_within(a, b, limit)?;
        let score = 1.0 - distance as f64 / max_len as f64;
        (score > floor).then_some(score)
    }

    fn name(&self) -> &'static str {
        "levenshtein"
    }
}

/// Best-substring matching: the shorter string is compared against every
/// window of the longer string with the same length, and the best window
/// score is the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialRatio<M = NormalizedLevenshtein> {
    inner: M,
}

impl<M: SimilarityMetric> PartialRatio<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<M: SimilarityMetric> SimilarityMetric for PartialRatio<M> {
    fn score(&self, a: &[char], b: &[char]) -> f64 {
        if a.len() >= b.len() {
            self.align(a, b).score
        } else {
            self.align(b, a).score
        }
    }

    fn align(&self, text: &[char], pattern: &[char]) -> Alignment {
        if pattern.len() >= text.len() {
            return Alignment {
                score: self.inner.score(text, pattern),
                span: 0..text.len(),
            };
        }
        if pattern.is_empty() {
            return Alignment { score: 0.0, span: 0..0 };
        }

        let width = pattern.len();
        let mut best = Alignment { score: -1.0, span: 0..0 };
        for (start, window) in text.windows(width).enumerate() {
            if window == pattern {
                return Alignment {
                    score: 1.0,
                    span: start..start + width,
                };
            }
            if let Some(score) = self.inner.score_above(window, pattern, best.score) {
                best = Alignment {
                    score,
                    span: start..start + width,
                };
            }
        }
        best
    }

    fn name(&self) -> &'static str {
        "partial_ratio"
    }
}

/// Jaccard index of the whitespace-separated token sets
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenJaccard;

impl SimilarityMetric for TokenJaccard {
    fn score(&self, a: &[char], b: &[char]) -> f64 {
        let a: String = a.iter().collect();
        let b: String = b.iter().collect();
        let a: HashSet<&str> = a.split_whitespace().collect();
        let b: HashSet<&str> = b.split_whitespace().collect();
        let union = a.union(&b).count();
        if union == 0 {
            return 1.0;
        }
        a.intersection(&b).count() as f64 / union as f64
    }

    fn name(&self) -> &'static str {
        "token_jaccard"
    }
}

/// Edit distance with unit costs, two-row dynamic programming
pub fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev_row: Vec<usize> = (0..=b.len()).collect();
    let mut curr_row = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }
    prev_row[b.len()]
}

/// Edit distance when it is below `limit`. Rows are abandoned once every
/// cell has reached `limit`, since row minima never decrease.
pub fn levenshtein_within(a: &[char], b: &[char], limit: usize) -> Option<usize> {
    if a.len().abs_diff(b.len()) >= limit {
        return None;
    }
    if a.is_empty() || b.is_empty() {
        return Some(a.len().max(b.len()));
    }

    let mut prev_row: Vec<usize> = (0..=b.len()).collect();
    let mut curr_row = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr_row[0] = i + 1;
        let mut row_min = curr_row[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
            row_min = row_min.min(curr_row[j + 1]);
        }
        if row_min >= limit {
            return None;
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }
    let distance = prev_row[b.len()];
    (distance < limit).then_some(distance)
}

/// Size of the multiset intersection of the characters of `a` and `b`.
/// `max(len) - common_chars` is a lower bound of the edit distance.
fn common_chars(a: &[char], b: &[char]) -> usize {
    let mut counts: HashMap<char, isize> = HashMap::with_capacity(a.len());
    for c in a {
        *counts.entry(*c).or_insert(0) += 1;
    }
    let mut common = 0;
    for c in b {
        if let Some(count) = counts.get_mut(c) {
            if *count > 0 {
                *count -= 1;
                common += 1;
            }
        }
    }
    common
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(levenshtein(&chars(""), &chars("abc")), 3);
        assert_eq!(levenshtein(&chars("same"), &chars("same")), 0);
    }

    #[test]
    fn test_levenshtein_within() {
        let (a, b) = (chars("kitten"), chars("sitting"));
        assert_eq!(levenshtein_within(&a, &b, 4), Some(3));
        assert_eq!(levenshtein_within(&a, &b, 3), None);
        assert_eq!(levenshtein_within(&chars(""), &chars("ab"), 3), Some(2));
        assert_eq!(levenshtein_within(&chars("same"), &chars("same"), 0), None);
        assert_eq!(common_chars(&chars("aabc"), &chars("abbd")), 2);
    }

    #[test]
    fn test_score_above_agrees_with_score() {
        let metric = NormalizedLevenshtein;
        let words = ["", "revenue", "revenues", "scope 1", "scope 2 emissions", "tco2e", "zzz"];
        for a in words {
            for b in words {
                let (a, b) = (chars(a), chars(b));
                let score = metric.score(&a, &b);
                for floor in [-1.0, 0.0, 0.25, 0.5, score, 0.9, 1.0] {
                    let expected = (score > floor).then_some(score);
                    assert_eq!(metric.score_above(&a, &b, floor), expected, "{a:?} {b:?} {floor}");
                }
            }
        }
    }

    #[test]
    fn test_normalized_levenshtein_bounds() {
        let metric = NormalizedLevenshtein;
        assert_eq!(metric.similarity("revenue", "revenue"), 1.0);
        assert_eq!(metric.similarity("", ""), 1.0);
        assert_eq!(metric.similarity("abc", "xyz"), 0.0);
        assert_eq!(metric.similarity("abcd", "abcx"), 0.75);
    }

    #[test]
    fn test_partial_ratio_finds_substring() {
        let metric = PartialRatio::<NormalizedLevenshtein>::default();
        let text = chars("total emissions: 120 tco2e");
        let alignment = metric.align(&text, &chars("120 tco2e"));
        assert_eq!(alignment.score, 1.0);
        assert_eq!(alignment.span, 17..26);
    }

    #[test]
    fn test_partial_ratio_approximate_window() {
        let metric = PartialRatio::<NormalizedLevenshtein>::default();
        let alignment = metric.align(&chars("emissions were 12O tco2e in 2022"), &chars("120 tco2e"));
        // One substituted character in a nine character window
        assert!((alignment.score - 8.0 / 9.0).abs() < 1e-12);
        assert_eq!(alignment.span, 15..24);
    }

    #[test]
    fn test_partial_ratio_is_symmetric() {
        let metric = PartialRatio::<NormalizedLevenshtein>::default();
        let a = "scope 1 emissions";
        let b = "the scope 2 emissions fell";
        assert_eq!(metric.similarity(a, b), metric.similarity(b, a));
    }

    #[test]
    fn test_partial_ratio_disjoint_and_empty() {
        let metric = PartialRatio::<NormalizedLevenshtein>::default();
        assert_eq!(metric.similarity("aaaa", "zz"), 0.0);
        assert_eq!(metric.similarity("", "abc"), 0.0);
        assert_eq!(metric.similarity("", ""), 1.0);
    }

    #[test]
    fn test_token_jaccard() {
        let metric = TokenJaccard;
        assert_eq!(metric.similarity("net zero 2050", "2050 net zero"), 1.0);
        assert_eq!(metric.similarity("a b", "b c"), 1.0 / 3.0);
        assert_eq!(metric.name(), "token_jaccard");
    }
}
