//! Paragraph building
//!
//! Runs are first collected into lines (runs sharing a baseline band,
//! ordered left to right, split at column gutters) and lines are then
//! merged top to bottom into paragraphs while the vertical gap stays small,
//! the lines share a column and the font size does not jump.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use crate::config::LayoutOptions;
use crate::document::{Paragraph, TextRun};
use crate::geometry::BoundingBox;

/// A run of text on one baseline within one column
#[derive(Debug, Clone)]
struct Line {
    text: String,
    bbox: BoundingBox,
    font: String,
    font_size: f64,
}

impl Line {
    fn start(run: &TextRun) -> Self {
        Self {
            text: run.text.clone(),
            bbox: run.bbox,
            font: run.font.clone(),
            font_size: run.font_size,
        }
    }
}

/// Lines grouped into one paragraph so far
#[derive(Debug)]
struct Block {
    lines: Vec<Line>,
    bbox: BoundingBox,
}

impl Block {
    fn last(&self) -> &Line {
        // A block is created with one line and only grows
        &self.lines[self.lines.len() - 1]
    }
}

/// Groups text runs into reading-order paragraphs
#[derive(Debug, Clone, Default)]
pub struct ParagraphBuilder {
    options: LayoutOptions,
}

impl ParagraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: LayoutOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    /// Build paragraphs for all pages. Blank runs are dropped; output is in
    /// page order, then top-to-bottom, then left-to-right.
    pub fn build(&self, runs: &[TextRun]) -> Vec<Paragraph> {
        let mut pages: BTreeMap<usize, Vec<&TextRun>> = BTreeMap::new();
        for run in runs.iter().filter(|r| !r.is_blank()) {
            pages.entry(run.page).or_default().push(run);
        }

        let mut paragraphs = Vec::new();
        for (page, page_runs) in pages {
            let lines = self.build_lines(page_runs);
            let before = paragraphs.len();
            paragraphs.extend(self.merge_lines(page, lines));
            debug!(page, paragraphs = paragraphs.len() - before, "built paragraphs");
        }
        paragraphs
    }

    fn build_lines(&self, mut runs: Vec<&TextRun>) -> Vec<Line> {
        // Top to bottom by bottom edge, then left to right
        runs.sort_by(|a, b| {
            b.bbox
                .y0
                .partial_cmp(&a.bbox.y0)
                .unwrap_or(Ordering::Equal)
                .then(a.bbox.x0.partial_cmp(&b.bbox.x0).unwrap_or(Ordering::Equal))
        });

        let mut bands: Vec<Vec<&TextRun>> = Vec::new();
        for run in runs {
            match bands.last_mut() {
                Some(band) if self.same_baseline(band[0], run) => band.push(run),
                _ => bands.push(vec![run]),
            }
        }

        let mut lines = Vec::new();
        for mut band in bands {
            band.sort_by(|a, b| a.bbox.x0.partial_cmp(&b.bbox.x0).unwrap_or(Ordering::Equal));
            let mut current: Option<Line> = None;
            for run in band {
                current = Some(match current {
                    None => Line::start(run),
                    Some(mut line) => {
                        let gap = run.bbox.x0 - line.bbox.x1;
                        if gap > self.options.column_gap {
                            lines.push(line);
                            Line::start(run)
                        } else {
                            let size = line.font_size.max(run.font_size);
                            if gap > self.options.word_gap_ratio * size
                                && !line.text.ends_with(char::is_whitespace)
                                && !run.text.starts_with(char::is_whitespace)
                            {
                                line.text.push(' ');
                            }
                            line.text.push_str(&run.text);
                            line.bbox = line.bbox.union(&run.bbox);
                            line
                        }
                    }
                });
            }
            lines.extend(current);
        }
        lines
    }

    fn same_baseline(&self, anchor: &TextRun, run: &TextRun) -> bool {
        let size = anchor.font_size.max(run.font_size);
        (anchor.bbox.y0 - run.bbox.y0).abs() <= self.options.same_line_tolerance * size
    }

    fn merge_lines(&self, page: usize, lines: Vec<Line>) -> Vec<Paragraph> {
        let mut blocks: Vec<Block> = Vec::new();
        for line in lines {
            match blocks
                .iter_mut()
                .rev()
                .find(|block| self.continues(block.last(), &line))
            {
                Some(block) => {
                    block.bbox = block.bbox.union(&line.bbox);
                    block.lines.push(line);
                }
                None => blocks.push(Block {
                    bbox: line.bbox,
                    lines: vec![line],
                }),
            }
        }

        blocks.sort_by(|a, b| {
            b.bbox
                .y1
                .partial_cmp(&a.bbox.y1)
                .unwrap_or(Ordering::Equal)
                .then(a.bbox.x0.partial_cmp(&b.bbox.x0).unwrap_or(Ordering::Equal))
        });
        blocks.into_iter().map(|block| self.finish(page, block)).collect()
    }

    /// Whether `next` continues the paragraph whose last line is `prev`
    fn continues(&self, prev: &Line, next: &Line) -> bool {
        let gap = prev.bbox.gap_above(&next.bbox);
        if gap > self.options.line_gap_ratio * prev.font_size {
            return false;
        }
        if prev.bbox.horizontal_overlap(&next.bbox) <= 0.0
            && prev.bbox.horizontal_distance(&next.bbox) > self.options.column_gap
        {
            return false;
        }
        font_ratio(prev.font_size, next.font_size) <= self.options.font_size_ratio
    }

    fn finish(&self, page: usize, block: Block) -> Paragraph {
        let mut text = String::new();
        for line in &block.lines {
            if text.is_empty() {
                text.push_str(&line.text);
            } else if self.options.merge_hyphenated && ends_with_hyphenated_word(&text) {
                text.pop();
                text.push_str(line.text.trim_start());
            } else {
                text.push(' ');
                text.push_str(line.text.trim_start());
            }
        }

        let first = &block.lines[0];
        Paragraph {
            page,
            text: text.trim().to_string(),
            bbox: block.bbox,
            font: first.font.clone(),
            font_size: first.font_size,
        }
    }
}

/// Larger size over smaller; sizes of zero only match each other
fn font_ratio(a: f64, b: f64) -> f64 {
    let (small, large) = if a < b { (a, b) } else { (b, a) };
    if small > 0.0 {
        large / small
    } else if large > 0.0 {
        f64::INFINITY
    } else {
        1.0
    }
}

fn ends_with_hyphenated_word(text: &str) -> bool {
    let mut chars = text.chars().rev();
    matches!((chars.next(), chars.next()), (Some('-'), Some(c)) if c.is_alphabetic())
}
