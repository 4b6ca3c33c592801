//! Tunables for extraction and curation
//!
//! All heuristics are exposed here instead of being embedded as constants,
//! so they can be adjusted per document class. Every struct can be read from
//! a JSON file where missing fields take their defaults, and every struct
//! has a `validate` that must pass before any document is processed.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Paragraph grouping thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    /// Largest vertical gap between consecutive lines of one paragraph,
    /// as a multiple of the upper line's font size
    pub line_gap_ratio: f64,
    /// A new paragraph starts when larger / smaller font size exceeds this
    pub font_size_ratio: f64,
    /// Largest horizontal distance between non-overlapping lines that are
    /// still treated as one column (page units)
    pub column_gap: f64,
    /// Runs whose baselines differ by less than this fraction of the font
    /// size are on the same line
    pub same_line_tolerance: f64,
    /// Horizontal gap, as a fraction of the font size, above which runs on
    /// one line are joined with a space
    pub word_gap_ratio: f64,
    /// Join a word hyphenated across a line break
    pub merge_hyphenated: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            line_gap_ratio: 0.6,
            font_size_ratio: 1.2,
            column_gap: 20.0,
            same_line_tolerance: 0.5,
            word_gap_ratio: 0.15,
            merge_hyphenated: true,
        }
    }
}

impl LayoutOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("line_gap_ratio", self.line_gap_ratio)?;
        positive("column_gap", self.column_gap)?;
        positive("same_line_tolerance", self.same_line_tolerance)?;
        positive("word_gap_ratio", self.word_gap_ratio)?;
        if !self.font_size_ratio.is_finite() || self.font_size_ratio < 1.0 {
            return Err(ConfigError::InvalidTunable {
                name: "font_size_ratio",
                value: self.font_size_ratio,
            });
        }
        Ok(())
    }
}

/// Page decoding options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Attempt extraction from protected documents. Refused by default.
    pub force: bool,
    /// Negative `TJ` displacement, as a fraction of the font size, that
    /// is rendered as a space
    pub space_threshold: f64,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            force: false,
            space_threshold: 0.2,
        }
    }
}

/// Score cutoffs for labeling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchThresholds {
    pub low: f64,
    pub high: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self { low: 0.5, high: 0.8 }
    }
}

impl MatchThresholds {
    /// Create validated thresholds
    pub fn new(low: f64, high: f64) -> Result<Self, ConfigError> {
        let thresholds = Self { low, high };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        unit_interval("low threshold", self.low)?;
        unit_interval("high threshold", self.high)?;
        if self.low >= self.high {
            return Err(ConfigError::ThresholdOrder {
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}

/// What happens to pairs scored between the two thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbiguousPolicy {
    #[default]
    Drop,
    Keep,
}

/// Everything the curation stage consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    pub thresholds: MatchThresholds,
    pub ambiguous: AmbiguousPolicy,
    /// Keep only the best positive paragraph per annotation
    pub top_one: bool,
    /// Cap on negative records per positive record of the same annotation
    pub negatives_per_positive: Option<usize>,
    /// Fraction of records held out for validation when splitting
    pub val_ratio: Option<f64>,
    /// Seed for negative sampling and train/validation shuffling
    pub seed: u64,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            thresholds: MatchThresholds::default(),
            ambiguous: AmbiguousPolicy::default(),
            top_one: false,
            negatives_per_positive: None,
            val_ratio: None,
            seed: 42,
        }
    }
}

impl CurationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        if let Some(ratio) = self.val_ratio {
            if !(0.0..1.0).contains(&ratio) {
                return Err(ConfigError::InvalidValidationRatio(ratio));
            }
        }
        Ok(())
    }
}

/// Settings for turning KPI annotation sheets into question-answering
/// examples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiCurationOptions {
    /// Only annotations of this data type are used
    pub data_type: String,
    /// Companies whose annotations are ignored
    pub exclude_companies: Vec<String>,
    /// Search the other pages of each report for further paragraphs
    /// containing an annotated answer
    pub find_extra_answerable: bool,
    /// KPIs left out of that search
    pub skip_extra_for: Vec<String>,
    /// Add relevance-flagged paragraphs without the answer as
    /// unanswerable examples
    pub create_unanswerable: bool,
    /// Fraction of examples held out for validation when splitting
    pub val_ratio: Option<f64>,
    pub seed: u64,
}

impl Default for KpiCurationOptions {
    fn default() -> Self {
        Self {
            data_type: "TEXT".to_string(),
            exclude_companies: Vec::new(),
            find_extra_answerable: true,
            skip_extra_for: ["0", "1", "9", "11"].map(String::from).to_vec(),
            create_unanswerable: true,
            val_ratio: None,
            seed: 42,
        }
    }
}

impl KpiCurationOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ratio) = self.val_ratio {
            if !(0.0..1.0).contains(&ratio) {
                return Err(ConfigError::InvalidValidationRatio(ratio));
            }
        }
        Ok(())
    }
}

/// Settings for the extraction stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Do not re-extract documents whose output file already exists
    pub skip_extracted_files: bool,
    /// Write `<stem>_output.json` next to the chosen output directory
    pub store_to_file: bool,
    /// Minimum number of alphabetic characters a paragraph needs to be kept
    /// (0 disables the filter)
    pub min_paragraph_length: usize,
    pub decode: DecodeOptions,
    pub layout: LayoutOptions,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            skip_extracted_files: false,
            store_to_file: true,
            min_paragraph_length: 20,
            decode: DecodeOptions::default(),
            layout: LayoutOptions::default(),
        }
    }
}

impl ExtractionSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.layout.validate()?;
        positive("space_threshold", self.decode.space_threshold)
    }
}

/// Settings for the HTTP extraction server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            log_level: "info".to_string(),
        }
    }
}

impl ServerSettings {
    /// Socket address string, `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read any settings struct from a JSON file
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&text).map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))
}

fn unit_interval(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOutOfRange { name, value })
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidTunable { name, value })
    }
}
