//! KPI question-answering examples
//!
//! Annotation sheets name, per report, a KPI, the page it was found on,
//! the answer and the paragraph it was taken from. Together with a KPI
//! mapping (KPI id to question) and the extracted reports this yields
//! SQuAD-style examples: the closest extracted paragraph, the question,
//! the answer and its character offsets. Paragraphs a relevance model
//! flagged for a KPI that do not contain the annotated answer become
//! unanswerable examples.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::dataset::{join_offsets, DatasetRecord};
use super::labels::answer_offsets;
use super::normalize::clean_for_qa;
use super::similarity::{NormalizedLevenshtein, PartialRatio, SimilarityMetric};
use crate::config::KpiCurationOptions;
use crate::document::{document_stem, StructuredDocument};
use crate::error::{ConfigError, FormatError, PrestepsError, Result};

const ANNOTATION_COLUMNS: &[&str] = &[
    "company",
    "source_file",
    "source_page",
    "kpi_id",
    "year",
    "answer",
    "data_type",
    "relevant_paragraphs",
];

const RELEVANCE_COLUMNS: &[&str] = &["page", "pdf_name", "paragraph", "kpi_id", "question"];
const RELEVANCE_FLAG: &str = "paragraph_relevance_flag";

lazy_static! {
    static ref PARAGRAPH_SEPARATOR: Regex = Regex::new(r#"["\u{201D}]\s?,\s?["\u{201C}]"#).unwrap();
}

/// Question and answer constraints of one KPI
#[derive(Debug, Clone, PartialEq)]
pub struct KpiDefinition {
    pub question: String,
    /// The report year is appended to the question
    pub add_year: bool,
    /// Data types an answer to this KPI may have
    pub categories: Vec<String>,
}

/// KPI ids mapped to their questions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KpiMapping {
    kpis: BTreeMap<String, KpiDefinition>,
}

impl KpiMapping {
    pub fn load_csv(path: &Path) -> Result<Self> {
        let mapping = Self::from_reader(File::open(path)?)?;
        info!(path = %path.display(), kpis = mapping.len(), "loaded KPI mapping");
        Ok(mapping)
    }

    /// Parse a table with `kpi_id` and `question` columns and optional
    /// `add_year` and `kpi_category` (comma-separated) columns
    pub fn from_reader<R: Read>(reader: R) -> std::result::Result<Self, FormatError> {
        let mut reader = csv_reader(reader);
        let headers = lowercase_headers(&mut reader)?;
        let column = |name: &str| headers.iter().position(|h| h == name);

        let id_column = column("kpi_id").ok_or_else(|| FormatError::MissingColumn("kpi_id".to_string()))?;
        let question_column =
            column("question").ok_or_else(|| FormatError::MissingColumn("question".to_string()))?;
        let year_column = column("add_year");
        let category_column = column("kpi_category");

        let mut kpis = BTreeMap::new();
        for record in reader.records() {
            let record = record?;
            let id = record.get(id_column).unwrap_or_default();
            let question = record.get(question_column).unwrap_or_default();
            if id.is_empty() || question.is_empty() {
                continue;
            }
            let add_year = year_column
                .and_then(|c| record.get(c))
                .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"));
            let categories = category_column
                .and_then(|c| record.get(c))
                .map(|v| v.split(',').map(str::trim).filter(|c| !c.is_empty()).map(String::from).collect())
                .unwrap_or_default();

            kpis.insert(
                canonical_number(id),
                KpiDefinition {
                    question: question.to_string(),
                    add_year,
                    categories,
                },
            );
        }
        Ok(Self { kpis })
    }

    pub fn get(&self, kpi_id: &str) -> Option<&KpiDefinition> {
        self.kpis.get(&canonical_number(kpi_id))
    }

    /// The question for `kpi_id`, with `in year <year>` in place of the
    /// question mark when the KPI asks for it
    pub fn question(&self, kpi_id: &str, year: &str) -> Option<String> {
        let kpi = self.get(kpi_id)?;
        if !kpi.add_year {
            return Some(kpi.question.clone());
        }
        let front = kpi.question.split('?').next().unwrap_or_default();
        Some(format!("{front} in year {}?", canonical_number(year)))
    }

    /// Whether an answer of `data_type` is allowed for `kpi_id`.
    /// Unknown KPIs accept nothing.
    pub fn accepts(&self, kpi_id: &str, data_type: &str) -> bool {
        self.get(kpi_id)
            .is_some_and(|kpi| kpi.categories.iter().any(|c| c == data_type))
    }

    pub fn len(&self) -> usize {
        self.kpis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kpis.is_empty()
    }
}

/// One row of an annotation sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiAnnotation {
    pub company: String,
    /// Report file name, always ending in `.pdf`
    pub source_file: String,
    /// 1-based pages, one per relevant paragraph
    pub source_pages: Vec<usize>,
    pub kpi_id: String,
    pub year: String,
    pub answer: String,
    pub data_type: String,
    /// Raw list of relevant paragraphs, e.g. `["first", "second"]`
    pub relevant_paragraphs: String,
}

/// Reads annotation sheets exported as CSV
#[derive(Debug, Clone, Copy, Default)]
pub struct KpiAnnotationLoader;

impl KpiAnnotationLoader {
    /// Load one sheet, or every CSV file with `annotation` in its name
    /// from a directory. Unreadable sheets in a directory are skipped.
    pub fn load(path: &Path) -> Result<Vec<KpiAnnotation>> {
        if !path.is_dir() {
            let rows = Self::from_reader(File::open(path)?)?;
            info!(path = %path.display(), annotations = rows.len(), "loaded annotation sheet");
            return Ok(rows);
        }

        let mut sheets: Vec<PathBuf> = fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_annotation_sheet(p))
            .collect();
        sheets.sort();

        let mut rows = Vec::new();
        for sheet in &sheets {
            let loaded = File::open(sheet)
                .map_err(PrestepsError::from)
                .and_then(|file| Self::from_reader(file).map_err(PrestepsError::from));
            match loaded {
                Ok(loaded) => rows.extend(loaded),
                Err(e) => warn!(path = %sheet.display(), error = %e, "skipping annotation sheet"),
            }
        }
        if sheets.is_empty() {
            warn!(path = %path.display(), "no CSV files with 'annotation' in the name");
        }
        info!(sheets = sheets.len(), annotations = rows.len(), "aggregated annotation sheets");
        Ok(rows)
    }

    /// Parse one sheet. Rows missing the company, file, page, KPI or year
    /// are dropped, as are rows whose page list is not of the form `[1, 2]`.
    pub fn from_reader<R: Read>(reader: R) -> std::result::Result<Vec<KpiAnnotation>, FormatError> {
        let mut reader = csv_reader(reader);
        let headers = lowercase_headers(&mut reader)?;
        let mut columns = Vec::with_capacity(ANNOTATION_COLUMNS.len());
        for name in ANNOTATION_COLUMNS {
            let position = headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| FormatError::MissingColumn(name.to_string()))?;
            columns.push(position);
        }

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let field = |i: usize| record.get(columns[i]).unwrap_or_default();
            if (0..5).any(|i| field(i).is_empty()) {
                continue;
            }
            let Some(source_pages) = parse_pages(field(2)) else {
                warn!(line = line + 2, source_page = field(2), "invalid source_page, skipping");
                continue;
            };

            rows.push(KpiAnnotation {
                company: field(0).to_string(),
                source_file: pdf_file_name(field(1)),
                source_pages,
                kpi_id: field(3).to_string(),
                year: field(4).to_string(),
                answer: field(5).to_string(),
                data_type: field(6).to_string(),
                relevant_paragraphs: field(7).to_string(),
            });
        }
        Ok(rows)
    }
}

/// Paragraph a relevance model flagged for a KPI question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceEntry {
    pub pdf_name: String,
    pub page: usize,
    pub kpi_id: String,
    pub question: String,
    pub paragraph: String,
    pub relevant: bool,
}

impl RelevanceEntry {
    pub fn load_csv(path: &Path) -> Result<Vec<RelevanceEntry>> {
        let entries = Self::from_reader(File::open(path)?)?;
        info!(path = %path.display(), entries = entries.len(), "loaded relevance table");
        Ok(entries)
    }

    /// Parse a table with `page`, `pdf_name`, `paragraph`, `kpi_id`,
    /// `question` and `paragraph_relevance_flag` columns
    pub fn from_reader<R: Read>(reader: R) -> std::result::Result<Vec<RelevanceEntry>, FormatError> {
        let mut reader = csv_reader(reader);
        let headers = lowercase_headers(&mut reader)?;
        let mut columns = Vec::with_capacity(RELEVANCE_COLUMNS.len() + 1);
        for name in RELEVANCE_COLUMNS.iter().chain([&RELEVANCE_FLAG]) {
            let position = headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| FormatError::MissingColumn(name.to_string()))?;
            columns.push(position);
        }

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record?;
            let field = |i: usize| record.get(columns[i]).unwrap_or_default();
            let flag = field(5).parse::<f64>().map_or(false, |v| v == 1.0);
            entries.push(RelevanceEntry {
                pdf_name: pdf_file_name(field(1)),
                page: field(0).parse::<f64>().map_or(0, |p| p.max(0.0) as usize),
                kpi_id: field(3).to_string(),
                question: field(4).to_string(),
                paragraph: field(2).to_string(),
                relevant: flag,
            });
        }
        Ok(entries)
    }
}

/// An annotation narrowed to one relevant paragraph
#[derive(Debug, Clone, PartialEq)]
pub struct KpiSample {
    pub source_file: String,
    /// 1-based page of the paragraph
    pub page: usize,
    pub kpi_id: String,
    pub question: String,
    pub answer: String,
    pub relevant_paragraph: String,
}

/// One question-answering example. Unanswerable examples have an empty
/// answer and no offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiExample {
    pub source_file: String,
    pub paragraph: String,
    pub question: String,
    pub answer: String,
    /// Character offsets of `answer` in `paragraph`
    pub answer_start: Vec<usize>,
}

impl KpiExample {
    pub fn is_answerable(&self) -> bool {
        !self.answer_start.is_empty()
    }

    fn key(&self) -> (String, String, String) {
        (self.answer.clone(), self.paragraph.clone(), self.question.clone())
    }
}

#[derive(Serialize)]
struct KpiCsvRow<'a> {
    source_file: &'a str,
    paragraph: &'a str,
    question: &'a str,
    answer: &'a str,
    answer_start: String,
}

impl DatasetRecord for KpiExample {
    fn write_csv<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()> {
        writer.serialize(KpiCsvRow {
            source_file: &self.source_file,
            paragraph: &self.paragraph,
            question: &self.question,
            answer: &self.answer,
            answer_start: join_offsets(&self.answer_start),
        })
    }
}

/// Builds question-answering examples from annotation sheets and
/// extracted reports
pub struct KpiCurator {
    mapping: KpiMapping,
    options: KpiCurationOptions,
    metric: Box<dyn SimilarityMetric>,
}

impl KpiCurator {
    pub fn new(mapping: KpiMapping, options: KpiCurationOptions) -> std::result::Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            mapping,
            options,
            metric: Box::new(PartialRatio::new(NormalizedLevenshtein)),
        })
    }

    /// Metric used to find the extracted paragraph closest to an
    /// annotated one
    pub fn with_metric(mut self, metric: impl SimilarityMetric + 'static) -> Self {
        self.metric = Box::new(metric);
        self
    }

    pub fn options(&self) -> &KpiCurationOptions {
        &self.options
    }

    /// Answerable examples, plus unanswerable ones from `relevance` when
    /// enabled, without duplicate (answer, paragraph, question) triples
    pub fn curate(
        &self,
        annotations: &[KpiAnnotation],
        documents: &[StructuredDocument],
        relevance: &[RelevanceEntry],
    ) -> Vec<KpiExample> {
        let samples = self.samples(annotations);
        let mut examples = self.answerable(&samples, documents);
        let answerable = examples.len();
        if self.options.create_unanswerable {
            examples.extend(self.unanswerable(&samples, relevance));
        }
        let examples = dedup(examples);

        info!(
            annotations = annotations.len(),
            samples = samples.len(),
            answerable,
            unanswerable = examples.len() - answerable.min(examples.len()),
            "curated KPI examples"
        );
        examples
    }

    /// Keep annotations of the configured data type whose KPI accepts it,
    /// attach the KPI question and split multi-paragraph annotations into
    /// one sample per paragraph
    pub fn samples(&self, annotations: &[KpiAnnotation]) -> Vec<KpiSample> {
        let mut samples = Vec::new();
        let mut rejected = 0;
        for annotation in annotations {
            let data_type = annotation.data_type.trim();
            if data_type != self.options.data_type
                || self.options.exclude_companies.contains(&annotation.company)
            {
                continue;
            }
            if !self.mapping.accepts(&annotation.kpi_id, data_type) {
                rejected += 1;
                continue;
            }
            let Some(question) = self.mapping.question(&annotation.kpi_id, &annotation.year) else {
                continue;
            };
            let answer = annotation.answer.split('\n').collect::<Vec<_>>().join(" ").trim().to_string();
            if answer.is_empty() || annotation.relevant_paragraphs.trim().is_empty() {
                continue;
            }
            let Some(paragraphs) = split_relevant_paragraphs(&annotation.relevant_paragraphs) else {
                warn!(
                    source_file = %annotation.source_file,
                    kpi_id = %annotation.kpi_id,
                    "relevant_paragraphs is not a list, skipping"
                );
                continue;
            };

            for (i, paragraph) in paragraphs.into_iter().enumerate() {
                // Extra paragraphs without their own page share the last one
                let page = annotation
                    .source_pages
                    .get(i)
                    .or(annotation.source_pages.last())
                    .copied()
                    .unwrap_or_default();
                samples.push(KpiSample {
                    source_file: annotation.source_file.clone(),
                    page,
                    kpi_id: annotation.kpi_id.clone(),
                    question: question.clone(),
                    answer: answer.clone(),
                    relevant_paragraph: paragraph,
                });
            }
        }
        if rejected > 0 {
            debug!(rejected, "dropped annotations with a data type their KPI does not allow");
        }
        samples
    }

    /// One example per sample whose answer can be located, in the closest
    /// extracted paragraph when the report is available and in the
    /// annotated paragraph otherwise
    pub fn answerable(&self, samples: &[KpiSample], documents: &[StructuredDocument]) -> Vec<KpiExample> {
        let by_stem: HashMap<String, &StructuredDocument> =
            documents.iter().map(|d| (d.stem(), d)).collect();

        let mut examples = Vec::new();
        for sample in samples {
            let document = by_stem.get(&document_stem(&sample.source_file)).copied();
            if document.is_none() {
                debug!(source_file = %sample.source_file, "no extracted report, using annotated paragraph");
            }
            let answer = clean_for_qa(&sample.answer);
            let mut paragraph = clean_for_qa(&sample.relevant_paragraph);

            if let Some(document) = document {
                let page: Vec<&str> = match sample.page.checked_sub(1) {
                    Some(index) => document.paragraphs_on_page(index).map(|p| p.text.as_str()).collect(),
                    None => Vec::new(),
                };
                if !page.is_empty() {
                    paragraph = self.closest_paragraph(&page, &paragraph, &answer);
                }
            }
            if let Some(example) = answerable_example(&sample.source_file, paragraph, &sample.question, &answer) {
                examples.push(example);
            }

            if let Some(document) = document.filter(|_| self.searches_elsewhere(&sample.kpi_id)) {
                for other in document.paragraphs().iter().filter(|p| p.page + 1 != sample.page) {
                    let paragraph = clean_for_qa(&other.text);
                    if let Some(example) =
                        answerable_example(&sample.source_file, paragraph, &sample.question, &answer)
                    {
                        examples.push(example);
                    }
                }
            }
        }
        dedup(examples)
    }

    /// Relevance-flagged paragraphs of annotated reports that neither
    /// contain an annotated answer to the same KPI nor are its annotated
    /// paragraph
    pub fn unanswerable(&self, samples: &[KpiSample], relevance: &[RelevanceEntry]) -> Vec<KpiExample> {
        let mut annotated: HashMap<(String, String), Vec<(String, String)>> = HashMap::new();
        for sample in samples {
            annotated
                .entry((document_stem(&sample.source_file), canonical_number(&sample.kpi_id)))
                .or_default()
                .push((clean_for_qa(&sample.answer), clean_for_qa(&sample.relevant_paragraph)));
        }
        let reports: HashSet<String> = samples.iter().map(|s| document_stem(&s.source_file)).collect();

        let mut examples = Vec::new();
        for entry in relevance.iter().filter(|e| e.relevant) {
            let stem = document_stem(&entry.pdf_name);
            if !reports.contains(&stem) {
                continue;
            }
            let paragraph = clean_for_qa(&entry.paragraph);
            let answered = annotated
                .get(&(stem, canonical_number(&entry.kpi_id)))
                .is_some_and(|known| {
                    known
                        .iter()
                        .any(|(answer, annotated)| paragraph.contains(answer.as_str()) || *annotated == paragraph)
                });
            if answered || paragraph.is_empty() {
                continue;
            }
            examples.push(KpiExample {
                source_file: entry.pdf_name.clone(),
                paragraph,
                question: entry.question.clone(),
                answer: String::new(),
                answer_start: Vec::new(),
            });
        }
        dedup(examples)
    }

    /// The extracted paragraph containing the annotated one, else the most
    /// similar one if it contains the answer, else the annotated paragraph
    pub fn closest_paragraph(&self, page: &[&str], annotated: &str, answer: &str) -> String {
        let candidates: Vec<String> = page.iter().map(|p| clean_for_qa(p)).collect();
        if let Some(found) = candidates.iter().find(|p| !answer_offsets(p, annotated).is_empty()) {
            return found.clone();
        }

        let mut best: Option<(f64, &String)> = None;
        for candidate in &candidates {
            let score = self.metric.similarity(candidate, annotated);
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, candidate));
            }
        }
        match best {
            Some((_, candidate)) if !answer_offsets(candidate, answer).is_empty() => candidate.clone(),
            _ => annotated.to_string(),
        }
    }

    fn searches_elsewhere(&self, kpi_id: &str) -> bool {
        let kpi_id = canonical_number(kpi_id);
        self.options.find_extra_answerable
            && !self.options.skip_extra_for.iter().any(|s| canonical_number(s) == kpi_id)
    }
}

impl std::fmt::Debug for KpiCurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KpiCurator")
            .field("kpis", &self.mapping.len())
            .field("options", &self.options)
            .field("metric", &self.metric.name())
            .finish()
    }
}

/// Example for `answer` in `paragraph`, or `None` when it does not occur
fn answerable_example(source_file: &str, mut paragraph: String, question: &str, answer: &str) -> Option<KpiExample> {
    let mut answer_start = answer_offsets(&paragraph, answer);
    if answer_start.is_empty() {
        return None;
    }
    // Offset 0 is reserved for unanswerable examples
    if answer_start.contains(&0) {
        paragraph.insert(0, ' ');
        answer_start.iter_mut().for_each(|o| *o += 1);
    }
    Some(KpiExample {
        source_file: source_file.to_string(),
        paragraph,
        question: question.to_string(),
        answer: answer.to_string(),
        answer_start,
    })
}

fn dedup(examples: Vec<KpiExample>) -> Vec<KpiExample> {
    let mut seen = HashSet::new();
    examples.into_iter().filter(|e| seen.insert(e.key())).collect()
}

/// Split a `["first", "second"]` cell into paragraphs. A wrong opening or
/// closing bracket is repaired; anything else that is not a bracketed list
/// yields `None`.
pub fn split_relevant_paragraphs(raw: &str) -> Option<Vec<String>> {
    let mut fixed = raw.trim().to_string();
    if fixed.starts_with(['{', ']']) {
        fixed.replace_range(..1, "[");
    } else if fixed.ends_with(['}', '[']) {
        fixed.pop();
        fixed.push(']');
    }

    let inner = fixed.strip_prefix('[')?.strip_suffix(']')?.trim();
    let inner = inner.strip_prefix(['"', '\u{201C}']).unwrap_or(inner);
    let inner = inner.strip_suffix(['"', '\u{201D}']).unwrap_or(inner);

    let paragraphs: Vec<String> = PARAGRAPH_SEPARATOR
        .split(inner)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect();
    (!paragraphs.is_empty()).then_some(paragraphs)
}

/// Report names are normalized to end in `.pdf`; `report,pdf` and a
/// missing extension are repaired
pub fn pdf_file_name(name: &str) -> String {
    let name = name.trim();
    let lower = name.to_ascii_lowercase();
    let stem = if lower.ends_with(".pdf") {
        &name[..lower.find(".pdf").unwrap_or(name.len() - 4)]
    } else if lower.ends_with(",pdf") {
        &name[..name.len() - 4]
    } else {
        name
    };
    format!("{}.pdf", stem.trim())
}

/// `[3, 4]` as page numbers
fn parse_pages(raw: &str) -> Option<Vec<usize>> {
    let inner = raw.trim().strip_prefix('[')?.strip_suffix(']')?;
    inner.split(',').map(|p| p.trim().parse().ok()).collect()
}

/// `7.0` and `7` name the same KPI and the same year
fn canonical_number(value: &str) -> String {
    let value = value.trim();
    match value.parse::<f64>() {
        Ok(n) if n.is_finite() && n.fract() == 0.0 => format!("{}", n as i64),
        Ok(n) if n.is_finite() => n.to_string(),
        _ => value.to_string(),
    }
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

fn lowercase_headers<R: Read>(reader: &mut csv::Reader<R>) -> std::result::Result<Vec<String>, FormatError> {
    Ok(reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{FEFF}').to_lowercase())
        .collect())
}

fn is_annotation_sheet(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_lowercase();
    path.is_file() && name.ends_with(".csv") && name.contains("annotation")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Paragraph;
    use crate::geometry::BoundingBox;
    use pretty_assertions::assert_eq;

    const MAPPING: &str = "kpi_id,question,add_year,kpi_category\n\
                           0,What is the company name?,False,TEXT\n\
                           2,What is the total scope 1 emission?,True,\"TEXT, TABLE\"\n\
                           3.0,What is the net zero target year?,False,TABLE\n";

    fn mapping() -> KpiMapping {
        KpiMapping::from_reader(MAPPING.as_bytes()).unwrap()
    }

    fn annotation(kpi_id: &str, answer: &str, paragraphs: &str, pages: Vec<usize>) -> KpiAnnotation {
        KpiAnnotation {
            company: "ACME".to_string(),
            source_file: "acme_2022.pdf".to_string(),
            source_pages: pages,
            kpi_id: kpi_id.to_string(),
            year: "2022.0".to_string(),
            answer: answer.to_string(),
            data_type: "TEXT".to_string(),
            relevant_paragraphs: paragraphs.to_string(),
        }
    }

    fn report(pages: &[&[&str]]) -> StructuredDocument {
        let mut paragraphs = Vec::new();
        for (page, texts) in pages.iter().enumerate() {
            for text in *texts {
                paragraphs.push(Paragraph {
                    page,
                    text: text.to_string(),
                    bbox: BoundingBox::new(72.0, 600.0, 500.0, 700.0),
                    font: "Helvetica".to_string(),
                    font_size: 10.0,
                });
            }
        }
        StructuredDocument::new("acme_2022.pdf", pages.len(), paragraphs)
    }

    fn curator(options: KpiCurationOptions) -> KpiCurator {
        KpiCurator::new(mapping(), options).unwrap()
    }

    #[test]
    fn test_mapping_questions() {
        let mapping = mapping();
        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.question("0", "2022").as_deref(), Some("What is the company name?"));
        assert_eq!(
            mapping.question("2.0", "2022.0").as_deref(),
            Some("What is the total scope 1 emission in year 2022?")
        );
        assert_eq!(mapping.question("8", "2022"), None);
    }

    #[test]
    fn test_mapping_categories() {
        let mapping = mapping();
        assert!(mapping.accepts("2", "TABLE"));
        assert!(mapping.accepts("3", "TABLE"));
        assert!(!mapping.accepts("3", "TEXT"));
        assert!(!mapping.accepts("42", "TEXT"));
    }

    #[test]
    fn test_mapping_requires_question_column() {
        match KpiMapping::from_reader("kpi_id,text\n1,x\n".as_bytes()) {
            Err(FormatError::MissingColumn(column)) => assert_eq!(column, "question"),
            other => panic!("expected missing column, got {other:?}"),
        }
    }

    #[test]
    fn test_split_relevant_paragraphs() {
        assert_eq!(split_relevant_paragraphs(r#"["only one"]"#), Some(vec!["only one".to_string()]));
        assert_eq!(
            split_relevant_paragraphs(r#"["first", "second","third"]"#),
            Some(vec!["first".to_string(), "second".to_string(), "third".to_string()])
        );
        // Repaired brackets
        assert_eq!(split_relevant_paragraphs(r#"{"a"]"#), Some(vec!["a".to_string()]));
        assert_eq!(split_relevant_paragraphs(r#"["a"}"#), Some(vec!["a".to_string()]));
        assert_eq!(split_relevant_paragraphs("plain text"), None);
        assert_eq!(split_relevant_paragraphs("[]"), None);
    }

    #[test]
    fn test_pdf_file_name() {
        assert_eq!(pdf_file_name("acme_2022.pdf"), "acme_2022.pdf");
        assert_eq!(pdf_file_name("acme_2022 .PDF"), "acme_2022.pdf");
        assert_eq!(pdf_file_name("acme_2022,pdf"), "acme_2022.pdf");
        assert_eq!(pdf_file_name(" acme_2022 "), "acme_2022.pdf");
    }

    #[test]
    fn test_load_annotation_sheet() {
        let csv = "company,source_file,source_page,kpi_id,year,answer,data_type,relevant_paragraphs\n\
                   ACME,acme_2022,\"[3, 4]\",2,2022,120 tCO2e, TEXT ,\"[\"\"a\"\", \"\"b\"\"]\"\n\
                   ACME,acme_2022,3,2,2022,120 tCO2e,TEXT,\"[\"\"a\"\"]\"\n\
                   ,acme_2022,[3],2,2022,120 tCO2e,TEXT,\"[\"\"a\"\"]\"\n";
        let rows = KpiAnnotationLoader::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_file, "acme_2022.pdf");
        assert_eq!(rows[0].source_pages, vec![3, 4]);
        assert_eq!(rows[0].data_type, "TEXT");
    }

    #[test]
    fn test_samples_split_and_filter() {
        let curator = curator(KpiCurationOptions::default());
        let annotations = vec![
            annotation("2", "120\ntCO2e", r#"["Scope 1 was 120 tCO2e", "see table"]"#, vec![3, 5]),
            // Data type not allowed for the KPI
            annotation("3", "2050", r#"["net zero by 2050"]"#, vec![1]),
            // Unknown KPI
            annotation("8", "x", r#"["x"]"#, vec![1]),
        ];
        let samples = curator.samples(&annotations);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].answer, "120 tCO2e");
        assert_eq!(samples[0].question, "What is the total scope 1 emission in year 2022?");
        assert_eq!((samples[0].page, samples[1].page), (3, 5));
        assert_eq!(samples[1].relevant_paragraph, "see table");

        let excluding = curator_excluding("ACME");
        assert!(excluding.samples(&annotations).is_empty());
    }

    fn curator_excluding(company: &str) -> KpiCurator {
        curator(KpiCurationOptions {
            exclude_companies: vec![company.to_string()],
            ..KpiCurationOptions::default()
        })
    }

    #[test]
    fn test_closest_paragraph() {
        let curator = curator(KpiCurationOptions::default());
        let page = [
            "Our people are our strength.",
            "Total scope 1 emissions were 120 tCO2e (2021: 130 tCO2e).",
        ];
        // Annotated text contained in an extracted paragraph
        assert_eq!(
            curator.closest_paragraph(&page, "scope 1 emissions were 120", "120 tco2e"),
            "total scope 1 emissions were 120 tco2e 2021: 130 tco2e."
        );
        // Similar paragraph holding the answer
        assert_eq!(
            curator.closest_paragraph(&page, "total scope one emisions 120 tco2e", "120 tco2e"),
            "total scope 1 emissions were 120 tco2e 2021: 130 tco2e."
        );
        // Nothing holds the answer: keep the annotation
        assert_eq!(curator.closest_paragraph(&page, "water use", "4 ml"), "water use");
    }

    #[test]
    fn test_answerable_uses_extracted_paragraph() {
        let curator = curator(KpiCurationOptions {
            find_extra_answerable: false,
            ..KpiCurationOptions::default()
        });
        let document = report(&[
            &["Introduction to the report"],
            &["Gross scope 1 emissions amounted to 120 tCO2e in 2022."],
        ]);
        let samples = curator.samples(&[annotation("2", "120 tCO2e", r#"["scope 1 emissions amounted to"]"#, vec![2])]);

        let examples = curator.answerable(&samples, &[document]);
        assert_eq!(examples.len(), 1);
        let example = &examples[0];
        assert_eq!(example.paragraph, "gross scope 1 emissions amounted to 120 tco2e in 2022.");
        assert_eq!(example.answer, "120 tco2e");
        assert_eq!(example.answer_start, vec![36]);
        assert!(example.is_answerable());
    }

    #[test]
    fn test_answer_at_start_is_shifted() {
        let curator = curator(KpiCurationOptions::default());
        let samples = curator.samples(&[annotation("2", "120 tCO2e", r#"["120 tCO2e of scope 1"]"#, vec![1])]);
        // No extracted report: the annotated paragraph is used
        let examples = curator.answerable(&samples, &[]);
        assert_eq!(examples[0].paragraph, " 120 tco2e of scope 1");
        assert_eq!(examples[0].answer_start, vec![1]);
    }

    #[test]
    fn test_extra_answerable_on_other_pages() {
        let document = report(&[
            &["Scope 1 emissions: 120 tCO2e"],
            &["Unrelated text"],
            &["In summary 120 tCO2e were emitted"],
        ]);
        let annotations = [annotation("2", "120 tCO2e", r#"["Scope 1 emissions: 120 tCO2e"]"#, vec![1])];

        let searching = curator(KpiCurationOptions::default());
        let samples = searching.samples(&annotations);
        let examples = searching.answerable(&samples, std::slice::from_ref(&document));
        let paragraphs: Vec<&str> = examples.iter().map(|e| e.paragraph.as_str()).collect();
        assert_eq!(paragraphs, vec!["scope 1 emissions: 120 tco2e", "in summary 120 tco2e were emitted"]);

        let skipping = curator(KpiCurationOptions {
            skip_extra_for: vec!["2".to_string()],
            ..KpiCurationOptions::default()
        });
        assert_eq!(skipping.answerable(&samples, &[document]).len(), 1);
    }

    #[test]
    fn test_unanswerable_from_relevance() {
        let curator = curator(KpiCurationOptions::default());
        let samples = curator.samples(&[annotation("2", "120 tCO2e", r#"["Scope 1: 120 tCO2e"]"#, vec![1])]);
        let entry = |pdf: &str, kpi: &str, paragraph: &str, relevant: bool| RelevanceEntry {
            pdf_name: pdf.to_string(),
            page: 0,
            kpi_id: kpi.to_string(),
            question: "What is the total scope 1 emission?".to_string(),
            paragraph: paragraph.to_string(),
            relevant,
        };
        let relevance = vec![
            entry("acme_2022.pdf", "2", "We report emissions under the GHG protocol", true),
            entry("acme_2022.pdf", "2", "Emissions were 120 tCO2e overall", true),
            entry("acme_2022.pdf", "2.0", "Scope 1: 120 tCO2e", true),
            entry("acme_2022.pdf", "2", "Not flagged", false),
            entry("other.pdf", "2", "Report without annotations", true),
            entry("acme_2022.pdf", "2", "We report emissions under the GHG protocol", true),
        ];

        let examples = curator.unanswerable(&samples, &relevance);
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].paragraph, "we report emissions under the ghg protocol");
        assert_eq!(examples[0].answer, "");
        assert!(!examples[0].is_answerable());
    }

    #[test]
    fn test_curate_combines_and_deduplicates() {
        let document = report(&[&["Gross scope 1 emissions were 120 tCO2e."]]);
        let annotations = [
            annotation("2", "120 tCO2e", r#"["scope 1 emissions were 120 tCO2e"]"#, vec![1]),
            annotation("2", "120 tCO2e", r#"["Gross scope 1 emissions"]"#, vec![1]),
        ];
        let relevance = [RelevanceEntry {
            pdf_name: "acme_2022.pdf".to_string(),
            page: 0,
            kpi_id: "2".to_string(),
            question: "What is the total scope 1 emission in year 2022?".to_string(),
            paragraph: "Scope 2 emissions are reported separately".to_string(),
            relevant: true,
        }];

        let examples = curator(KpiCurationOptions::default()).curate(&annotations, &[document], &relevance);
        assert_eq!(examples.len(), 2);
        assert_eq!(examples.iter().filter(|e| e.is_answerable()).count(), 1);

        let without = curator(KpiCurationOptions {
            create_unanswerable: false,
            ..KpiCurationOptions::default()
        });
        assert!(without
            .curate(&annotations, &[report(&[&["Gross scope 1 emissions were 120 tCO2e."]])], &relevance)
            .iter()
            .all(KpiExample::is_answerable));
    }

    #[test]
    fn test_relevance_table() {
        let csv = "page,pdf_name,unique_paragraph_id,paragraph,kpi_id,question,paragraph_relevance_flag\n\
                   4,acme_2022,7,Some text,2.0,Q?,1\n\
                   5,acme_2022.pdf,8,Other text,2,Q?,0\n";
        let entries = RelevanceEntry::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pdf_name, "acme_2022.pdf");
        assert_eq!(entries[0].page, 4);
        assert!(entries[0].relevant);
        assert!(!entries[1].relevant);
    }

    #[test]
    fn test_invalid_split_ratio_rejected() {
        let options = KpiCurationOptions {
            val_ratio: Some(2.0),
            ..KpiCurationOptions::default()
        };
        assert!(matches!(
            KpiCurator::new(mapping(), options),
            Err(ConfigError::InvalidValidationRatio(_))
        ));
    }
}
