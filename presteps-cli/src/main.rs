use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use presteps::batch::{batch_extract_files, BatchOptions};
use presteps::config::load_json;
use presteps::curation::{
    AnnotationLoader, Curator, DatasetFormat, DatasetRecord, DatasetWriter, KpiAnnotationLoader, KpiCurator,
    KpiMapping, Label, RelevanceEntry, TrainingRecord,
};
use presteps::{
    AmbiguousPolicy, CurationConfig, DocumentSerializer, ExtractionSettings, Extractor, KpiCurationOptions,
    StructuredDocument,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "presteps",
    about = "Turn PDF reports into structured JSON and labeled training data",
    version,
    author
)]
struct Cli {
    /// Log level; RUST_LOG takes precedence when set
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract paragraphs from a PDF file or every PDF in a directory
    Extraction(ExtractionArgs),

    /// Label extracted paragraphs against an annotation table
    Curation(CurationArgs),

    /// Build question-answering examples from KPI annotation sheets
    KpiCuration(KpiCurationArgs),
}

#[derive(Args)]
struct ExtractionArgs {
    /// PDF file or directory of PDF files
    input: PathBuf,

    /// Where `<name>_output.json` files are written (defaults to the input directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Skip documents whose output file already exists
    #[arg(long)]
    skip_extracted_files: bool,

    /// Extract without writing output files
    #[arg(long)]
    no_store: bool,

    /// Attempt extraction from password-protected documents
    #[arg(long)]
    force: bool,

    /// Minimum alphabetic characters per paragraph (0 keeps everything)
    #[arg(long)]
    min_paragraph_length: Option<usize>,

    /// Number of documents processed in parallel
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Stop after the first failed document
    #[arg(long)]
    stop_on_error: bool,

    /// JSON file with extraction settings; flags override it
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct CurationArgs {
    /// Extraction JSON file or directory of them
    input: PathBuf,

    /// CSV with question_id and expected_answer columns
    annotations: PathBuf,

    /// Dataset file, or directory for train/val files with --val-ratio
    #[arg(short, long)]
    output: PathBuf,

    /// Scores below this are negative
    #[arg(long)]
    low: Option<f64>,

    /// Scores above this are positive
    #[arg(long)]
    high: Option<f64>,

    /// Keep records scored between the thresholds
    #[arg(long)]
    keep_ambiguous: bool,

    /// Keep only the best positive paragraph per annotation
    #[arg(long)]
    top_one: bool,

    /// Negative records kept per positive record
    #[arg(long)]
    neg_pos_ratio: Option<usize>,

    /// Fraction of records held out as validation data
    #[arg(long)]
    val_ratio: Option<f64>,

    /// Seed for sampling and shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Dataset format (defaults to the output extension, then json)
    #[arg(short, long, value_enum)]
    format: Option<FormatArg>,

    /// JSON file with curation settings; flags override it
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct KpiCurationArgs {
    /// Annotation sheet (CSV), or a directory of `*annotation*.csv` sheets
    #[arg(long)]
    annotations: PathBuf,

    /// Extraction JSON file or directory of them
    #[arg(long)]
    extracted: PathBuf,

    /// CSV with kpi_id, question, add_year and kpi_category columns
    #[arg(long)]
    kpi_mapping: PathBuf,

    /// CSV of paragraphs flagged by a relevance model, for unanswerable examples
    #[arg(long)]
    relevance: Option<PathBuf>,

    /// Dataset file, or directory for train/val files with --val-ratio
    #[arg(short, long)]
    output: PathBuf,

    /// Ignore annotations of this company (repeatable)
    #[arg(long = "exclude-company")]
    exclude_companies: Vec<String>,

    /// Do not search other pages for paragraphs containing an answer
    #[arg(long)]
    no_extra_answerable: bool,

    /// Do not add unanswerable examples
    #[arg(long)]
    no_unanswerable: bool,

    /// Fraction of examples held out as validation data
    #[arg(long)]
    val_ratio: Option<f64>,

    /// Seed for shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Dataset format (defaults to the output extension, then json)
    #[arg(short, long, value_enum)]
    format: Option<FormatArg>,

    /// JSON file with KPI curation settings; flags override it
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Jsonl,
    Csv,
}

impl From<FormatArg> for DatasetFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Json => DatasetFormat::Json,
            FormatArg::Jsonl => DatasetFormat::JsonLines,
            FormatArg::Csv => DatasetFormat::Csv,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    match cli.command {
        Commands::Extraction(args) => run_extraction(args),
        Commands::Curation(args) => run_curation(args),
        Commands::KpiCuration(args) => run_kpi_curation(args),
    }
}

fn init_logging(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_extraction(args: ExtractionArgs) -> Result<ExitCode> {
    let mut settings: ExtractionSettings = match &args.config {
        Some(path) => load_json(path).context("Failed to load extraction settings")?,
        None => ExtractionSettings::default(),
    };
    if args.skip_extracted_files {
        settings.skip_extracted_files = true;
    }
    if args.no_store {
        settings.store_to_file = false;
    }
    if args.force {
        settings.decode.force = true;
    }
    if let Some(length) = args.min_paragraph_length {
        settings.min_paragraph_length = length;
    }
    settings.validate().context("Invalid extraction settings")?;

    let files = collect_files(&args.input, "pdf")?;
    if files.is_empty() {
        println!("No PDF files found in {}", args.input.display());
        return Ok(ExitCode::SUCCESS);
    }

    let output_dir = match args.output_dir {
        Some(dir) => dir,
        None => default_output_dir(&args.input),
    };
    if settings.store_to_file {
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
    }

    let mut options = BatchOptions::default().stop_on_error(args.stop_on_error);
    if let Some(jobs) = args.jobs {
        options = options.with_parallelism(jobs);
    }
    info!(documents = files.len(), output_dir = %output_dir.display(), "extracting");

    let summary = batch_extract_files(files, Extractor::new(settings), &output_dir, options);
    for result in &summary.results {
        println!("{result}");
    }
    println!("{summary}");

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run_curation(args: CurationArgs) -> Result<ExitCode> {
    let mut config: CurationConfig = match &args.config {
        Some(path) => load_json(path).context("Failed to load curation settings")?,
        None => CurationConfig::default(),
    };
    if let Some(low) = args.low {
        config.thresholds.low = low;
    }
    if let Some(high) = args.high {
        config.thresholds.high = high;
    }
    if args.keep_ambiguous {
        config.ambiguous = AmbiguousPolicy::Keep;
    }
    if args.top_one {
        config.top_one = true;
    }
    if let Some(ratio) = args.neg_pos_ratio {
        config.negatives_per_positive = Some(ratio);
    }
    if let Some(ratio) = args.val_ratio {
        config.val_ratio = Some(ratio);
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    let curator = Curator::new(config.clone()).context("Invalid curation settings")?;

    let annotations = AnnotationLoader::load_csv(&args.annotations)
        .with_context(|| format!("Failed to load annotations from {}", args.annotations.display()))?;
    let documents = collect_files(&args.input, "json")?;

    let serializer = DocumentSerializer::new();
    let mut records: Vec<TrainingRecord> = Vec::new();
    let mut failed = 0;
    for path in &documents {
        match serializer.read_file(path) {
            Ok(document) => {
                let curated = curator.curate(&document, &annotations);
                println!("ok       {} ({} records)", path.display(), curated.len());
                records.extend(curated);
            }
            Err(e) => {
                failed += 1;
                warn!(path = %path.display(), error = %e, "skipping document");
                println!("failed   {}: {e}", path.display());
            }
        }
    }

    write_dataset(&records, &args.output, args.format, config.val_ratio, config.seed)?;

    let count = |label: Label| records.iter().filter(|r| r.label == label).count();
    println!(
        "{} records ({} positive, {} negative, {} ambiguous) from {} documents, {} failed",
        records.len(),
        count(Label::Positive),
        count(Label::Negative),
        count(Label::Ambiguous),
        documents.len(),
        failed
    );

    Ok(if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run_kpi_curation(args: KpiCurationArgs) -> Result<ExitCode> {
    let mut options: KpiCurationOptions = match &args.config {
        Some(path) => load_json(path).context("Failed to load KPI curation settings")?,
        None => KpiCurationOptions::default(),
    };
    options.exclude_companies.extend(args.exclude_companies);
    if args.no_extra_answerable {
        options.find_extra_answerable = false;
    }
    if args.no_unanswerable {
        options.create_unanswerable = false;
    }
    if let Some(ratio) = args.val_ratio {
        options.val_ratio = Some(ratio);
    }
    if let Some(seed) = args.seed {
        options.seed = seed;
    }

    let mapping = KpiMapping::load_csv(&args.kpi_mapping)
        .with_context(|| format!("Failed to load KPI mapping from {}", args.kpi_mapping.display()))?;
    let curator = KpiCurator::new(mapping, options.clone()).context("Invalid KPI curation settings")?;
    let annotations = KpiAnnotationLoader::load(&args.annotations)
        .with_context(|| format!("Failed to load annotations from {}", args.annotations.display()))?;
    let relevance = match &args.relevance {
        Some(path) if options.create_unanswerable => RelevanceEntry::load_csv(path)
            .with_context(|| format!("Failed to load relevance table from {}", path.display()))?,
        _ => Vec::new(),
    };

    let (documents, failed) = read_documents(&args.extracted)?;
    let examples = curator.curate(&annotations, &documents, &relevance);
    write_dataset(&examples, &args.output, args.format, options.val_ratio, options.seed)?;

    let answerable = examples.iter().filter(|e| e.is_answerable()).count();
    println!(
        "{} examples ({} answerable, {} unanswerable) from {} annotations, {} documents, {} failed",
        examples.len(),
        answerable,
        examples.len() - answerable,
        annotations.len(),
        documents.len(),
        failed
    );

    Ok(if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Every readable extraction output under `input` and the number that
/// could not be read
fn read_documents(input: &Path) -> Result<(Vec<StructuredDocument>, usize)> {
    let serializer = DocumentSerializer::new();
    let mut documents = Vec::new();
    let mut failed = 0;
    for path in collect_files(input, "json")? {
        match serializer.read_file(&path) {
            Ok(document) => documents.push(document),
            Err(e) => {
                failed += 1;
                warn!(path = %path.display(), error = %e, "skipping document");
                println!("failed   {}: {e}", path.display());
            }
        }
    }
    Ok((documents, failed))
}

/// Write one dataset file, or train/val files into `output` when a
/// validation ratio is set
fn write_dataset<R: DatasetRecord>(
    records: &[R],
    output: &Path,
    format: Option<FormatArg>,
    val_ratio: Option<f64>,
    seed: u64,
) -> Result<()> {
    let format = format
        .map(DatasetFormat::from)
        .or_else(|| DatasetFormat::from_path(output))
        .unwrap_or_default();
    let writer = DatasetWriter::new(format);

    match val_ratio {
        Some(ratio) => {
            fs::create_dir_all(output).with_context(|| format!("Failed to create {}", output.display()))?;
            let counts = writer
                .write_split(records, output, ratio, seed)
                .context("Failed to write dataset")?;
            println!("{} train / {} val records -> {}", counts.train, counts.val, output.display());
        }
        None => {
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            writer.write(records, output).context("Failed to write dataset")?;
        }
    }
    Ok(())
}

/// The file itself, or the files in a directory with the given extension
fn collect_files(input: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("{} does not exist", input.display());
    }

    let mut files = Vec::new();
    let entries = fs::read_dir(input).with_context(|| format!("Failed to read {}", input.display()))?;
    for entry in entries {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if path.is_file() && matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn default_output_dir(input: &Path) -> PathBuf {
    if input.is_dir() {
        return input.to_path_buf();
    }
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_curation_flags() {
        let cli = Cli::try_parse_from([
            "presteps",
            "curation",
            "out",
            "annotations.csv",
            "-o",
            "train.jsonl",
            "--low",
            "0.4",
            "--top-one",
            "--neg-pos-ratio",
            "3",
            "--format",
            "csv",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert!(matches!(cli.log_level, LogLevel::Debug));
        match cli.command {
            Commands::Curation(args) => {
                assert_eq!(args.low, Some(0.4));
                assert!(args.top_one);
                assert_eq!(args.neg_pos_ratio, Some(3));
                assert_eq!(args.format.map(DatasetFormat::from), Some(DatasetFormat::Csv));
            }
            _ => panic!("expected curation"),
        }
    }

    #[test]
    fn test_parse_kpi_curation_flags() {
        let cli = Cli::try_parse_from([
            "presteps",
            "kpi-curation",
            "--annotations",
            "sheets",
            "--extracted",
            "out",
            "--kpi-mapping",
            "kpi_mapping.csv",
            "-o",
            "qa",
            "--exclude-company",
            "CEZ",
            "--exclude-company",
            "ACME",
            "--no-unanswerable",
            "--val-ratio",
            "0.2",
        ])
        .unwrap();
        match cli.command {
            Commands::KpiCuration(args) => {
                assert_eq!(args.exclude_companies, vec!["CEZ", "ACME"]);
                assert!(args.no_unanswerable);
                assert!(!args.no_extra_answerable);
                assert_eq!(args.relevance, None);
                assert_eq!(args.val_ratio, Some(0.2));
            }
            _ => panic!("expected kpi-curation"),
        }
    }

    #[test]
    fn test_default_output_dir() {
        assert_eq!(default_output_dir(Path::new("report.pdf")), PathBuf::from("."));
        assert_eq!(default_output_dir(Path::new("in/report.pdf")), PathBuf::from("in"));
    }

    #[test]
    fn test_collect_files_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PDF", "a.pdf", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let files = collect_files(dir.path(), "pdf").unwrap();
        let names: Vec<_> = files.iter().map(|f| f.file_name().unwrap().to_owned()).collect();
        assert_eq!(names, vec!["a.pdf", "b.PDF"]);
        assert!(collect_files(&dir.path().join("missing"), "pdf").is_err());
    }
}
