//! Extraction pipeline: bytes to [`StructuredDocument`] to JSON on disk

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ExtractionSettings;
use crate::document::{Paragraph, StructuredDocument};
use crate::error::{DecodeError, Result};
use crate::paragraph::ParagraphBuilder;
use crate::serializer::{output_file_name, DocumentSerializer};
use crate::text::PageDecoder;

/// What happened to one input file
#[derive(Debug)]
pub enum ExtractionOutcome {
    /// Extracted; `output` is set when the document was stored
    Extracted {
        document: StructuredDocument,
        output: Option<PathBuf>,
    },
    /// Output already present and `skip_extracted_files` is set
    Skipped { output: PathBuf },
}

/// Decoder, paragraph builder and length filter for one configuration
#[derive(Debug, Clone)]
pub struct Extractor {
    settings: ExtractionSettings,
    decoder: PageDecoder,
    builder: ParagraphBuilder,
    serializer: DocumentSerializer,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractionSettings::default())
    }
}

impl Extractor {
    /// Settings are expected to be validated by the caller
    pub fn new(settings: ExtractionSettings) -> Self {
        Self {
            decoder: PageDecoder::with_options(settings.decode.clone()),
            builder: ParagraphBuilder::with_options(settings.layout.clone()),
            serializer: DocumentSerializer::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &ExtractionSettings {
        &self.settings
    }

    /// Extract a document held in memory
    pub fn extract(&self, bytes: &[u8], source: &str) -> std::result::Result<StructuredDocument, DecodeError> {
        let decoded = self.decoder.decode_document(bytes, source)?;
        let paragraphs = self.builder.build(&decoded.runs);
        let total = paragraphs.len();
        let paragraphs: Vec<Paragraph> = paragraphs
            .into_iter()
            .filter(|p| p.alphabetic_len() >= self.settings.min_paragraph_length)
            .collect();

        debug!(
            source,
            runs = decoded.runs.len(),
            paragraphs = paragraphs.len(),
            filtered = total - paragraphs.len(),
            "extracted document"
        );
        Ok(StructuredDocument::new(source, decoded.page_count, paragraphs))
    }

    /// Read and extract a file. The document is named by its file name.
    pub fn extract_file(&self, path: &Path) -> Result<StructuredDocument> {
        let bytes = fs::read(path)?;
        Ok(self.extract(&bytes, &source_name(path))?)
    }

    /// Output path of `input` inside `output_dir`
    pub fn output_path(&self, input: &Path, output_dir: &Path) -> PathBuf {
        output_dir.join(output_file_name(&source_name(input)))
    }

    /// Extract a file and, when `store_to_file` is set, write it as
    /// `<stem>_output.json` into `output_dir`
    pub fn process_file(&self, input: &Path, output_dir: &Path) -> Result<ExtractionOutcome> {
        let output = self.output_path(input, output_dir);
        if self.settings.skip_extracted_files && output.exists() {
            info!(input = %input.display(), "output exists, skipping");
            return Ok(ExtractionOutcome::Skipped { output });
        }

        let document = self.extract_file(input)?;
        let output = if self.settings.store_to_file {
            self.serializer.write_file(&document, &output)?;
            info!(
                input = %input.display(),
                output = %output.display(),
                paragraphs = document.paragraphs().len(),
                "stored extraction"
            );
            Some(output)
        } else {
            None
        };
        Ok(ExtractionOutcome::Extracted { document, output })
    }
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
