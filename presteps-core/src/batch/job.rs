//! Units of work for the batch runner

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::extraction::{ExtractionOutcome, Extractor};

/// Work performed by one job
pub type JobOperation = Box<dyn FnOnce() -> Result<JobOutput> + Send>;

/// What a successful job produced
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutput {
    /// Work done; files written, if any
    Completed { output_files: Vec<PathBuf> },
    /// Nothing to do
    Skipped { reason: String },
}

impl JobOutput {
    pub fn completed(output_files: Vec<PathBuf>) -> Self {
        JobOutput::Completed { output_files }
    }
}

/// A named job, typically one document
pub struct BatchJob {
    name: String,
    operation: JobOperation,
}

impl BatchJob {
    pub fn new<F>(name: impl Into<String>, operation: F) -> Self
    where
        F: FnOnce() -> Result<JobOutput> + Send + 'static,
    {
        Self {
            name: name.into(),
            operation: Box::new(operation),
        }
    }

    /// Extract `input` and store its JSON in `output_dir` according to the
    /// extractor's settings
    pub fn extract_file(extractor: Arc<Extractor>, input: &Path, output_dir: &Path) -> Self {
        let input = input.to_path_buf();
        let output_dir = output_dir.to_path_buf();
        Self::new(input.display().to_string(), move || {
            match extractor.process_file(&input, &output_dir)? {
                ExtractionOutcome::Extracted { output, .. } => {
                    Ok(JobOutput::completed(output.into_iter().collect()))
                }
                ExtractionOutcome::Skipped { output } => Ok(JobOutput::Skipped {
                    reason: format!("{} already exists", output.display()),
                }),
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(self) -> (String, JobOperation) {
        (self.name, self.operation)
    }
}

impl fmt::Debug for BatchJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchJob").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionSettings;
    use presteps_test_suite::utils::{single_line_pdf, write_fixture};

    #[test]
    fn test_custom_job() {
        let job = BatchJob::new("noop", || Ok(JobOutput::completed(vec![])));
        assert_eq!(job.name(), "noop");
        assert_eq!(format!("{job:?}"), "BatchJob { name: \"noop\" }");

        let (name, operation) = job.into_parts();
        assert_eq!(name, "noop");
        assert_eq!(operation().unwrap(), JobOutput::completed(vec![]));
    }

    #[test]
    fn test_extract_file_job() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(
            dir.path(),
            "acme.pdf",
            &single_line_pdf("Scope one emissions reached 120 tCO2e", 11.0),
        )
        .unwrap();

        let extractor = Arc::new(Extractor::default());
        let job = BatchJob::extract_file(Arc::clone(&extractor), &input, dir.path());
        let (_, operation) = job.into_parts();
        assert_eq!(
            operation().unwrap(),
            JobOutput::completed(vec![dir.path().join("acme_output.json")])
        );
    }

    #[test]
    fn test_extract_file_job_skips_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fixture(dir.path(), "acme.pdf", b"never read").unwrap();
        std::fs::write(dir.path().join("acme_output.json"), b"{}").unwrap();

        let extractor = Arc::new(Extractor::new(ExtractionSettings {
            skip_extracted_files: true,
            ..ExtractionSettings::default()
        }));
        let (_, operation) = BatchJob::extract_file(extractor, &input, dir.path()).into_parts();
        assert!(matches!(operation().unwrap(), JobOutput::Skipped { .. }));
    }
}
