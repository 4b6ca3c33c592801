//! Per-job results and the batch summary

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of a single job
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Success {
        job_name: String,
        duration: Duration,
        output_files: Vec<PathBuf>,
    },
    Skipped {
        job_name: String,
        reason: String,
    },
    /// `error` is the display form of the typed error
    Failed {
        job_name: String,
        duration: Duration,
        error: String,
    },
    /// Never started because the batch was cancelled
    Cancelled { job_name: String },
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, JobResult::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobResult::Failed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobResult::Cancelled { .. })
    }

    pub fn job_name(&self) -> &str {
        match self {
            JobResult::Success { job_name, .. }
            | JobResult::Skipped { job_name, .. }
            | JobResult::Failed { job_name, .. }
            | JobResult::Cancelled { job_name } => job_name,
        }
    }

    /// Run time, for jobs that ran
    pub fn duration(&self) -> Option<Duration> {
        match self {
            JobResult::Success { duration, .. } | JobResult::Failed { duration, .. } => {
                Some(*duration)
            }
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobResult::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn output_files(&self) -> &[PathBuf] {
        match self {
            JobResult::Success { output_files, .. } => output_files,
            _ => &[],
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobResult::Success {
                job_name,
                duration,
                output_files,
            } => {
                write!(f, "ok       {job_name} ({:.2}s)", duration.as_secs_f64())?;
                for output in output_files {
                    write!(f, " -> {}", output.display())?;
                }
                Ok(())
            }
            JobResult::Skipped { job_name, reason } => write!(f, "skipped  {job_name}: {reason}"),
            JobResult::Failed { job_name, error, .. } => write!(f, "failed   {job_name}: {error}"),
            JobResult::Cancelled { job_name } => write!(f, "cancelled {job_name}"),
        }
    }
}

/// Totals of a finished batch. `results` is in submission order.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub total_jobs: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Whether the batch was cancelled, explicitly or by `stop_on_error`
    pub cancelled: bool,
    pub duration: Duration,
    pub results: Vec<JobResult>,
}

impl BatchSummary {
    pub fn empty() -> Self {
        Self {
            total_jobs: 0,
            successful: 0,
            skipped: 0,
            failed: 0,
            cancelled: false,
            duration: Duration::ZERO,
            results: Vec::new(),
        }
    }

    pub(crate) fn from_results(results: Vec<JobResult>, cancelled: bool, duration: Duration) -> Self {
        Self {
            total_jobs: results.len(),
            successful: results.iter().filter(|r| r.is_success()).count(),
            skipped: results.iter().filter(|r| r.is_skipped()).count(),
            failed: results.iter().filter(|r| r.is_failed()).count(),
            cancelled,
            duration,
            results,
        }
    }

    /// Jobs that never started
    pub fn not_run(&self) -> usize {
        self.results.iter().filter(|r| r.is_cancelled()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Percentage of jobs that succeeded or had nothing to do
    pub fn success_rate(&self) -> f64 {
        if self.total_jobs == 0 {
            100.0
        } else {
            ((self.successful + self.skipped) as f64 / self.total_jobs as f64) * 100.0
        }
    }

    pub fn failed_jobs(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| r.is_failed())
    }

    pub fn output_files(&self) -> Vec<&PathBuf> {
        self.results.iter().flat_map(|r| r.output_files()).collect()
    }

    pub fn format_report(&self) -> String {
        let mut report = format!(
            "{} documents: {} extracted, {} skipped, {} failed ({:.1}% ok) in {:.2}s",
            self.total_jobs,
            self.successful,
            self.skipped,
            self.failed,
            self.success_rate(),
            self.duration.as_secs_f64()
        );
        if self.cancelled {
            report.push_str(&format!("\ncancelled, {} not run", self.not_run()));
        }
        report
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> Vec<JobResult> {
        vec![
            JobResult::Success {
                job_name: "a.pdf".to_string(),
                duration: Duration::from_millis(250),
                output_files: vec![PathBuf::from("out/a_output.json")],
            },
            JobResult::Skipped {
                job_name: "b.pdf".to_string(),
                reason: "out/b_output.json already exists".to_string(),
            },
            JobResult::Failed {
                job_name: "c.pdf".to_string(),
                duration: Duration::from_millis(5),
                error: "c.pdf: document has no pages".to_string(),
            },
            JobResult::Cancelled {
                job_name: "d.pdf".to_string(),
            },
        ]
    }

    #[test]
    fn test_job_result_accessors() {
        let results = results();
        assert!(results[0].is_success());
        assert_eq!(results[0].output_files().len(), 1);
        assert!(results[1].is_skipped());
        assert_eq!(results[1].duration(), None);
        assert_eq!(results[2].error(), Some("c.pdf: document has no pages"));
        assert!(results[3].is_cancelled());
        assert_eq!(results[3].job_name(), "d.pdf");
    }

    #[test]
    fn test_job_result_display() {
        let results = results();
        assert_eq!(results[0].to_string(), "ok       a.pdf (0.25s) -> out/a_output.json");
        assert_eq!(results[2].to_string(), "failed   c.pdf: c.pdf: document has no pages");
        assert_eq!(results[3].to_string(), "cancelled d.pdf");
    }

    #[test]
    fn test_summary_counts() {
        let summary = BatchSummary::from_results(results(), true, Duration::from_secs(1));
        assert_eq!(summary.total_jobs, 4);
        assert_eq!((summary.successful, summary.skipped, summary.failed), (1, 1, 1));
        assert_eq!(summary.not_run(), 1);
        assert!(summary.has_failures());
        assert_eq!(summary.success_rate(), 50.0);
        assert_eq!(summary.failed_jobs().count(), 1);
        assert_eq!(summary.output_files(), vec![&PathBuf::from("out/a_output.json")]);
        assert!(summary.format_report().ends_with("cancelled, 1 not run"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = BatchSummary::empty();
        assert_eq!(summary.success_rate(), 100.0);
        assert!(!summary.has_failures());
        assert!(summary.to_string().starts_with("0 documents"));
    }
}
