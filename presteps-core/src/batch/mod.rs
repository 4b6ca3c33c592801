//! Batch extraction over many documents
//!
//! Each document runs as an independent job on a fixed worker pool. A
//! failing document is reported in the summary and never aborts the others
//! unless `stop_on_error` is set.
//!
//! ```rust,no_run
//! use presteps::batch::{batch_extract_files, BatchOptions};
//! use presteps::Extractor;
//! use std::path::Path;
//!
//! let options = BatchOptions::default()
//!     .with_parallelism(4)
//!     .with_progress_callback(|info| println!("{}", info.format_progress()));
//!
//! let summary = batch_extract_files(
//!     vec!["a.pdf", "b.pdf"],
//!     Extractor::default(),
//!     Path::new("out"),
//!     options,
//! );
//! println!("{summary}");
//! ```

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::extraction::Extractor;

pub mod job;
pub mod progress;
pub mod result;
pub mod worker;

pub use job::{BatchJob, JobOperation, JobOutput};
pub use progress::{BatchProgress, ProgressCallback, ProgressInfo};
pub use result::{BatchSummary, JobResult};
pub use worker::WorkerPool;

/// Options for a batch run
#[derive(Clone)]
pub struct BatchOptions {
    /// Number of worker threads
    pub parallelism: usize,
    /// How often the progress callback fires
    pub progress_interval: Duration,
    /// Cancel the remaining documents after the first failure
    pub stop_on_error: bool,
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallelism: num_cpus::get(),
            progress_interval: Duration::from_millis(100),
            stop_on_error: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("parallelism", &self.parallelism)
            .field("progress_interval", &self.progress_interval)
            .field("stop_on_error", &self.stop_on_error)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl BatchOptions {
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressInfo) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }
}

/// Cancels a running batch from another thread. Jobs already started run
/// to completion.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Collects jobs and runs them on a worker pool
pub struct BatchProcessor {
    options: BatchOptions,
    jobs: Vec<BatchJob>,
    cancelled: Arc<AtomicBool>,
    progress: Arc<BatchProgress>,
}

impl BatchProcessor {
    pub fn new(options: BatchOptions) -> Self {
        Self {
            options,
            jobs: Vec::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(BatchProgress::new()),
        }
    }

    pub fn add_job(&mut self, job: BatchJob) {
        self.jobs.push(job);
        self.progress.add_job();
    }

    pub fn add_jobs(&mut self, jobs: impl IntoIterator<Item = BatchJob>) {
        for job in jobs {
            self.add_job(job);
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Handle that stays usable after `execute` takes the processor
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    pub fn get_progress(&self) -> ProgressInfo {
        self.progress.get_info()
    }

    /// Run every job and wait for all of them
    pub fn execute(self) -> BatchSummary {
        let start_time = Instant::now();
        if self.jobs.is_empty() {
            return BatchSummary::empty();
        }

        let workers = self.options.parallelism.min(self.jobs.len()).max(1);
        info!(jobs = self.jobs.len(), workers, "starting batch");

        let finished = Arc::new(AtomicBool::new(false));
        let reporter = self.options.progress_callback.as_ref().map(|callback| {
            let progress = Arc::clone(&self.progress);
            let callback = Arc::clone(callback);
            let finished = Arc::clone(&finished);
            let interval = self.options.progress_interval;
            thread::spawn(move || {
                while !finished.load(Ordering::SeqCst) {
                    let info = progress.get_info();
                    callback.on_progress(&info);
                    if info.is_complete() {
                        break;
                    }
                    thread::sleep(interval);
                }
            })
        });

        let results = WorkerPool::new(workers).process_jobs(
            self.jobs,
            Arc::clone(&self.progress),
            Arc::clone(&self.cancelled),
            self.options.stop_on_error,
        );

        finished.store(true, Ordering::SeqCst);
        if let Some(handle) = reporter {
            let _ = handle.join();
        }
        if let Some(callback) = &self.options.progress_callback {
            callback.on_progress(&self.progress.get_info());
        }

        let summary = BatchSummary::from_results(
            results,
            self.cancelled.load(Ordering::SeqCst),
            start_time.elapsed(),
        );
        info!(
            total = summary.total_jobs,
            successful = summary.successful,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "batch finished"
        );
        summary
    }
}

/// Run `operation` once per file
pub fn batch_process_files<P, F>(files: Vec<P>, operation: F, options: BatchOptions) -> BatchSummary
where
    P: AsRef<Path>,
    F: Fn(&Path) -> crate::error::Result<JobOutput> + Clone + Send + 'static,
{
    let mut processor = BatchProcessor::new(options);
    for file in files {
        let path = file.as_ref().to_path_buf();
        let operation = operation.clone();
        processor.add_job(BatchJob::new(path.display().to_string(), move || operation(&path)));
    }
    processor.execute()
}

/// Extract every file into `output_dir` with one shared extractor
pub fn batch_extract_files<P: AsRef<Path>>(
    files: Vec<P>,
    extractor: Extractor,
    output_dir: &Path,
    options: BatchOptions,
) -> BatchSummary {
    let extractor = Arc::new(extractor);
    let mut processor = BatchProcessor::new(options);
    processor.add_jobs(
        files
            .iter()
            .map(|file| BatchJob::extract_file(Arc::clone(&extractor), file.as_ref(), output_dir)),
    );
    processor.execute()
}
