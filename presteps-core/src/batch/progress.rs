//! Progress tracking for batch runs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Snapshot of a running batch
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub skipped_jobs: usize,
    pub failed_jobs: usize,
    pub cancelled_jobs: usize,
    pub running_jobs: usize,
    pub start_time: Instant,
    /// Finished jobs per second
    pub throughput: f64,
}

impl ProgressInfo {
    /// Jobs that reached a final state
    pub fn processed(&self) -> usize {
        self.completed_jobs + self.skipped_jobs + self.failed_jobs + self.cancelled_jobs
    }

    /// 0.0 - 100.0
    pub fn percentage(&self) -> f64 {
        if self.total_jobs == 0 {
            100.0
        } else {
            (self.processed() as f64 / self.total_jobs as f64) * 100.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.processed() >= self.total_jobs
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn estimated_remaining(&self) -> Option<Duration> {
        if self.processed() == 0 || self.throughput <= 0.0 {
            return None;
        }
        let remaining = self.total_jobs.saturating_sub(self.processed());
        Some(Duration::from_secs_f64(remaining as f64 / self.throughput))
    }

    pub fn format_progress(&self) -> String {
        format!(
            "{}/{} ({:.1}%) - {} running, {} skipped, {} failed",
            self.processed(),
            self.total_jobs,
            self.percentage(),
            self.running_jobs,
            self.skipped_jobs,
            self.failed_jobs
        )
    }
}

/// Shared counters updated by the workers
#[derive(Debug)]
pub struct BatchProgress {
    total_jobs: AtomicUsize,
    completed_jobs: AtomicUsize,
    skipped_jobs: AtomicUsize,
    failed_jobs: AtomicUsize,
    cancelled_jobs: AtomicUsize,
    running_jobs: AtomicUsize,
    start_time: Instant,
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchProgress {
    pub fn new() -> Self {
        Self {
            total_jobs: AtomicUsize::new(0),
            completed_jobs: AtomicUsize::new(0),
            skipped_jobs: AtomicUsize::new(0),
            failed_jobs: AtomicUsize::new(0),
            cancelled_jobs: AtomicUsize::new(0),
            running_jobs: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn add_job(&self) {
        self.total_jobs.fetch_add(1, Ordering::SeqCst);
    }

    pub fn start_job(&self) {
        self.running_jobs.fetch_add(1, Ordering::SeqCst);
    }

    pub fn complete_job(&self) {
        self.finish(&self.completed_jobs);
    }

    pub fn skip_job(&self) {
        self.finish(&self.skipped_jobs);
    }

    pub fn fail_job(&self) {
        self.finish(&self.failed_jobs);
    }

    /// A job that was never started
    pub fn cancel_job(&self) {
        self.cancelled_jobs.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self, counter: &AtomicUsize) {
        self.running_jobs.fetch_sub(1, Ordering::SeqCst);
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get_info(&self) -> ProgressInfo {
        let completed_jobs = self.completed_jobs.load(Ordering::SeqCst);
        let skipped_jobs = self.skipped_jobs.load(Ordering::SeqCst);
        let failed_jobs = self.failed_jobs.load(Ordering::SeqCst);

        let elapsed = self.start_time.elapsed().as_secs_f64();
        let finished = completed_jobs + skipped_jobs + failed_jobs;
        let throughput = if elapsed > 0.0 {
            finished as f64 / elapsed
        } else {
            0.0
        };

        ProgressInfo {
            total_jobs: self.total_jobs.load(Ordering::SeqCst),
            completed_jobs,
            skipped_jobs,
            failed_jobs,
            cancelled_jobs: self.cancelled_jobs.load(Ordering::SeqCst),
            running_jobs: self.running_jobs.load(Ordering::SeqCst),
            start_time: self.start_time,
            throughput,
        }
    }
}

/// Receives progress snapshots while a batch runs
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, info: &ProgressInfo);
}

impl<F> ProgressCallback for F
where
    F: Fn(&ProgressInfo) + Send + Sync,
{
    fn on_progress(&self, info: &ProgressInfo) {
        self(info)
    }
}
