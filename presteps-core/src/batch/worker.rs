//! Fixed worker pool fed through a channel

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Instant;

use tracing::{debug, warn};

use super::job::{BatchJob, JobOutput};
use super::progress::BatchProgress;
use super::result::JobResult;

/// State shared by every job of one run
struct RunContext {
    progress: Arc<BatchProgress>,
    cancelled: Arc<AtomicBool>,
    stop_on_error: bool,
    results: mpsc::Sender<(usize, JobResult)>,
}

enum WorkerMessage {
    Job(usize, BatchJob, Arc<RunContext>),
    Shutdown,
}

/// Threads pulling jobs from a shared queue
pub struct WorkerPool {
    workers: Vec<Worker>,
    sender: mpsc::Sender<WorkerMessage>,
}

impl WorkerPool {
    pub fn new(num_workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..num_workers.max(1))
            .map(|id| Worker::new(id, Arc::clone(&receiver)))
            .collect();
        Self { workers, sender }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Run all jobs and return one result per job in submission order.
    /// Jobs not started once `cancelled` is set are reported as cancelled.
    pub fn process_jobs(
        self,
        jobs: Vec<BatchJob>,
        progress: Arc<BatchProgress>,
        cancelled: Arc<AtomicBool>,
        stop_on_error: bool,
    ) -> Vec<JobResult> {
        let names: Vec<String> = jobs.iter().map(|job| job.name().to_string()).collect();
        let (result_sender, result_receiver) = mpsc::channel();

        let collector = {
            let mut results: Vec<Option<JobResult>> = vec![None; jobs.len()];
            thread::spawn(move || {
                for (idx, result) in result_receiver {
                    results[idx] = Some(result);
                }
                results
            })
        };

        let context = Arc::new(RunContext {
            progress,
            cancelled,
            stop_on_error,
            results: result_sender,
        });

        for (idx, job) in jobs.into_iter().enumerate() {
            if self
                .sender
                .send(WorkerMessage::Job(idx, job, Arc::clone(&context)))
                .is_err()
            {
                break;
            }
        }
        drop(context);
        self.shutdown();

        let results = collector.join().unwrap_or_else(|_| {
            warn!("result collector panicked");
            Vec::new()
        });
        let mut results = results.into_iter();
        names
            .into_iter()
            .map(|job_name| {
                results
                    .next()
                    .flatten()
                    .unwrap_or(JobResult::Cancelled { job_name })
            })
            .collect()
    }

    /// Stop the workers once queued jobs are drained
    pub fn shutdown(self) {
        for _ in &self.workers {
            let _ = self.sender.send(WorkerMessage::Shutdown);
        }
        for worker in self.workers {
            worker.join();
        }
    }
}

struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, receiver: Arc<Mutex<mpsc::Receiver<WorkerMessage>>>) -> Self {
        let thread = thread::spawn(move || loop {
            let message = match receiver.lock() {
                Ok(receiver) => receiver.recv(),
                Err(_) => break,
            };
            match message {
                Ok(WorkerMessage::Job(idx, job, context)) => {
                    let result = run_job(job, &context);
                    let _ = context.results.send((idx, result));
                }
                Ok(WorkerMessage::Shutdown) | Err(_) => break,
            }
        });
        Self {
            id,
            thread: Some(thread),
        }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(worker = self.id, "worker thread panicked");
            }
        }
    }
}

fn run_job(job: BatchJob, context: &RunContext) -> JobResult {
    let (job_name, operation) = job.into_parts();
    if context.cancelled.load(Ordering::SeqCst) {
        context.progress.cancel_job();
        return JobResult::Cancelled { job_name };
    }

    context.progress.start_job();
    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(operation));
    let duration = start.elapsed();

    let error = match outcome {
        Ok(Ok(JobOutput::Completed { output_files })) => {
            context.progress.complete_job();
            debug!(job = %job_name, ?duration, "job completed");
            return JobResult::Success {
                job_name,
                duration,
                output_files,
            };
        }
        Ok(Ok(JobOutput::Skipped { reason })) => {
            context.progress.skip_job();
            return JobResult::Skipped { job_name, reason };
        }
        Ok(Err(error)) => error.to_string(),
        Err(panic) => panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .map(|message| format!("job panicked: {message}"))
            .unwrap_or_else(|| "job panicked".to_string()),
    };

    context.progress.fail_job();
    warn!(job = %job_name, %error, "job failed");
    if context.stop_on_error {
        context.cancelled.store(true, Ordering::SeqCst);
    }
    JobResult::Failed {
        job_name,
        duration,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, PrestepsError};

    fn run(jobs: Vec<BatchJob>, workers: usize, stop_on_error: bool) -> (Vec<JobResult>, Arc<BatchProgress>) {
        let progress = Arc::new(BatchProgress::new());
        for _ in &jobs {
            progress.add_job();
        }
        let results = WorkerPool::new(workers).process_jobs(
            jobs,
            Arc::clone(&progress),
            Arc::new(AtomicBool::new(false)),
            stop_on_error,
        );
        (results, progress)
    }

    fn ok(name: &str) -> BatchJob {
        BatchJob::new(name, || Ok(JobOutput::completed(vec![])))
    }

    fn failing(name: &str) -> BatchJob {
        let document = name.to_string();
        BatchJob::new(name, move || Err(PrestepsError::from(DecodeError::Empty { document })))
    }

    #[test]
    fn test_results_in_submission_order() {
        let jobs: Vec<BatchJob> = (0..20).map(|i| ok(&format!("doc{i}.pdf"))).collect();
        let (results, progress) = run(jobs, 4, false);

        let names: Vec<&str> = results.iter().map(|r| r.job_name()).collect();
        let expected: Vec<String> = (0..20).map(|i| format!("doc{i}.pdf")).collect();
        assert_eq!(names, expected);
        assert!(results.iter().all(|r| r.is_success()));
        assert!(progress.get_info().is_complete());
    }

    #[test]
    fn test_failure_does_not_abort_others() {
        let jobs = vec![ok("a.pdf"), failing("b.pdf"), ok("c.pdf")];
        let (results, progress) = run(jobs, 2, false);
        assert!(results[0].is_success());
        assert_eq!(results[1].error(), Some("b.pdf: empty input"));
        assert!(results[2].is_success());
        assert_eq!(progress.get_info().failed_jobs, 1);
    }

    #[test]
    fn test_stop_on_error_cancels_remaining() {
        let jobs = vec![failing("a.pdf"), ok("b.pdf"), ok("c.pdf")];
        let (results, _) = run(jobs, 1, true);
        assert!(results[0].is_failed());
        assert!(results[1].is_cancelled());
        assert!(results[2].is_cancelled());
    }

    #[test]
    fn test_panicking_job_is_reported_as_failure() {
        let jobs = vec![BatchJob::new("boom.pdf", || panic!("corrupt state")), ok("b.pdf")];
        let (results, _) = run(jobs, 1, false);
        assert_eq!(results[0].error(), Some("job panicked: corrupt state"));
        assert!(results[1].is_success());
    }

    #[test]
    fn test_pool_size() {
        assert_eq!(WorkerPool::new(0).size(), 1);
        let pool = WorkerPool::new(3);
        assert_eq!(pool.size(), 3);
        pool.shutdown();
    }
}
