//! Bounded-concurrency batch execution with a wall-clock deadline.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{BatchError, Error};

/// A unit of work with a natural identifier, unique within one batch.
pub trait BatchJob: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
}

impl BatchJob for String {
    fn id(&self) -> &str {
        self
    }
}

/// A job whose worker returned an error.
#[derive(Debug)]
pub struct JobFailure<J> {
    /// The job exactly as it was submitted.
    pub job: J,
    /// What the worker returned.
    pub error: Error,
}

/// Outcome of one [`BatchEngine::run`] call.
///
/// Every submitted job lands in exactly one of `successful`, `failed` or
/// `cancelled`.
#[derive(Debug)]
pub struct BatchResult<J, T = ()> {
    /// Worker outputs keyed by job id.
    pub successful: BTreeMap<String, T>,
    /// Jobs whose worker failed.
    pub failed: Vec<JobFailure<J>>,
    /// Jobs that had not finished when the deadline passed.
    pub cancelled: Vec<J>,
}

impl<J, T> BatchResult<J, T> {
    fn empty() -> Self {
        Self {
            successful: BTreeMap::new(),
            failed: Vec::new(),
            cancelled: Vec::new(),
        }
    }

    /// Number of jobs accounted for.
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len() + self.cancelled.len()
    }

    /// True when every job succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }
}

/// Runs independent jobs on a fixed number of concurrent slots.
///
/// Cancellation is cooperative. When the deadline passes, jobs still waiting
/// for a slot never start; jobs already running are left to finish in the
/// background and are reported as cancelled.
#[derive(Debug, Clone)]
pub struct BatchEngine {
    max_workers: usize,
    timeout: Duration,
}

impl BatchEngine {
    /// Create an engine with `max_workers` slots and an overall `timeout`.
    ///
    /// # Errors
    ///
    /// Fails with [`BatchError::InvalidWorkerCount`] if `max_workers` is zero.
    pub fn new(max_workers: usize, timeout: Duration) -> Result<Self, Error> {
        if max_workers == 0 {
            return Err(BatchError::InvalidWorkerCount.into());
        }
        Ok(Self {
            max_workers,
            timeout,
        })
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `worker` once per job.
    ///
    /// Per-job failures are reported in the result, never as `Err`.
    pub async fn run<J, T, F, Fut>(&self, jobs: Vec<J>, worker: F) -> Result<BatchResult<J, T>, Error>
    where
        J: BatchJob,
        T: Send + 'static,
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        self.run_with(jobs, worker, |_, _| {}).await
    }

    /// Like [`run`](Self::run), calling `on_failure` exactly once for each
    /// failed job with the job and its error.
    ///
    /// # Errors
    ///
    /// Fails with [`BatchError::DuplicateJob`] if two jobs share an id. No
    /// job is started in that case.
    pub async fn run_with<J, T, F, Fut, C>(
        &self,
        jobs: Vec<J>,
        worker: F,
        mut on_failure: C,
    ) -> Result<BatchResult<J, T>, Error>
    where
        J: BatchJob,
        T: Send + 'static,
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
        C: FnMut(&J, &Error),
    {
        {
            let mut seen = HashSet::with_capacity(jobs.len());
            for job in &jobs {
                if !seen.insert(job.id()) {
                    return Err(BatchError::DuplicateJob {
                        id: job.id().to_string(),
                    }
                    .into());
                }
            }
        }

        // A timeout too large to represent means no deadline at all.
        let deadline = Instant::now().checked_add(self.timeout);
        let slots = Arc::new(Semaphore::new(self.max_workers));
        let worker = Arc::new(worker);
        debug!(jobs = jobs.len(), max_workers = self.max_workers, "Starting batch");

        // Copies kept so unfinished jobs can be reported after the deadline.
        let mut outstanding: Vec<Option<J>> = jobs.iter().cloned().map(Some).collect();
        let mut pending = FuturesUnordered::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let slots = Arc::clone(&slots);
            let worker = Arc::clone(&worker);
            let handle = tokio::spawn(async move {
                // A closed semaphore means the deadline passed before this
                // job got a slot.
                let Ok(_permit) = slots.acquire_owned().await else {
                    return None;
                };
                Some(worker(job).await)
            });
            pending.push(async move { (index, handle.await) });
        }

        let mut result = BatchResult::empty();
        loop {
            let next = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, pending.next()).await,
                None => Ok(pending.next().await),
            };
            match next {
                Ok(Some((index, joined))) => {
                    let Some(job) = outstanding[index].take() else {
                        continue;
                    };
                    match joined {
                        Ok(Some(Ok(output))) => {
                            result.successful.insert(job.id().to_string(), output);
                        }
                        Ok(Some(Err(error))) => {
                            debug!(job = job.id(), error = %error, "Job failed");
                            on_failure(&job, &error);
                            result.failed.push(JobFailure { job, error });
                        }
                        Ok(None) => result.cancelled.push(job),
                        Err(join_error) => {
                            warn!(job = job.id(), error = %join_error, "Worker did not complete");
                            let error: Error = BatchError::WorkerPanicked {
                                id: job.id().to_string(),
                            }
                            .into();
                            on_failure(&job, &error);
                            result.failed.push(JobFailure { job, error });
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    slots.close();
                    warn!(timeout_secs = self.timeout.as_secs_f64(), "Batch timed out");
                    break;
                }
            }
        }

        result.cancelled.extend(outstanding.into_iter().flatten());

        info!(
            successful = result.successful.len(),
            failed = result.failed.len(),
            cancelled = result.cancelled.len(),
            "Batch finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvalidInputError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn jobs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("job-{i}")).collect()
    }

    fn boom(job: &str) -> Error {
        InvalidInputError::Other {
            message: format!("{job} failed"),
        }
        .into()
    }

    #[test]
    fn zero_workers_is_a_setup_error() {
        let err = BatchEngine::new(0, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Batch(BatchError::InvalidWorkerCount)));
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected_before_running() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);
        let engine = BatchEngine::new(2, Duration::from_secs(5)).unwrap();

        let err = engine
            .run(vec!["a".to_string(), "a".to_string()], move |_job| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Batch(BatchError::DuplicateJob { .. })));
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successes_are_keyed_by_job_id() {
        let engine = BatchEngine::new(3, Duration::from_secs(5)).unwrap();
        let result = engine
            .run(jobs(5), |job| async move { Ok(job.len()) })
            .await
            .unwrap();

        assert_eq!(result.successful.len(), 5);
        assert_eq!(result.successful["job-3"], 5);
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn failures_are_data_and_callback_fires_once_per_failure() {
        let engine = BatchEngine::new(2, Duration::from_secs(5)).unwrap();
        let mut seen = Vec::new();

        let result = engine
            .run_with(
                jobs(6),
                |job| async move {
                    if job.ends_with('1') || job.ends_with('4') {
                        Err(boom(&job))
                    } else {
                        Ok(())
                    }
                },
                |job, error| seen.push((job.clone(), error.to_string())),
            )
            .await
            .unwrap();

        assert_eq!(result.failed.len(), 2);
        assert_eq!(result.successful.len(), 4);
        assert_eq!(result.total(), 6);

        seen.sort();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "job-1");
        assert!(seen[0].1.contains("job-1 failed"));
        assert_eq!(seen[1].0, "job-4");

        let failed: HashSet<_> = result.failed.iter().map(|f| f.job.as_str()).collect();
        assert_eq!(failed, HashSet::from(["job-1", "job-4"]));
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_max_workers() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let engine = BatchEngine::new(3, Duration::from_secs(5)).unwrap();

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let result = engine
            .run(jobs(12), move |_job| {
                let (active, peak) = (Arc::clone(&a), Arc::clone(&p));
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(result.successful.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_unstarted_jobs() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);
        let engine = BatchEngine::new(1, Duration::from_secs(5)).unwrap();

        let result = engine
            .run(jobs(4), move |job| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let secs = if job == "job-0" { 1 } else { 60 };
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(result.successful.len(), 1);
        assert!(result.successful.contains_key("job-0"));
        assert_eq!(result.cancelled.len(), 3);
        assert_eq!(result.total(), 4);

        // job-1 was running at the deadline; job-2 and job-3 never started.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_worker_is_recorded_as_failure() {
        let engine = BatchEngine::new(2, Duration::from_secs(5)).unwrap();
        let result = engine
            .run(jobs(2), |job| async move {
                if job == "job-0" {
                    panic!("worker exploded");
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(result.failed.len(), 1);
        assert!(matches!(
            result.failed[0].error,
            Error::Batch(BatchError::WorkerPanicked { .. })
        ));
        assert_eq!(result.successful.len(), 1);
    }

    #[tokio::test]
    async fn unbounded_timeout_runs_every_job() {
        let engine = BatchEngine::new(1, Duration::MAX).unwrap();
        let result = engine
            .run(jobs(3), |_job| async move { Ok(()) })
            .await
            .unwrap();
        assert_eq!(result.successful.len(), 3);
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn timeout_of_u64_max_seconds_is_accepted() {
        let engine = BatchEngine::new(2, Duration::from_secs(u64::MAX)).unwrap();
        let result = engine
            .run(vec!["a".to_string()], |_job| async move { Ok(()) })
            .await
            .unwrap();
        assert!(result.successful.contains_key("a"));
    }

    #[tokio::test]
    async fn empty_batch_is_complete() {
        let engine = BatchEngine::new(4, Duration::from_secs(1)).unwrap();
        let result = engine
            .run(Vec::<String>::new(), |_job| async move { Ok(()) })
            .await
            .unwrap();
        assert_eq!(result.total(), 0);
        assert!(result.is_complete());
    }
}
