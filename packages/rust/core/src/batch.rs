//! Bounded-concurrency batch execution with per-job state and selective retry.
//!
//! Jobs live in one mutex-guarded list together with a FIFO queue of indices.
//! Workers pop from the queue under the lock, so a job is handed to exactly one
//! worker at a time. Every run is spawned as its own task: a panicking run
//! marks only that job as failed.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use paperpage_shared::{BatchId, PaperpageError, Result, clamp_workers};

use crate::pipeline::GenerationRequest;

/// Executes one request. Returns the generated title on success.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, request: &GenerationRequest) -> Result<String>;
}

/// Lifecycle of a job: `queued → running → success | failed`, and
/// `failed → queued` on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Success,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request tracked by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationJob {
    pub id: String,
    pub request: GenerationRequest,
    pub state: JobState,
    /// Failure text for failed jobs.
    pub message: Option<String>,
    pub result_title: Option<String>,
}

impl GenerationJob {
    fn new(request: GenerationRequest) -> Self {
        Self {
            id: request.id.clone(),
            request,
            state: JobState::Queued,
            message: None,
            result_title: None,
        }
    }

    fn requeue(&mut self) {
        self.state = JobState::Queued;
        self.message = None;
        self.result_title = None;
    }
}

/// Aggregate counts, always derived from current job states.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
    /// Finished (success or failed) jobs as a percentage of `total`.
    pub percent_complete: f64,
}

impl BatchSummary {
    pub fn from_jobs(jobs: &[GenerationJob]) -> Self {
        let count = |state: JobState| jobs.iter().filter(|j| j.state == state).count();
        let total = jobs.len();
        let success = count(JobState::Success);
        let failed = count(JobState::Failed);
        let percent_complete = if total == 0 {
            0.0
        } else {
            (success + failed) as f64 * 100.0 / total as f64
        };

        Self {
            total,
            queued: count(JobState::Queued),
            running: count(JobState::Running),
            success,
            failed,
            percent_complete,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.queued == 0 && self.running == 0
    }
}

/// Observer for batch progress.
pub trait BatchProgress: Send + Sync {
    fn job_started(&self, job: &GenerationJob);
    fn job_finished(&self, job: &GenerationJob);
    fn batch_finished(&self, summary: &BatchSummary);
}

/// No-op progress observer for headless/test usage.
pub struct SilentBatchProgress;

impl BatchProgress for SilentBatchProgress {
    fn job_started(&self, _job: &GenerationJob) {}
    fn job_finished(&self, _job: &GenerationJob) {}
    fn batch_finished(&self, _summary: &BatchSummary) {}
}

struct BatchState {
    jobs: Vec<GenerationJob>,
    queue: VecDeque<usize>,
}

/// Runs a batch of jobs with at most `workers` (1..=3) in flight.
pub struct BatchOrchestrator {
    batch_id: BatchId,
    state: Arc<Mutex<BatchState>>,
    runner: Arc<dyn JobRunner>,
    progress: Arc<dyn BatchProgress>,
    workers: usize,
    withheld: Arc<AtomicBool>,
    /// Held for the whole of a run so overlapping run calls take turns.
    run_lock: Mutex<()>,
}

impl BatchOrchestrator {
    /// Create a batch with every job `queued`. Job ids must be unique.
    pub fn new(
        requests: Vec<GenerationRequest>,
        runner: Arc<dyn JobRunner>,
        workers: usize,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for request in &requests {
            if !seen.insert(request.id.as_str()) {
                return Err(PaperpageError::validation(format!(
                    "duplicate job id '{}' in batch",
                    request.id
                )));
            }
        }

        let jobs: Vec<GenerationJob> = requests.into_iter().map(GenerationJob::new).collect();
        let queue = (0..jobs.len()).collect();

        Ok(Self {
            batch_id: BatchId::new(),
            state: Arc::new(Mutex::new(BatchState { jobs, queue })),
            runner,
            progress: Arc::new(SilentBatchProgress),
            workers: clamp_workers(workers),
            withheld: Arc::new(AtomicBool::new(false)),
            run_lock: Mutex::new(()),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn BatchProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    /// Effective worker cap after clamping.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Re-queue every job, discarding prior results, and run the batch.
    ///
    /// Waits for any run already in progress before touching job state.
    pub async fn run_all(&self) -> BatchSummary {
        let _running = self.run_lock.lock().await;
        {
            let mut state = self.state.lock().await;
            let BatchState { jobs, queue } = &mut *state;
            queue.clear();
            for (index, job) in jobs.iter_mut().enumerate() {
                job.requeue();
                queue.push_back(index);
            }
        }
        self.drive().await
    }

    /// Move every `failed` job back to `queued`. Returns how many moved.
    pub async fn requeue_failed(&self) -> usize {
        let mut state = self.state.lock().await;
        let BatchState { jobs, queue } = &mut *state;
        let mut moved = 0;
        for (index, job) in jobs.iter_mut().enumerate() {
            if job.state == JobState::Failed {
                job.requeue();
                queue.push_back(index);
                moved += 1;
            }
        }
        debug!(moved, "failed jobs re-queued");
        moved
    }

    /// Re-queue and run only the jobs currently `failed`.
    pub async fn retry_failed(&self) -> BatchSummary {
        let _running = self.run_lock.lock().await;
        self.requeue_failed().await;
        self.drive().await
    }

    /// Move a single `failed` job back to `queued`.
    pub async fn retry_job(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let BatchState { jobs, queue } = &mut *state;
        let index = jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| PaperpageError::validation(format!("unknown job '{id}'")))?;

        let job = &mut jobs[index];
        if job.state != JobState::Failed {
            return Err(PaperpageError::validation(format!(
                "job '{id}' is {}; only failed jobs can be retried",
                job.state
            )));
        }
        job.requeue();
        queue.push_back(index);
        Ok(())
    }

    /// Run whatever is queued without touching other jobs.
    pub async fn run_pending(&self) -> BatchSummary {
        let _running = self.run_lock.lock().await;
        self.drive().await
    }

    /// Stop workers from taking further queued jobs. Running jobs finish;
    /// the next run call resumes intake.
    pub fn withhold_intake(&self) {
        info!(batch_id = %self.batch_id, "batch intake withheld");
        self.withheld.store(true, Ordering::SeqCst);
    }

    pub async fn summary(&self) -> BatchSummary {
        BatchSummary::from_jobs(&self.state.lock().await.jobs)
    }

    /// Copy of every job in submission order.
    pub async fn snapshot(&self) -> Vec<GenerationJob> {
        self.state.lock().await.jobs.clone()
    }

    #[instrument(skip_all, fields(batch_id = %self.batch_id))]
    async fn drive(&self) -> BatchSummary {
        self.withheld.store(false, Ordering::SeqCst);

        let pending = self.state.lock().await.queue.len();
        let workers = self.workers.min(pending);
        info!(pending, workers, "batch run started");

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            handles.push(tokio::spawn(worker_loop(
                worker,
                Arc::clone(&self.state),
                Arc::clone(&self.runner),
                Arc::clone(&self.progress),
                Arc::clone(&self.withheld),
            )));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "batch worker aborted");
            }
        }

        let summary = self.summary().await;
        info!(
            success = summary.success,
            failed = summary.failed,
            queued = summary.queued,
            "batch run finished"
        );
        self.progress.batch_finished(&summary);
        summary
    }
}

async fn worker_loop(
    worker: usize,
    state: Arc<Mutex<BatchState>>,
    runner: Arc<dyn JobRunner>,
    progress: Arc<dyn BatchProgress>,
    withheld: Arc<AtomicBool>,
) {
    loop {
        if withheld.load(Ordering::SeqCst) {
            debug!(worker, "intake withheld, worker stopping");
            break;
        }

        let (index, started) = {
            let mut guard = state.lock().await;
            let Some(index) = guard.queue.pop_front() else {
                break;
            };
            let job = &mut guard.jobs[index];
            job.state = JobState::Running;
            job.message = None;
            job.result_title = None;
            (index, job.clone())
        };

        debug!(worker, job_id = %started.id, "job started");
        progress.job_started(&started);

        let job_runner = Arc::clone(&runner);
        let request = started.request;
        let outcome = tokio::spawn(async move { job_runner.run_job(&request).await }).await;

        let finished = {
            let mut guard = state.lock().await;
            let job = &mut guard.jobs[index];
            match outcome {
                Ok(Ok(title)) => {
                    job.state = JobState::Success;
                    job.result_title = Some(title);
                }
                Ok(Err(e)) => {
                    warn!(job_id = %job.id, error = %e, "job failed");
                    job.state = JobState::Failed;
                    job.message = Some(e.to_string());
                }
                Err(join_error) => {
                    error!(job_id = %job.id, error = %join_error, "job aborted");
                    job.state = JobState::Failed;
                    job.message = Some(format!("job aborted: {join_error}"));
                }
            }
            job.clone()
        };

        progress.job_finished(&finished);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;
    use paperpage_shared::{SourceDescriptor, SourceKind};

    fn requests(ids: &[&str]) -> Vec<GenerationRequest> {
        ids.iter()
            .map(|id| {
                GenerationRequest::new(
                    *id,
                    SourceDescriptor::new(SourceKind::Pdf, format!("{id}.pdf")),
                )
            })
            .collect()
    }

    /// Tracks peak concurrency; fails ids listed in `failing`.
    #[derive(Default)]
    struct CountingRunner {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        failing: std::sync::Mutex<HashSet<String>>,
    }

    impl CountingRunner {
        fn failing(ids: &[&str]) -> Self {
            let runner = Self::default();
            runner
                .failing
                .lock()
                .unwrap()
                .extend(ids.iter().map(|s| s.to_string()));
            runner
        }
    }

    #[async_trait]
    impl JobRunner for CountingRunner {
        async fn run_job(&self, request: &GenerationRequest) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.lock().unwrap().contains(&request.id) {
                return Err(PaperpageError::GeneratorUnavailable("HTTP 503: busy".into()));
            }
            if request.id == "boom" {
                panic!("runner bug");
            }
            Ok(format!("Title {}", request.id))
        }
    }

    #[tokio::test]
    async fn never_more_running_than_workers() {
        let runner = Arc::new(CountingRunner::default());
        let orchestrator =
            BatchOrchestrator::new(requests(&["a", "b", "c", "d", "e"]), runner.clone(), 2)
                .unwrap();

        let summary = orchestrator.run_all().await;

        assert_eq!(summary.success, 5);
        assert_eq!(summary.percent_complete, 100.0);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 5);
        assert_eq!(runner.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn workers_are_clamped() {
        let runner = Arc::new(CountingRunner::default());
        let orchestrator =
            BatchOrchestrator::new(requests(&["a", "b", "c", "d", "e"]), runner.clone(), 10)
                .unwrap();
        assert_eq!(orchestrator.workers(), 3);
        orchestrator.run_all().await;
        assert!(runner.peak.load(Ordering::SeqCst) <= 3);

        let zero = BatchOrchestrator::new(requests(&["a"]), runner, 0).unwrap();
        assert_eq!(zero.workers(), 1);
    }

    #[tokio::test]
    async fn retry_failed_only_touches_failed_jobs() {
        let runner = Arc::new(CountingRunner::failing(&["b", "c"]));
        let orchestrator =
            BatchOrchestrator::new(requests(&["a", "b", "c"]), runner.clone(), 3).unwrap();

        let summary = orchestrator.run_all().await;
        assert_eq!((summary.success, summary.failed), (1, 2));
        let before = orchestrator.snapshot().await;

        assert_eq!(orchestrator.requeue_failed().await, 2);
        let after = orchestrator.snapshot().await;

        assert_eq!(after[0].state, JobState::Success);
        assert_eq!(after[0].message, before[0].message);
        assert_eq!(after[0].result_title.as_deref(), Some("Title a"));
        for job in &after[1..] {
            assert_eq!(job.state, JobState::Queued);
            assert_eq!(job.message, None);
        }

        runner.failing.lock().unwrap().clear();
        let summary = orchestrator.run_pending().await;
        assert_eq!(summary.success, 3);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn retry_failed_reruns_only_failed_jobs() {
        let runner = Arc::new(CountingRunner::failing(&["b"]));
        let orchestrator =
            BatchOrchestrator::new(requests(&["a", "b", "c"]), runner.clone(), 2).unwrap();

        let summary = orchestrator.run_all().await;
        assert_eq!(summary.failed, 1);

        runner.failing.lock().unwrap().clear();
        let summary = orchestrator.retry_failed().await;
        assert_eq!((summary.success, summary.failed, summary.queued), (3, 0, 0));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 4);

        // Nothing failed, so a further retry runs nothing.
        orchestrator.retry_failed().await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn failures_are_independent() {
        let runner = Arc::new(CountingRunner::failing(&["b"]));
        let orchestrator =
            BatchOrchestrator::new(requests(&["a", "b", "boom", "d"]), runner, 2).unwrap();

        let summary = orchestrator.run_all().await;
        assert_eq!(summary.success, 2);
        assert_eq!(summary.failed, 2);
        assert!(summary.is_settled());

        let jobs = orchestrator.snapshot().await;
        assert!(jobs[1].message.as_deref().unwrap().contains("busy"));
        assert!(jobs[2].message.as_deref().unwrap().contains("aborted"));
        assert_eq!(jobs[3].state, JobState::Success);
    }

    #[tokio::test]
    async fn retry_job_requires_failed_state() {
        let runner = Arc::new(CountingRunner::failing(&["b"]));
        let orchestrator =
            BatchOrchestrator::new(requests(&["a", "b"]), runner, 1).unwrap();
        orchestrator.run_all().await;

        assert!(orchestrator.retry_job("a").await.is_err());
        assert!(orchestrator.retry_job("zzz").await.is_err());
        orchestrator.retry_job("b").await.unwrap();
        assert_eq!(orchestrator.summary().await.queued, 1);
    }

    #[tokio::test]
    async fn overlapping_runs_never_run_a_job_twice_at_once() {
        let runner = Arc::new(CountingRunner::default());
        let orchestrator =
            Arc::new(BatchOrchestrator::new(requests(&["a"]), runner.clone(), 1).unwrap());

        let first = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move { orchestrator.run_all().await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let second = orchestrator.run_all().await;
        let first = first.await.unwrap();

        assert_eq!(first.success, 1);
        assert_eq!(second.success, 1);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let runner = Arc::new(CountingRunner::default());
        let result = BatchOrchestrator::new(requests(&["a", "a"]), runner, 1);
        assert!(matches!(result, Err(PaperpageError::Validation { .. })));
    }

    /// Blocks each run until released while `gated` is set.
    struct GatedRunner {
        gated: AtomicBool,
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl JobRunner for GatedRunner {
        async fn run_job(&self, request: &GenerationRequest) -> Result<String> {
            if self.gated.load(Ordering::SeqCst) {
                self.started.notify_one();
                self.release.notified().await;
            }
            Ok(request.id.clone())
        }
    }

    #[tokio::test]
    async fn withheld_intake_leaves_jobs_queued() {
        let runner = Arc::new(GatedRunner {
            gated: AtomicBool::new(true),
            started: Notify::new(),
            release: Notify::new(),
        });
        let orchestrator = Arc::new(
            BatchOrchestrator::new(requests(&["a", "b", "c"]), runner.clone(), 1).unwrap(),
        );

        let run = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move { orchestrator.run_all().await }
        });

        runner.started.notified().await;
        orchestrator.withhold_intake();
        runner.release.notify_one();

        let summary = run.await.unwrap();
        assert_eq!(summary.success, 1);
        assert_eq!(summary.queued, 2);

        runner.gated.store(false, Ordering::SeqCst);
        let summary = orchestrator.run_pending().await;
        assert_eq!(summary.success, 3);
    }
}
