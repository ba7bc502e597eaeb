//! Worker pool for remote fetches
//!
//! This module handles:
//! - A fixed number of workers pulling from one shared task queue
//! - Per-worker rate limiting (minimum delay between fetches, retries included)
//! - Per-attempt timeouts and the retry policy
//! - Falling back to a minimal result once a task cannot succeed
//! - Graceful cancellation with a bounded grace period
//!
//! Every task that a worker starts yields exactly one [`Completion`], unless the
//! run is cancelled and the task outlives the grace period, in which case it is
//! abandoned and only counted.

use super::retry::RetryPolicy;
use crate::config::{ExecutionStrategy, ScannerConfig};
use crate::state::WorkerState;
use crate::ScanError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// A unit of remote work executed by the pool
#[async_trait]
pub trait Job: Send + Sync + 'static {
    type Task: Send + Sync + 'static;
    type Output: Send + 'static;

    /// Runs one attempt of `task`
    async fn attempt(&self, task: &Self::Task) -> Result<Self::Output, ScanError>;

    /// Produces the result for a task that will not succeed
    fn fallback(&self, task: &Self::Task, error: &ScanError) -> Self::Output;

    /// Short description of a task for logs and timeout errors
    fn describe(&self, task: &Self::Task) -> String;
}

/// Result of one task
#[derive(Debug)]
pub struct Completion<O> {
    pub output: O,
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// True if the output came from the job's fallback
    pub fell_back: bool,
}

/// Worker pool settings
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Minimum spacing between two fetches of the same worker
    pub min_delay: Duration,
    pub task_timeout: Duration,
    /// Time in-flight tasks get to finish after cancellation
    pub grace_period: Duration,
    pub strategy: ExecutionStrategy,
    /// Capacity of the output channel
    pub channel_capacity: usize,
}

impl PoolConfig {
    /// Builds the settings for a pool of `workers` workers from scanner config
    pub fn from_scanner(config: &ScannerConfig, workers: u32) -> Self {
        Self {
            workers: workers.max(1) as usize,
            retry: RetryPolicy::from_config(config),
            min_delay: Duration::from_millis(config.request_delay_ms),
            task_timeout: Duration::from_millis(config.task_timeout_ms),
            grace_period: Duration::from_millis(config.grace_period_ms),
            strategy: config.strategy,
            channel_capacity: 1024,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetryPolicy::default(),
            min_delay: Duration::ZERO,
            task_timeout: Duration::from_secs(30),
            grace_period: Duration::from_secs(5),
            strategy: ExecutionStrategy::Async,
            channel_capacity: 1024,
        }
    }
}

/// Counters shared by all workers of a pool
#[derive(Debug, Default)]
pub struct PoolStats {
    completed: AtomicU64,
    fell_back: AtomicU64,
    retries: AtomicU64,
    exhausted: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time copy of [`PoolStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    /// Tasks that produced a result (success or fallback)
    pub completed: u64,
    /// Results that came from the fallback
    pub fell_back: u64,
    /// Attempts that were followed by another attempt
    pub retries: u64,
    /// Tasks whose retryable failures used up every attempt
    pub exhausted: u64,
    /// Tasks that hit a non-retryable error
    pub failed: u64,
    /// In-flight tasks dropped after the grace period
    pub abandoned: u64,
    /// Queued tasks never started because of cancellation
    pub skipped: u64,
}

impl PoolStats {
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            fell_back: self.fell_back.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

struct Shared<J: Job> {
    job: Arc<J>,
    queue: Arc<Mutex<mpsc::Receiver<J::Task>>>,
    config: PoolConfig,
    cancel: CancellationToken,
    stats: Arc<PoolStats>,
}

/// Bounded pool of workers executing one kind of [`Job`]
pub struct WorkerPool<J: Job> {
    job: Arc<J>,
    config: PoolConfig,
    cancel: CancellationToken,
    stats: Arc<PoolStats>,
}

enum WorkerHandle {
    Task(tokio::task::JoinHandle<()>),
    Thread(std::thread::JoinHandle<()>),
}

/// Handle on the running workers of a pool
pub struct PoolHandle<T> {
    workers: Vec<WorkerHandle>,
    queue: Arc<Mutex<mpsc::Receiver<T>>>,
    stats: Arc<PoolStats>,
}

impl<J: Job> WorkerPool<J> {
    pub fn new(config: PoolConfig, job: Arc<J>, cancel: CancellationToken) -> Self {
        Self {
            job,
            config,
            cancel,
            stats: Arc::new(PoolStats::default()),
        }
    }

    /// Live counters of this pool
    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    /// Starts the workers on a task channel
    ///
    /// Results arrive on the returned receiver in completion order. The
    /// receiver closes once every worker has exited, which happens when the
    /// task channel is closed and drained, or on cancellation.
    pub fn spawn(
        self,
        tasks: mpsc::Receiver<J::Task>,
    ) -> (mpsc::Receiver<Completion<J::Output>>, PoolHandle<J::Task>) {
        let (output_tx, output_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let queue = Arc::new(Mutex::new(tasks));
        let shared = Arc::new(Shared {
            job: self.job,
            queue: Arc::clone(&queue),
            config: self.config.clone(),
            cancel: self.cancel,
            stats: Arc::clone(&self.stats),
        });

        let workers = (0..self.config.workers)
            .map(|id| start_worker(id, Arc::clone(&shared), output_tx.clone()))
            .collect();

        tracing::debug!(
            "Started {} workers ({:?})",
            self.config.workers,
            self.config.strategy
        );

        (
            output_rx,
            PoolHandle {
                workers,
                queue,
                stats: self.stats,
            },
        )
    }

    /// Starts the workers on a fixed set of tasks
    pub fn spawn_iter<I>(self, tasks: I) -> (mpsc::Receiver<Completion<J::Output>>, PoolHandle<J::Task>)
    where
        I: IntoIterator<Item = J::Task>,
    {
        let tasks: Vec<J::Task> = tasks.into_iter().collect();
        let (tx, rx) = mpsc::channel(tasks.len().max(1));
        for task in tasks {
            // capacity covers every task
            let _ = tx.try_send(task);
        }
        drop(tx);
        self.spawn(rx)
    }
}

impl<T> PoolHandle<T> {
    /// Waits for every worker to exit and returns the final counters
    ///
    /// Tasks left in the queue (only possible after cancellation) are counted
    /// as skipped.
    pub async fn join(self) -> PoolStatsSnapshot {
        for worker in self.workers {
            match worker {
                WorkerHandle::Task(handle) => {
                    if let Err(e) = handle.await {
                        tracing::error!("Worker task failed: {}", e);
                    }
                }
                WorkerHandle::Thread(handle) => {
                    match tokio::task::spawn_blocking(move || handle.join()).await {
                        Ok(Ok(())) => {}
                        _ => tracing::error!("Worker thread panicked"),
                    }
                }
            }
        }

        let mut queue = self.queue.lock().await;
        queue.close();
        let mut skipped = 0u64;
        while queue.try_recv().is_ok() {
            skipped += 1;
        }
        if skipped > 0 {
            self.stats.skipped.fetch_add(skipped, Ordering::Relaxed);
            tracing::info!("Skipped {} queued tasks after cancellation", skipped);
        }

        self.stats.snapshot()
    }
}

fn start_worker<J: Job>(
    id: usize,
    shared: Arc<Shared<J>>,
    output: mpsc::Sender<Completion<J::Output>>,
) -> WorkerHandle {
    match shared.config.strategy {
        ExecutionStrategy::Async => WorkerHandle::Task(tokio::spawn(worker_loop(id, shared, output))),
        ExecutionStrategy::Threaded => {
            let thread_shared = Arc::clone(&shared);
            let thread_output = output.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("harvest-worker-{}", id))
                .spawn(move || {
                    match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime.block_on(worker_loop(id, thread_shared, thread_output)),
                        Err(e) => tracing::error!("Worker {} could not start a runtime: {}", id, e),
                    }
                });
            match spawned {
                Ok(handle) => WorkerHandle::Thread(handle),
                Err(e) => {
                    tracing::warn!(
                        "Could not spawn thread for worker {}: {}; running it as a task",
                        id,
                        e
                    );
                    WorkerHandle::Task(tokio::spawn(worker_loop(id, shared, output)))
                }
            }
        }
    }
}

async fn worker_loop<J: Job>(
    id: usize,
    shared: Arc<Shared<J>>,
    output: mpsc::Sender<Completion<J::Output>>,
) {
    let mut pacing = WorkerState::new(shared.config.min_delay);

    loop {
        let next = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => None,
            task = async { shared.queue.lock().await.recv().await } => task,
        };
        let Some(task) = next else {
            break;
        };

        let run = run_task(&shared, &task, &mut pacing);
        tokio::pin!(run);

        let completion = tokio::select! {
            completion = &mut run => Some(completion),
            _ = shared.cancel.cancelled() => {
                match tokio::time::timeout(shared.config.grace_period, &mut run).await {
                    Ok(completion) => Some(completion),
                    Err(_) => {
                        tracing::warn!(
                            "Worker {} abandoned {} after the grace period",
                            id,
                            shared.job.describe(&task)
                        );
                        bump(&shared.stats.abandoned);
                        None
                    }
                }
            }
        };

        if let Some(completion) = completion {
            if output.send(completion).await.is_err() {
                tracing::debug!("Worker {} output closed", id);
                break;
            }
        }
    }

    tracing::trace!("Worker {} exiting after {} fetches", id, pacing.fetch_count);
}

/// Runs one task through the retry policy
async fn run_task<J: Job>(
    shared: &Shared<J>,
    task: &J::Task,
    pacing: &mut WorkerState,
) -> Completion<J::Output> {
    let policy = shared.config.retry;
    let mut attempt = 0;

    loop {
        attempt += 1;
        pacing.pace().await;

        let result = match tokio::time::timeout(
            shared.config.task_timeout,
            shared.job.attempt(task),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ScanError::NavigationTimeout {
                url: shared.job.describe(task),
            }),
        };

        let error = match result {
            Ok(output) => {
                bump(&shared.stats.completed);
                return Completion {
                    output,
                    attempts: attempt,
                    fell_back: false,
                };
            }
            Err(e) => e,
        };

        if error.is_retryable() && policy.should_retry(attempt) {
            bump(&shared.stats.retries);
            let delay = policy.delay_for(attempt);
            tracing::debug!(
                "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                attempt,
                policy.max_attempts,
                shared.job.describe(task),
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        if error.is_retryable() {
            bump(&shared.stats.exhausted);
        } else {
            bump(&shared.stats.failed);
        }
        tracing::warn!(
            "Giving up on {} after {} attempt(s): {}",
            shared.job.describe(task),
            attempt,
            error
        );

        bump(&shared.stats.completed);
        bump(&shared.stats.fell_back);
        return Completion {
            output: shared.job.fallback(task, &error),
            attempts: attempt,
            fell_back: true,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::retry::Backoff;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    /// Test job whose behaviour is picked per instance
    struct TestJob {
        mode: Mode,
        attempts: AtomicU32,
        in_flight: AtomicU32,
        max_in_flight: AtomicU32,
    }

    #[derive(Clone, Copy)]
    enum Mode {
        Succeed,
        AlwaysRender,
        NotRetryable,
        Hang,
        FailOnce,
    }

    impl TestJob {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                mode,
                attempts: AtomicU32::new(0),
                in_flight: AtomicU32::new(0),
                max_in_flight: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Job for TestJob {
        type Task = u32;
        type Output = Result<u32, String>;

        async fn attempt(&self, task: &u32) -> Result<Self::Output, ScanError> {
            let previous = self.attempts.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let result = match self.mode {
                Mode::Succeed => {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    Ok(Ok(*task))
                }
                Mode::AlwaysRender => Err(ScanError::Render {
                    url: task.to_string(),
                    message: "boom".to_string(),
                }),
                Mode::NotRetryable => Err(ScanError::ParseMismatch {
                    url: task.to_string(),
                    message: "layout".to_string(),
                }),
                Mode::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Ok(*task))
                }
                Mode::FailOnce if previous == 0 => Err(ScanError::NavigationTimeout {
                    url: task.to_string(),
                }),
                Mode::FailOnce => Ok(Ok(*task)),
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn fallback(&self, task: &u32, _error: &ScanError) -> Self::Output {
            Err(format!("minimal {}", task))
        }

        fn describe(&self, task: &u32) -> String {
            format!("task {}", task)
        }
    }

    fn config(workers: usize, max_attempts: u32) -> PoolConfig {
        PoolConfig {
            workers,
            retry: RetryPolicy::new(max_attempts, Backoff::Fixed(Duration::from_millis(1))),
            min_delay: Duration::ZERO,
            task_timeout: Duration::from_secs(5),
            grace_period: Duration::from_millis(50),
            strategy: ExecutionStrategy::Async,
            channel_capacity: 16,
        }
    }

    async fn drain<O>(mut rx: mpsc::Receiver<Completion<O>>) -> Vec<Completion<O>> {
        let mut out = Vec::new();
        while let Some(c) = rx.recv().await {
            out.push(c);
        }
        out
    }

    #[tokio::test]
    async fn test_retry_bound_then_fallback() {
        let job = TestJob::new(Mode::AlwaysRender);
        let pool = WorkerPool::new(config(1, 3), Arc::clone(&job), CancellationToken::new());
        let (rx, handle) = pool.spawn_iter(vec![7]);

        let results = drain(rx).await;
        let stats = handle.join().await;

        assert_eq!(job.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].output, Err("minimal 7".to_string()));
        assert_eq!(results[0].attempts, 3);
        assert!(results[0].fell_back);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(stats.fell_back, 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_goes_to_fallback() {
        let job = TestJob::new(Mode::NotRetryable);
        let pool = WorkerPool::new(config(1, 5), Arc::clone(&job), CancellationToken::new());
        let (rx, handle) = pool.spawn_iter(vec![1]);

        let results = drain(rx).await;
        let stats = handle.join().await;

        assert_eq!(job.attempts.load(Ordering::SeqCst), 1);
        assert!(results[0].fell_back);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retries, 0);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let job = TestJob::new(Mode::FailOnce);
        let pool = WorkerPool::new(config(1, 2), Arc::clone(&job), CancellationToken::new());
        let (rx, handle) = pool.spawn_iter(vec![9]);

        let results = drain(rx).await;
        handle.join().await;

        assert_eq!(results[0].output, Ok(9));
        assert_eq!(results[0].attempts, 2);
        assert!(!results[0].fell_back);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_retried() {
        let job = TestJob::new(Mode::Hang);
        let mut cfg = config(1, 2);
        cfg.task_timeout = Duration::from_millis(20);
        let pool = WorkerPool::new(cfg, Arc::clone(&job), CancellationToken::new());
        let (rx, handle) = pool.spawn_iter(vec![3]);

        let results = drain(rx).await;
        let stats = handle.join().await;

        assert_eq!(job.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(results[0].output, Err("minimal 3".to_string()));
        assert_eq!(stats.exhausted, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_has_no_duplicates_or_losses() {
        for workers in [1usize, 5, 20] {
            let job = TestJob::new(Mode::Succeed);
            let pool = WorkerPool::new(config(workers, 2), Arc::clone(&job), CancellationToken::new());
            let (rx, handle) = pool.spawn_iter(0..100u32);

            let results = drain(rx).await;
            let stats = handle.join().await;

            let ids: HashSet<u32> = results
                .iter()
                .map(|c| c.output.clone().unwrap())
                .collect();
            assert_eq!(results.len(), 100, "workers = {}", workers);
            assert_eq!(ids.len(), 100, "workers = {}", workers);
            assert_eq!(stats.completed, 100);
            assert!(job.max_in_flight.load(Ordering::SeqCst) <= workers as u32);
        }
    }

    #[tokio::test]
    async fn test_threaded_strategy_completes_all_tasks() {
        let job = TestJob::new(Mode::Succeed);
        let mut cfg = config(4, 1);
        cfg.strategy = ExecutionStrategy::Threaded;
        let pool = WorkerPool::new(cfg, Arc::clone(&job), CancellationToken::new());
        let (rx, handle) = pool.spawn_iter(0..20u32);

        let results = drain(rx).await;
        let stats = handle.join().await;

        assert_eq!(results.len(), 20);
        assert_eq!(stats.completed, 20);
    }

    #[tokio::test]
    async fn test_per_worker_pacing() {
        let job = TestJob::new(Mode::Succeed);
        let mut cfg = config(1, 1);
        cfg.min_delay = Duration::from_millis(40);
        let pool = WorkerPool::new(cfg, Arc::clone(&job), CancellationToken::new());

        let start = Instant::now();
        let (rx, handle) = pool.spawn_iter(vec![1, 2, 3]);
        drain(rx).await;
        handle.join().await;

        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_cancellation_abandons_in_flight_and_skips_queued() {
        let job = TestJob::new(Mode::Hang);
        let cancel = CancellationToken::new();
        let pool = WorkerPool::new(config(2, 1), Arc::clone(&job), cancel.clone());
        let (rx, handle) = pool.spawn_iter(0..10u32);

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        let results = drain(rx).await;
        let stats = handle.join().await;

        assert!(results.is_empty());
        assert_eq!(stats.abandoned, 2);
        assert_eq!(stats.skipped, 8);
        assert_eq!(stats.completed, 0);
    }
}
