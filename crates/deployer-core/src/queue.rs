//! Generic bounded-worker priority job queue.
//!
//! Jobs are dispatched to a fixed pool of workers in priority order (higher
//! priority first, FIFO within a priority class). A job whose handler reports
//! a retryable failure is re-enqueued with exponentially growing delay up to
//! a bounded attempt budget; exhaustion or a fatal failure resolves the
//! caller's completion handle with the error. Delayed enqueue is also exposed
//! directly for schedulers that manage their own cadence, like the
//! confirmation monitor's fixed-interval polling.

use async_trait::async_trait;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex, Semaphore};
use tokio::task::JoinHandle;

/// Tuning for one job queue instance.
#[derive(Debug, Clone)]
pub struct QueueConfig {
	/// Number of concurrent workers draining the queue.
	pub workers: usize,
	/// Attempts per job before a retryable failure becomes permanent.
	pub max_attempts: u32,
	/// Base delay for the exponential retry backoff.
	pub retry_base_delay: Duration,
}

/// Errors a job handler can report.
///
/// The variant decides what the queue does next: `Retryable` failures are
/// re-enqueued while attempts remain, `Fatal` failures resolve the job
/// immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
	/// Transient failure; the queue may retry the job.
	#[error("retryable: {0}")]
	Retryable(String),
	/// Definitive failure; retrying cannot help.
	#[error("fatal: {0}")]
	Fatal(String),
}

/// Per-invocation context handed to the handler.
#[derive(Debug, Clone, Copy)]
pub struct JobContext {
	/// 1-based attempt number for this invocation.
	pub attempt: u32,
	/// The queue's attempt budget.
	pub max_attempts: u32,
}

impl JobContext {
	/// Whether a retryable failure now would exhaust the budget.
	pub fn is_final_attempt(&self) -> bool {
		self.attempt >= self.max_attempts
	}
}

/// Trait implemented by the consumers of a job queue.
#[async_trait]
pub trait JobHandler<J>: Send + Sync + 'static {
	/// Executes one job. The queue interprets the error variant per the
	/// retry policy described on [`JobError`].
	async fn handle(&self, job: &J, ctx: &JobContext) -> Result<(), JobError>;
}

/// Completion handle for a pushed job.
///
/// Resolves once the job succeeds, fails fatally, or exhausts its retry
/// budget. Dropping the handle detaches the caller without affecting the job.
pub struct JobHandle {
	rx: oneshot::Receiver<Result<(), JobError>>,
}

impl JobHandle {
	/// Waits for the job's final outcome.
	pub async fn wait(self) -> Result<(), JobError> {
		self.rx
			.await
			.unwrap_or_else(|_| Err(JobError::Fatal("queue shut down before completion".into())))
	}
}

/// Scheduling key: higher priority class first, earlier arrival first within
/// a class. The queue pops the maximum, so the derived lexicographic `Ord`
/// gives exactly that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct JobPriority {
	class: u32,
	arrival: Reverse<u64>,
}

struct PendingJob<J> {
	job: J,
	priority: u32,
	attempt: u32,
	done: oneshot::Sender<Result<(), JobError>>,
}

struct QueueState<J> {
	order: PriorityQueue<u64, JobPriority>,
	jobs: HashMap<u64, PendingJob<J>>,
}

struct QueueInner<J> {
	config: QueueConfig,
	state: Mutex<QueueState<J>>,
	/// One permit per queued job; closing it stops the workers.
	ready: Semaphore,
	seq: AtomicU64,
	workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Priority job queue with a bounded worker pool.
pub struct JobQueue<J> {
	inner: Arc<QueueInner<J>>,
}

impl<J> Clone for JobQueue<J> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<J: Send + 'static> JobQueue<J> {
	/// Creates an idle queue; call [`start`](Self::start) to spawn workers.
	pub fn new(config: QueueConfig) -> Self {
		Self {
			inner: Arc::new(QueueInner {
				config,
				state: Mutex::new(QueueState {
					order: PriorityQueue::new(),
					jobs: HashMap::new(),
				}),
				ready: Semaphore::new(0),
				seq: AtomicU64::new(0),
				workers: Mutex::new(Vec::new()),
			}),
		}
	}

	/// Spawns the configured number of workers draining this queue.
	pub async fn start(&self, handler: Arc<dyn JobHandler<J>>) {
		let mut workers = self.inner.workers.lock().await;
		for _ in 0..self.inner.config.workers {
			let inner = self.inner.clone();
			let handler = handler.clone();
			workers.push(tokio::spawn(async move {
				QueueInner::worker_loop(inner, handler).await;
			}));
		}
	}

	/// Enqueues a job at the given priority and returns its completion handle.
	pub async fn push(&self, job: J, priority: u32) -> JobHandle {
		let (tx, rx) = oneshot::channel();
		let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
		self.inner
			.enqueue(
				seq,
				PendingJob {
					job,
					priority,
					attempt: 1,
					done: tx,
				},
			)
			.await;
		JobHandle { rx }
	}

	/// Enqueues a job after a delay. The delay runs off-queue, so delayed
	/// jobs never occupy a worker while waiting.
	pub fn push_after(&self, job: J, priority: u32, delay: Duration) -> JobHandle {
		let (tx, rx) = oneshot::channel();
		let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
		let inner = self.inner.clone();
		tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			inner
				.enqueue(
					seq,
					PendingJob {
						job,
						priority,
						attempt: 1,
						done: tx,
					},
				)
				.await;
		});
		JobHandle { rx }
	}

	/// Stops the workers. Jobs already being handled finish; queued jobs
	/// stay queued and their handles resolve with a shutdown error when the
	/// queue is dropped.
	pub fn shutdown(&self) {
		self.inner.ready.close();
	}
}

impl<J: Send + 'static> QueueInner<J> {
	async fn enqueue(self: &Arc<Self>, seq: u64, pending: PendingJob<J>) {
		{
			let mut state = self.state.lock().await;
			let priority = JobPriority {
				class: pending.priority,
				arrival: Reverse(seq),
			};
			state.order.push(seq, priority);
			state.jobs.insert(seq, pending);
		}
		self.ready.add_permits(1);
	}

	async fn pop(self: &Arc<Self>) -> Option<(u64, PendingJob<J>)> {
		let mut state = self.state.lock().await;
		let (seq, _) = state.order.pop()?;
		let pending = state.jobs.remove(&seq)?;
		Some((seq, pending))
	}

	async fn worker_loop(inner: Arc<Self>, handler: Arc<dyn JobHandler<J>>) {
		loop {
			let permit = match inner.ready.acquire().await {
				Ok(permit) => permit,
				Err(_) => break, // queue shut down
			};
			permit.forget();

			let Some((seq, mut pending)) = inner.pop().await else {
				continue;
			};

			let ctx = JobContext {
				attempt: pending.attempt,
				max_attempts: inner.config.max_attempts,
			};

			match handler.handle(&pending.job, &ctx).await {
				Ok(()) => {
					let _ = pending.done.send(Ok(()));
				},
				Err(JobError::Retryable(reason)) if pending.attempt < inner.config.max_attempts => {
					let delay = inner.config.retry_base_delay
						* 2u32.saturating_pow(pending.attempt.saturating_sub(1));
					tracing::warn!(
						attempt = pending.attempt,
						delay_ms = delay.as_millis() as u64,
						"Job failed, retrying: {}",
						reason
					);
					pending.attempt += 1;
					let inner = inner.clone();
					tokio::spawn(async move {
						tokio::time::sleep(delay).await;
						inner.enqueue(seq, pending).await;
					});
				},
				Err(err) => {
					let _ = pending.done.send(Err(err));
				},
			}
		}
	}
}
