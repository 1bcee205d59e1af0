//! Core deployment engine orchestrating the pipeline.
//!
//! This module contains the main DeployerEngine struct which owns the
//! submission and confirmation worker pools, the durable store, and the
//! event bus, and exposes the pipeline's caller-facing operations:
//! `submit_deployment`, `get_status`, and `submit_batch`. Everything is
//! injected at construction; there is no process-global queue state.

pub mod lifecycle;

use crate::event_bus::EventBus;
use crate::metrics::MetricsAggregator;
use crate::priority::PriorityResolver;
use crate::queue::{JobHandle, JobQueue, QueueConfig};
use crate::state::{DeploymentStateMachine, StateError};
use crate::workers::confirmation::{ConfirmationScheduler, ConfirmationWorker};
use crate::workers::deploy::DeploymentWorker;
use deployer_chain::ChainClientService;
use deployer_config::Config;
use deployer_storage::{DeploymentStore, StorageError};
use deployer_types::{
	current_timestamp, truncate_id, ConfirmationEvent, ConfirmationTask, DeployerEvent,
	DeploymentEvent, DeploymentJob, DeploymentRecord, DeploymentSpec,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

/// Attempt budget for a single confirmation poll invocation.
///
/// This only covers transient storage failures while persisting a known
/// receipt; the poll cadence itself is the scheduler's fixed interval.
const POLL_STORAGE_ATTEMPTS: u32 = 3;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Deployment not found: {0}")]
	NotFound(String),
	#[error("No chain client configured for chain {0}")]
	UnsupportedChain(u64),
}

impl From<StorageError> for EngineError {
	fn from(err: StorageError) -> Self {
		EngineError::Storage(err.to_string())
	}
}

/// Intake result: the new deployment's id plus the async handle that
/// resolves once the job is submitted on-chain or permanently rejected.
pub struct DeploymentSubmission {
	/// Id of the created deployment record.
	pub deployment_id: String,
	/// Completion handle for the submission stage.
	pub handle: JobHandle,
}

/// Main engine that orchestrates the deployment pipeline.
///
/// The DeployerEngine coordinates:
/// - Intake: durable record creation and priority-ordered queueing
/// - Submission: the bounded worker pool driving compile/estimate/submit
/// - Confirmation: the polling pool finalizing records from receipts
/// - Metrics: terminal-event aggregation into per-chain daily counters
#[derive(Clone)]
pub struct DeployerEngine {
	/// Pipeline configuration.
	config: Config,
	/// Durable store for records and metrics.
	store: Arc<DeploymentStore>,
	/// Per-chain execution clients.
	chain: Arc<ChainClientService>,
	/// Deployment record state machine.
	state: Arc<DeploymentStateMachine>,
	/// Chain priority table.
	priority: PriorityResolver,
	/// Submission job queue.
	submissions: JobQueue<DeploymentJob>,
	/// Confirmation polling queue.
	confirmation_queue: JobQueue<ConfirmationTask>,
	/// Event bus for inter-component communication.
	event_bus: EventBus,
	/// Terminal-event metrics aggregator.
	metrics: Arc<MetricsAggregator>,
}

impl DeployerEngine {
	/// Builds the engine and starts both worker pools.
	pub async fn new(
		config: Config,
		store: Arc<DeploymentStore>,
		chain: Arc<ChainClientService>,
	) -> Self {
		let event_bus = EventBus::default();
		let state = Arc::new(DeploymentStateMachine::new(store.clone()));
		let priority = PriorityResolver::from_chains(&config.chains);
		let metrics = Arc::new(MetricsAggregator::new(store.clone()));

		let submissions = JobQueue::new(QueueConfig {
			workers: config.submission.workers,
			max_attempts: config.submission.max_attempts,
			retry_base_delay: Duration::from_millis(config.submission.retry_base_delay_ms),
		});

		let confirmation_queue = JobQueue::new(QueueConfig {
			workers: config.confirmation.workers,
			max_attempts: POLL_STORAGE_ATTEMPTS,
			retry_base_delay: Duration::from_millis(config.submission.retry_base_delay_ms),
		});
		let confirmations = Arc::new(ConfirmationScheduler::new(
			confirmation_queue.clone(),
			Duration::from_millis(config.confirmation.initial_delay_ms),
			Duration::from_millis(config.confirmation.poll_interval_ms),
		));

		confirmation_queue
			.start(Arc::new(ConfirmationWorker::new(
				chain.clone(),
				state.clone(),
				confirmations.clone(),
				event_bus.clone(),
			)))
			.await;

		submissions
			.start(Arc::new(DeploymentWorker::new(
				chain.clone(),
				state.clone(),
				confirmations.clone(),
				event_bus.clone(),
				config.gas.safety_margin_percent,
				config.confirmation.max_retries,
			)))
			.await;

		Self {
			config,
			store,
			chain,
			state,
			priority,
			submissions,
			confirmation_queue,
			event_bus,
			metrics,
		}
	}

	/// Accepts a deployment request.
	///
	/// Creates the durable `Pending` record, queues the job at the chain's
	/// priority, and returns the deployment id together with the async
	/// handle for the submission stage.
	pub async fn submit_deployment(
		&self,
		spec: DeploymentSpec,
	) -> Result<DeploymentSubmission, EngineError> {
		if !self.chain.supports_chain(spec.chain_id) {
			return Err(EngineError::UnsupportedChain(spec.chain_id));
		}

		let deployment_id = uuid::Uuid::new_v4().to_string();
		let record = DeploymentRecord::from_spec(deployment_id.clone(), &spec, current_timestamp());
		self.store.create_deployment(&record).await?;

		let priority = self.priority.resolve(spec.chain_id);
		let job = DeploymentJob {
			deployment_id: deployment_id.clone(),
			user_id: spec.user_id,
			chain_id: spec.chain_id,
			template_code: spec.template_code,
			parameters: spec.parameters,
			gas_settings: spec.gas_settings,
		};
		let handle = self.submissions.push(job, priority).await;

		tracing::info!(
			deployment_id = %truncate_id(&deployment_id),
			chain_id = spec.chain_id,
			priority,
			"Deployment queued"
		);
		self.event_bus
			.publish(DeployerEvent::Deployment(DeploymentEvent::Queued {
				deployment_id: deployment_id.clone(),
				chain_id: spec.chain_id,
				priority,
			}))
			.ok();

		Ok(DeploymentSubmission {
			deployment_id,
			handle,
		})
	}

	/// Returns the latest durable state of a deployment.
	pub async fn get_status(&self, deployment_id: &str) -> Result<DeploymentRecord, EngineError> {
		self.state.get(deployment_id).await.map_err(|e| match e {
			StateError::NotFound(id) => EngineError::NotFound(id),
			other => EngineError::Storage(other.to_string()),
		})
	}

	/// The engine's event bus, for additional consumers.
	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// The metrics aggregator backed by this engine's store.
	pub fn metrics(&self) -> &MetricsAggregator {
		&self.metrics
	}

	/// Main event loop.
	///
	/// Feeds terminal events into the metrics aggregator and exits on
	/// Ctrl+C after shutting the worker pools down.
	pub async fn run(&self) -> Result<(), EngineError> {
		let mut events = self.event_bus.subscribe();

		loop {
			tokio::select! {
				event = events.recv() => match event {
					Ok(DeployerEvent::Confirmation(ConfirmationEvent::Finalized {
						chain_id,
						success,
						gas_used,
						..
					})) => {
						if let Err(e) = self.metrics.record(chain_id, success, gas_used).await {
							tracing::error!(chain_id, error = %e, "Failed to record deployment metrics");
						}
					},
					Ok(_) => {},
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						tracing::warn!(skipped, "Metrics consumer lagged behind event bus");
					},
					Err(broadcast::error::RecvError::Closed) => break,
				},
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Received shutdown signal");
					self.shutdown().await?;
					break;
				},
			}
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testutil::{service_with, spec, test_config, MockChainClient};
	use deployer_storage::implementations::memory::MemoryStorage;
	use deployer_types::{DeploymentStatus, GasSettings};
	use std::sync::atomic::Ordering;

	async fn engine_with(mock: Arc<MockChainClient>, chain_id: u64) -> DeployerEngine {
		let chain = service_with(chain_id, mock);
		let store = Arc::new(DeploymentStore::new(Box::new(MemoryStorage::new())));
		DeployerEngine::new(test_config(chain_id), store, chain).await
	}

	async fn wait_for_terminal(engine: &DeployerEngine, id: &str) -> DeploymentRecord {
		for _ in 0..500 {
			let record = engine.get_status(id).await.unwrap();
			if record.status.is_terminal() {
				return record;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		panic!("deployment {} never reached a terminal state", id);
	}

	#[tokio::test]
	async fn test_deployment_confirms_on_second_poll() {
		let mock = Arc::new(MockChainClient::with_receipt_after(2, true));
		let engine = engine_with(mock.clone(), 11155111).await;

		let submission = engine.submit_deployment(spec(11155111)).await.unwrap();
		submission.handle.wait().await.unwrap();

		let record = wait_for_terminal(&engine, &submission.deployment_id).await;
		assert_eq!(record.status, DeploymentStatus::Success);
		assert!(record.contract_address.is_some());
		assert!(record.transaction_hash.is_some());
		assert_eq!(record.gas_used, Some(21_000));
		assert_eq!(record.gas_estimate, Some(100_000));
		assert!(record.error.is_none());

		// Exactly two polls: one miss, one receipt.
		assert_eq!(mock.receipt_calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_reverted_transaction_marks_failed() {
		let mock = Arc::new(MockChainClient::with_receipt_after(1, false));
		let engine = engine_with(mock, 1).await;

		let submission = engine.submit_deployment(spec(1)).await.unwrap();
		submission.handle.wait().await.unwrap();

		let record = wait_for_terminal(&engine, &submission.deployment_id).await;
		assert_eq!(record.status, DeploymentStatus::Failed);
		assert_eq!(record.error.as_deref(), Some("transaction failed on chain"));
		assert!(record.contract_address.is_none());
	}

	#[tokio::test]
	async fn test_compile_failure_is_terminal_without_monitor() {
		let mock = Arc::new(MockChainClient::succeeding());
		let engine = engine_with(mock.clone(), 1).await;

		let mut bad = spec(1);
		bad.template_code = "contract broken {".into();
		let submission = engine.submit_deployment(bad).await.unwrap();
		let err = submission.handle.wait().await.unwrap_err();
		assert!(err.to_string().contains("Compile error"));

		let record = engine.get_status(&submission.deployment_id).await.unwrap();
		assert_eq!(record.status, DeploymentStatus::Failed);
		assert!(record.error.is_some());

		// No transaction, no confirmation polling.
		assert_eq!(mock.submit_calls.load(Ordering::SeqCst), 0);
		assert_eq!(mock.receipt_calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_transient_errors_retry_then_succeed() {
		let mock = Arc::new(MockChainClient::with_receipt_after(1, true).transient_failures(2));
		let engine = engine_with(mock.clone(), 1).await;

		let submission = engine.submit_deployment(spec(1)).await.unwrap();
		submission.handle.wait().await.unwrap();

		// Two transient failures plus the successful attempt.
		assert_eq!(mock.compile_calls.load(Ordering::SeqCst), 3);

		let record = wait_for_terminal(&engine, &submission.deployment_id).await;
		assert_eq!(record.status, DeploymentStatus::Success);
	}

	#[tokio::test]
	async fn test_retry_exhaustion_marks_record_failed() {
		let mock = Arc::new(MockChainClient::succeeding().transient_failures(u32::MAX));
		let engine = engine_with(mock, 1).await;

		let submission = engine.submit_deployment(spec(1)).await.unwrap();
		let err = submission.handle.wait().await.unwrap_err();
		assert!(err.to_string().contains("Network error"));

		let record = engine.get_status(&submission.deployment_id).await.unwrap();
		assert_eq!(record.status, DeploymentStatus::Failed);
		assert!(record.error.is_some());
	}

	#[tokio::test]
	async fn test_confirmation_timeout_leaves_record_processing() {
		let mock = Arc::new(MockChainClient::never_mined());
		let engine = engine_with(mock.clone(), 1).await;
		let mut events = engine.event_bus().subscribe();

		let submission = engine.submit_deployment(spec(1)).await.unwrap();
		submission.handle.wait().await.unwrap();

		// max_retries is 3 in the test config: polls run at counts 0..=3.
		let timed_out = loop {
			match tokio::time::timeout(Duration::from_secs(5), events.recv())
				.await
				.expect("expected a timeout event")
			{
				Ok(DeployerEvent::Confirmation(ConfirmationEvent::TimedOut { polls, .. })) => {
					break polls;
				},
				Ok(_) => continue,
				Err(e) => panic!("event bus closed: {}", e),
			}
		};
		assert_eq!(timed_out, 3);
		assert_eq!(mock.receipt_calls.load(Ordering::SeqCst), 4);

		let record = engine.get_status(&submission.deployment_id).await.unwrap();
		assert_eq!(record.status, DeploymentStatus::Processing);
		assert!(record.error.is_none());
	}

	#[tokio::test]
	async fn test_batch_tolerates_partial_failure() {
		let mock = Arc::new(MockChainClient::succeeding());
		let engine = engine_with(mock, 1).await;

		let mut second = spec(1);
		second.template_id = "broken-template".into();
		second.template_code = "contract broken {".into();

		let result = engine
			.submit_batch(vec![spec(1), second, spec(1)])
			.await;

		assert_eq!(result.successful.len(), 2);
		assert_eq!(result.failed.len(), 1);
		assert_eq!(result.failed[0].spec.template_id, "broken-template");
		assert!(result.failed[0].error.contains("Compile error"));

		// The surviving items really were submitted.
		for id in &result.successful {
			let record = engine.get_status(id).await.unwrap();
			assert!(record.transaction_hash.is_some());
		}
	}

	#[tokio::test]
	async fn test_unknown_chain_is_rejected_at_intake() {
		let mock = Arc::new(MockChainClient::succeeding());
		let engine = engine_with(mock, 1).await;

		let result = engine.submit_deployment(spec(424242)).await;
		assert!(matches!(result, Err(EngineError::UnsupportedChain(424242))));
	}

	#[tokio::test]
	async fn test_gas_overrides_reach_submission() {
		let mock = Arc::new(MockChainClient::with_receipt_after(1, true));
		let engine = engine_with(mock.clone(), 1).await;

		let mut custom = spec(1);
		custom.gas_settings = Some(GasSettings {
			gas_limit: Some(777_777),
			gas_price: Some(42),
			priority_fee: None,
		});
		let submission = engine.submit_deployment(custom).await.unwrap();
		submission.handle.wait().await.unwrap();

		assert_eq!(mock.last_gas_limit.load(Ordering::SeqCst), 777_777);
		assert_eq!(mock.last_gas_price.load(Ordering::SeqCst), 42);

		// Default path: estimate 100_000 + 20% and the chain's market price.
		let submission = engine.submit_deployment(spec(1)).await.unwrap();
		submission.handle.wait().await.unwrap();
		assert_eq!(mock.last_gas_limit.load(Ordering::SeqCst), 120_000);
		assert_eq!(mock.last_gas_price.load(Ordering::SeqCst), 1_000_000_000);
	}

	#[tokio::test]
	async fn test_finalized_events_feed_daily_metrics() {
		let mock = Arc::new(MockChainClient::with_receipt_after(1, true));
		let engine = engine_with(mock, 1).await;

		let runner = engine.clone();
		let run_task = tokio::spawn(async move { runner.run().await });
		// Let the run loop subscribe before any terminal event can fire.
		tokio::time::sleep(Duration::from_millis(20)).await;

		let submission = engine.submit_deployment(spec(1)).await.unwrap();
		submission.handle.wait().await.unwrap();
		wait_for_terminal(&engine, &submission.deployment_id).await;

		// The run loop consumes the Finalized event asynchronously.
		let mut metric = None;
		for _ in 0..500 {
			metric = engine.metrics().today(1).await.unwrap();
			if metric.is_some() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		let metric = metric.expect("metric row never appeared");
		assert_eq!(metric.total_deployments, 1);
		assert_eq!(metric.successful_deployments, 1);
		assert_eq!(metric.total_gas_used, 21_000);

		run_task.abort();
	}
}
