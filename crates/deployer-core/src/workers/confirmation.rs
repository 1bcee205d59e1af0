//! Confirmation polling for submitted deployment transactions.
//!
//! Each submitted transaction gets a confirmation task that polls the chain
//! for a receipt on a fixed interval, up to a bounded poll budget. The
//! transaction hash is the deduplication key: at most one live task exists
//! per hash, so a deployment can never be finalized twice.

use crate::event_bus::EventBus;
use crate::queue::{JobContext, JobError, JobHandler, JobQueue};
use crate::state::{DeploymentStateMachine, StateError};
use async_trait::async_trait;
use dashmap::DashMap;
use deployer_chain::ChainClientService;
use deployer_types::{
	truncate_id, ConfirmationEvent, ConfirmationTask, DeployerEvent, TransactionHash,
	TransactionReceipt,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// All confirmation tasks share one priority class; polling is FIFO.
const POLL_PRIORITY: u32 = 1;

/// Schedules confirmation tasks onto the polling queue with deduplication.
///
/// `schedule` is the at-least-once entry point used after submission: it is
/// safe to call repeatedly for the same transaction because the live-set
/// keyed by transaction hash admits only the first caller. `requeue` is the
/// monitor's own re-poll path and intentionally bypasses the dedup check,
/// since the task being requeued is the live one.
pub struct ConfirmationScheduler {
	queue: JobQueue<ConfirmationTask>,
	live: DashMap<TransactionHash, ()>,
	initial_delay: Duration,
	poll_interval: Duration,
}

impl ConfirmationScheduler {
	pub fn new(
		queue: JobQueue<ConfirmationTask>,
		initial_delay: Duration,
		poll_interval: Duration,
	) -> Self {
		Self {
			queue,
			live: DashMap::new(),
			initial_delay,
			poll_interval,
		}
	}

	/// Schedules the first poll for a submitted transaction.
	///
	/// The initial delay gives the transaction time to become visible before
	/// the first receipt query. Returns false when a live task already covers
	/// this hash.
	pub fn schedule(&self, task: ConfirmationTask) -> bool {
		if self
			.live
			.insert(task.transaction_hash.clone(), ())
			.is_some()
		{
			tracing::debug!(
				tx_hash = %task.transaction_hash,
				"Confirmation already scheduled for transaction"
			);
			return false;
		}
		self.queue
			.push_after(task, POLL_PRIORITY, self.initial_delay);
		true
	}

	/// Re-enqueues the same logical task for its next poll.
	fn requeue(&self, task: ConfirmationTask) {
		self.queue
			.push_after(task, POLL_PRIORITY, self.poll_interval);
	}

	/// Releases the dedup slot once a task reaches its end.
	fn release(&self, tx_hash: &TransactionHash) {
		self.live.remove(tx_hash);
	}

	/// Number of transactions currently being monitored.
	pub fn live_count(&self) -> usize {
		self.live.len()
	}
}

/// Handler executing one poll of a confirmation task.
///
/// State machine per invocation: a receipt finalizes the deployment
/// (`Success` on a successful execution, `Failed` on a revert) and emits the
/// terminal metrics event; no receipt either requeues the task with the
/// fixed poll delay or, once the budget is spent, times the task out leaving
/// the record untouched.
pub struct ConfirmationWorker {
	chain: Arc<ChainClientService>,
	state: Arc<DeploymentStateMachine>,
	scheduler: Arc<ConfirmationScheduler>,
	event_bus: EventBus,
}

impl ConfirmationWorker {
	pub fn new(
		chain: Arc<ChainClientService>,
		state: Arc<DeploymentStateMachine>,
		scheduler: Arc<ConfirmationScheduler>,
		event_bus: EventBus,
	) -> Self {
		Self {
			chain,
			state,
			scheduler,
			event_bus,
		}
	}

	/// Writes the terminal state from a receipt and emits the metrics event.
	///
	/// The state machine rejects a second terminal write, which is how a
	/// racing duplicate task degrades to a no-op instead of double-counting.
	async fn finalize(
		&self,
		task: &ConfirmationTask,
		receipt: TransactionReceipt,
	) -> Result<(), JobError> {
		let result = if receipt.success {
			self.state.mark_success(&task.deployment_id, &receipt).await
		} else {
			self.state.mark_reverted(&task.deployment_id, &receipt).await
		};

		match result {
			Ok(record) => {
				tracing::info!(
					deployment_id = %truncate_id(&task.deployment_id),
					status = ?record.status,
					block_number = receipt.block_number,
					"Deployment finalized"
				);
				self.scheduler.release(&task.transaction_hash);
				self.event_bus
					.publish(DeployerEvent::Confirmation(ConfirmationEvent::Finalized {
						deployment_id: task.deployment_id.clone(),
						chain_id: task.chain_id,
						success: receipt.success,
						gas_used: Some(receipt.gas_used),
					}))
					.ok();
				Ok(())
			},
			Err(StateError::Transition(reason)) => {
				// Another task already finalized this deployment.
				tracing::debug!(
					deployment_id = %truncate_id(&task.deployment_id),
					"Skipping duplicate finalization: {}",
					reason
				);
				self.scheduler.release(&task.transaction_hash);
				Ok(())
			},
			Err(StateError::NotFound(id)) => {
				tracing::error!(deployment_id = %truncate_id(&id), "Deployment record vanished");
				self.scheduler.release(&task.transaction_hash);
				Ok(())
			},
			Err(StateError::Storage(reason)) => {
				// Keep the dedup slot: the queue retries this poll and the
				// receipt fetch is idempotent.
				Err(JobError::Retryable(reason))
			},
		}
	}
}

#[async_trait]
impl JobHandler<ConfirmationTask> for ConfirmationWorker {
	#[instrument(skip_all, fields(
		deployment_id = %truncate_id(&task.deployment_id),
		tx_hash = %task.transaction_hash,
		poll = task.retry_count
	))]
	async fn handle(&self, task: &ConfirmationTask, _ctx: &JobContext) -> Result<(), JobError> {
		let receipt = match self
			.chain
			.get_receipt(task.chain_id, &task.transaction_hash)
			.await
		{
			Ok(receipt) => receipt,
			Err(e) => {
				// A flaky RPC counts like an unmined transaction; the poll
				// budget stays the single timeout mechanism.
				tracing::warn!(error = %e, "Receipt query failed, treating as not yet mined");
				None
			},
		};

		match receipt {
			Some(receipt) => self.finalize(task, receipt).await,
			None if task.retry_count >= task.max_retries => {
				self.scheduler.release(&task.transaction_hash);
				tracing::error!(
					polls = task.retry_count,
					"Confirmation timed out; deployment record left as-is"
				);
				self.event_bus
					.publish(DeployerEvent::Confirmation(ConfirmationEvent::TimedOut {
						deployment_id: task.deployment_id.clone(),
						chain_id: task.chain_id,
						tx_hash: task.transaction_hash.clone(),
						polls: task.retry_count,
					}))
					.ok();
				Err(JobError::Fatal(format!(
					"no receipt for {} after {} polls",
					task.transaction_hash, task.retry_count
				)))
			},
			None => {
				let mut next = task.clone();
				next.retry_count += 1;
				self.scheduler.requeue(next);
				Ok(())
			},
		}
	}
}
