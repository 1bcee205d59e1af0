//! Deployment submission worker.
//!
//! Executes one deployment job to the point of on-chain submission: marks the
//! record processing, compiles the template, estimates gas, submits the
//! transaction, persists the hash, and hands the transaction to the
//! confirmation scheduler.

use crate::event_bus::EventBus;
use crate::queue::{JobContext, JobError, JobHandler};
use crate::state::{DeploymentStateMachine, StateError};
use crate::workers::confirmation::ConfirmationScheduler;
use async_trait::async_trait;
use deployer_chain::{deployment_gas_limit, ChainClientService, ChainError};
use deployer_types::{
	truncate_id, ConfirmationEvent, ConfirmationTask, DeployerEvent, DeploymentEvent, DeploymentJob,
};
use std::sync::Arc;
use tracing::instrument;

/// Handler executing deployment jobs from the submission queue.
pub struct DeploymentWorker {
	chain: Arc<ChainClientService>,
	state: Arc<DeploymentStateMachine>,
	confirmations: Arc<ConfirmationScheduler>,
	event_bus: EventBus,
	gas_margin_percent: u64,
	max_confirmation_retries: u32,
}

impl DeploymentWorker {
	pub fn new(
		chain: Arc<ChainClientService>,
		state: Arc<DeploymentStateMachine>,
		confirmations: Arc<ConfirmationScheduler>,
		event_bus: EventBus,
		gas_margin_percent: u64,
		max_confirmation_retries: u32,
	) -> Self {
		Self {
			chain,
			state,
			confirmations,
			event_bus,
			gas_margin_percent,
			max_confirmation_retries,
		}
	}

	/// Routes a chain error into the two retry policies.
	///
	/// Transient errors with attempts left become queue-level retries and
	/// leave the record in `Processing`. Everything else is terminal: the
	/// record is marked `Failed` here (including a transient error on the
	/// final attempt, so no record parks in `Processing` on infra failure)
	/// and the terminal event is emitted for metrics.
	async fn fail_or_retry(
		&self,
		job: &DeploymentJob,
		ctx: &JobContext,
		err: ChainError,
	) -> Result<(), JobError> {
		let message = err.to_string();

		if err.is_retryable() && !ctx.is_final_attempt() {
			return Err(JobError::Retryable(message));
		}

		match self.state.mark_failed(&job.deployment_id, &message).await {
			Ok(_) => {
				self.event_bus
					.publish(DeployerEvent::Deployment(DeploymentEvent::SubmissionFailed {
						deployment_id: job.deployment_id.clone(),
						chain_id: job.chain_id,
						error: message.clone(),
					}))
					.ok();
				self.event_bus
					.publish(DeployerEvent::Confirmation(ConfirmationEvent::Finalized {
						deployment_id: job.deployment_id.clone(),
						chain_id: job.chain_id,
						success: false,
						gas_used: None,
					}))
					.ok();
			},
			Err(state_err) => {
				tracing::error!(
					deployment_id = %truncate_id(&job.deployment_id),
					error = %state_err,
					"Failed to mark deployment failed"
				);
			},
		}

		if err.is_retryable() {
			Err(JobError::Retryable(message))
		} else {
			Err(JobError::Fatal(message))
		}
	}
}

#[async_trait]
impl JobHandler<DeploymentJob> for DeploymentWorker {
	#[instrument(skip_all, fields(
		deployment_id = %truncate_id(&job.deployment_id),
		chain_id = job.chain_id,
		attempt = ctx.attempt
	))]
	async fn handle(&self, job: &DeploymentJob, ctx: &JobContext) -> Result<(), JobError> {
		// Idempotent: a retried job finds the record already in Processing.
		match self.state.mark_processing(&job.deployment_id).await {
			Ok(_) => {},
			Err(StateError::Transition(reason)) => {
				// Already finalized; a duplicate or stale job has nothing to do.
				return Err(JobError::Fatal(reason));
			},
			Err(StateError::NotFound(id)) => {
				return Err(JobError::Fatal(format!("deployment {} not found", id)));
			},
			Err(StateError::Storage(reason)) => {
				return Err(JobError::Retryable(reason));
			},
		}

		let artifact = match self
			.chain
			.compile(job.chain_id, &job.template_code, &job.parameters)
			.await
		{
			Ok(artifact) => artifact,
			Err(e) => return self.fail_or_retry(job, ctx, e).await,
		};

		let estimate = match self
			.chain
			.estimate_deployment_gas(job.chain_id, &artifact)
			.await
		{
			Ok(estimate) => estimate,
			Err(e) => return self.fail_or_retry(job, ctx, e).await,
		};

		let gas_limit =
			deployment_gas_limit(estimate, job.gas_settings.as_ref(), self.gas_margin_percent);

		// Caller override wins; otherwise submit at the chain's market price.
		let gas_price = match job.gas_settings.as_ref().and_then(|s| s.gas_price) {
			Some(price) => price,
			None => match self.chain.get_gas_price(job.chain_id).await {
				Ok(price) => price,
				Err(e) => return self.fail_or_retry(job, ctx, e).await,
			},
		};
		let priority_fee = job.gas_settings.as_ref().and_then(|s| s.priority_fee);

		let tx_hash = match self
			.chain
			.submit_deployment(job.chain_id, &artifact, gas_limit, Some(gas_price), priority_fee)
			.await
		{
			Ok(hash) => hash,
			Err(e) => return self.fail_or_retry(job, ctx, e).await,
		};

		// The transaction is on the wire; from here on nothing may fail the
		// job, or a retry would submit it a second time.
		if let Err(e) = self
			.state
			.record_submission(&job.deployment_id, tx_hash.clone(), estimate)
			.await
		{
			tracing::error!(
				deployment_id = %truncate_id(&job.deployment_id),
				error = %e,
				"Failed to persist submission details; monitor will still finalize"
			);
		}

		self.confirmations.schedule(ConfirmationTask::new(
			job.deployment_id.clone(),
			job.chain_id,
			tx_hash.clone(),
			self.max_confirmation_retries,
		));

		tracing::info!(
			tx_hash = %tx_hash,
			gas_limit,
			gas_estimate = estimate,
			"Deployment transaction submitted"
		);
		self.event_bus
			.publish(DeployerEvent::Deployment(DeploymentEvent::Submitted {
				deployment_id: job.deployment_id.clone(),
				chain_id: job.chain_id,
				tx_hash,
			}))
			.ok();

		Ok(())
	}
}
