//! Deployment types for the pipeline.
//!
//! This module defines the durable deployment record, its status lifecycle,
//! and the queue payloads (deployment jobs and confirmation tasks) that move
//! a deployment from intake through on-chain confirmation.

use crate::TransactionHash;
use serde::{Deserialize, Serialize};

/// Default number of receipt polls before a confirmation task times out.
pub const DEFAULT_MAX_CONFIRMATION_RETRIES: u32 = 20;

/// Status of a deployment in the pipeline.
///
/// Transitions are strictly ordered: `Pending -> Processing -> {Success, Failed}`.
/// `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeploymentStatus {
	/// Created by intake, not yet picked up by a worker.
	Pending,
	/// A worker has started compile/estimate/submit for this deployment.
	Processing,
	/// The deployment transaction was mined and executed successfully.
	Success,
	/// Compilation, submission, or on-chain execution failed.
	Failed,
}

impl DeploymentStatus {
	/// Returns true when no further transitions can occur.
	pub fn is_terminal(&self) -> bool {
		matches!(self, DeploymentStatus::Success | DeploymentStatus::Failed)
	}
}

/// Caller-supplied gas overrides for a deployment transaction.
///
/// Any field left unset falls back to the pipeline's computed value: the
/// estimate plus safety margin for the limit, the chain client's market
/// value for price and priority fee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSettings {
	/// Gas limit override.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub gas_limit: Option<u64>,
	/// Gas price override in wei.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub gas_price: Option<u128>,
	/// Optional priority fee for EIP-1559 transactions.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub priority_fee: Option<u128>,
}

/// A caller's request to deploy a contract template to one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSpec {
	/// Identifier of the requesting user.
	pub user_id: String,
	/// Target chain id.
	pub chain_id: u64,
	/// Identifier of the contract template being deployed.
	pub template_id: String,
	/// Source code of the template, handed to the chain client's compiler.
	pub template_code: String,
	/// Opaque constructor-argument payload.
	pub parameters: serde_json::Value,
	/// Optional gas overrides.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub gas_settings: Option<GasSettings>,
}

/// Durable record tracking one deployment request from intake to finality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
	/// Unique identifier, created at request time.
	pub id: String,
	/// Identifier of the requesting user.
	pub user_id: String,
	/// Target chain id.
	pub chain_id: u64,
	/// Identifier of the contract template being deployed.
	pub template_id: String,
	/// Current status.
	pub status: DeploymentStatus,
	/// Opaque constructor-argument payload.
	pub parameters: serde_json::Value,
	/// Caller-supplied gas overrides, if any.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub gas_settings: Option<GasSettings>,
	/// Hash of the deployment transaction, set once submitted.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub transaction_hash: Option<TransactionHash>,
	/// Address of the deployed contract. Only ever set on `Success` records.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub contract_address: Option<String>,
	/// Gas estimate captured at submission time.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub gas_estimate: Option<u64>,
	/// Gas consumed, set once a receipt is available.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub gas_used: Option<u64>,
	/// Block the transaction was mined in.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub block_number: Option<u64>,
	/// Failure description. Non-empty exactly when `status` is `Failed`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Timestamp when this record was created (Unix seconds).
	pub created_at: u64,
	/// Timestamp when this record was last updated (Unix seconds).
	pub updated_at: u64,
}

impl DeploymentRecord {
	/// Creates a fresh `Pending` record from a spec.
	pub fn from_spec(id: String, spec: &DeploymentSpec, now: u64) -> Self {
		Self {
			id,
			user_id: spec.user_id.clone(),
			chain_id: spec.chain_id,
			template_id: spec.template_id.clone(),
			status: DeploymentStatus::Pending,
			parameters: spec.parameters.clone(),
			gas_settings: spec.gas_settings.clone(),
			transaction_hash: None,
			contract_address: None,
			gas_estimate: None,
			gas_used: None,
			block_number: None,
			error: None,
			created_at: now,
			updated_at: now,
		}
	}
}

/// Queue payload for the deployment submission pool.
///
/// Carries everything a worker needs to drive compile -> estimate -> submit
/// without re-reading the durable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentJob {
	/// Id of the deployment record this job executes.
	pub deployment_id: String,
	/// Identifier of the requesting user.
	pub user_id: String,
	/// Target chain id.
	pub chain_id: u64,
	/// Source code of the template.
	pub template_code: String,
	/// Opaque constructor-argument payload.
	pub parameters: serde_json::Value,
	/// Optional gas overrides.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub gas_settings: Option<GasSettings>,
}

/// Ephemeral scheduling unit for the confirmation polling pool.
///
/// At most one live task exists per `transaction_hash`; the hash is the
/// deduplication key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationTask {
	/// Id of the deployment record being confirmed.
	pub deployment_id: String,
	/// Chain the transaction was submitted to.
	pub chain_id: u64,
	/// Hash of the submitted transaction.
	pub transaction_hash: TransactionHash,
	/// Polls performed so far.
	pub retry_count: u32,
	/// Poll budget before the task times out.
	pub max_retries: u32,
}

impl ConfirmationTask {
	/// Creates the initial task for a freshly submitted transaction.
	pub fn new(
		deployment_id: String,
		chain_id: u64,
		transaction_hash: TransactionHash,
		max_retries: u32,
	) -> Self {
		Self {
			deployment_id,
			chain_id,
			transaction_hash,
			retry_count: 0,
			max_retries,
		}
	}
}
