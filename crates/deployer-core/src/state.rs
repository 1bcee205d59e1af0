//! Deployment record state machine.
//!
//! Manages deployment state transitions with validation, ensuring records
//! move through the lifecycle `Pending -> Processing -> {Success, Failed}`
//! and never backward. Validation runs inside the store's compare-and-swap
//! closure, so a concurrent writer can never sneak a stale transition past
//! the check.

use deployer_storage::{DeploymentStore, StorageError};
use deployer_types::{DeploymentRecord, DeploymentStatus, TransactionHash, TransactionReceipt};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during deployment state management.
#[derive(Debug, Error)]
pub enum StateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Deployment not found: {0}")]
	NotFound(String),
	#[error("Invalid state transition: {0}")]
	Transition(String),
}

impl StateError {
	fn from_storage(id: &str, err: StorageError) -> Self {
		match err {
			StorageError::NotFound => StateError::NotFound(id.to_string()),
			StorageError::Rejected(msg) => StateError::Transition(msg),
			other => StateError::Storage(other.to_string()),
		}
	}
}

// Static transition table - each state maps to allowed next states
static TRANSITIONS: Lazy<HashMap<DeploymentStatus, HashSet<DeploymentStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		DeploymentStatus::Pending,
		HashSet::from([DeploymentStatus::Processing]),
	);
	m.insert(
		DeploymentStatus::Processing,
		HashSet::from([DeploymentStatus::Success, DeploymentStatus::Failed]),
	);
	m.insert(DeploymentStatus::Success, HashSet::new()); // terminal
	m.insert(DeploymentStatus::Failed, HashSet::new()); // terminal
	m
});

/// Manages deployment state transitions and persistence
pub struct DeploymentStateMachine {
	store: Arc<DeploymentStore>,
}

impl DeploymentStateMachine {
	pub fn new(store: Arc<DeploymentStore>) -> Self {
		Self { store }
	}

	/// Checks if a state transition is valid
	pub fn is_valid_transition(from: &DeploymentStatus, to: &DeploymentStatus) -> bool {
		TRANSITIONS.get(from).is_some_and(|set| set.contains(to))
	}

	/// Gets a deployment record by id
	pub async fn get(&self, id: &str) -> Result<DeploymentRecord, StateError> {
		self.store
			.get_deployment(id)
			.await
			.map_err(|e| StateError::from_storage(id, e))
	}

	/// Moves a record to `Processing`. Idempotent: a record already in
	/// `Processing` is returned unchanged, so a retried job can safely call
	/// this again.
	pub async fn mark_processing(&self, id: &str) -> Result<DeploymentRecord, StateError> {
		self.store
			.update_deployment(id, |record| {
				if record.status == DeploymentStatus::Processing {
					return Ok(());
				}
				Self::check_transition(record.status, DeploymentStatus::Processing)?;
				record.status = DeploymentStatus::Processing;
				Ok(())
			})
			.await
			.map_err(|e| StateError::from_storage(id, e))
	}

	/// Records the submitted transaction hash and gas estimate.
	///
	/// Only legal while the record is `Processing`; a terminal record is
	/// never written backward.
	pub async fn record_submission(
		&self,
		id: &str,
		tx_hash: TransactionHash,
		gas_estimate: u64,
	) -> Result<DeploymentRecord, StateError> {
		self.store
			.update_deployment(id, |record| {
				if record.status != DeploymentStatus::Processing {
					return Err(format!(
						"cannot record submission in status {:?}",
						record.status
					));
				}
				record.transaction_hash = Some(tx_hash.clone());
				record.gas_estimate = Some(gas_estimate);
				Ok(())
			})
			.await
			.map_err(|e| StateError::from_storage(id, e))
	}

	/// Moves a record to `Failed` with the failure description.
	pub async fn mark_failed(&self, id: &str, error: &str) -> Result<DeploymentRecord, StateError> {
		self.store
			.update_deployment(id, |record| {
				Self::check_transition(record.status, DeploymentStatus::Failed)?;
				record.status = DeploymentStatus::Failed;
				record.error = Some(error.to_string());
				Ok(())
			})
			.await
			.map_err(|e| StateError::from_storage(id, e))
	}

	/// Finalizes a record as `Success` from a confirmed receipt, setting the
	/// contract address, gas used, and block number in the same write.
	pub async fn mark_success(
		&self,
		id: &str,
		receipt: &TransactionReceipt,
	) -> Result<DeploymentRecord, StateError> {
		self.store
			.update_deployment(id, |record| {
				Self::check_transition(record.status, DeploymentStatus::Success)?;
				record.status = DeploymentStatus::Success;
				record.contract_address = receipt.contract_address.clone();
				record.gas_used = Some(receipt.gas_used);
				record.block_number = Some(receipt.block_number);
				Ok(())
			})
			.await
			.map_err(|e| StateError::from_storage(id, e))
	}

	/// Finalizes a record as `Failed` from a reverted receipt. The receipt's
	/// gas and block are still recorded; the contract address never is.
	pub async fn mark_reverted(
		&self,
		id: &str,
		receipt: &TransactionReceipt,
	) -> Result<DeploymentRecord, StateError> {
		self.store
			.update_deployment(id, |record| {
				Self::check_transition(record.status, DeploymentStatus::Failed)?;
				record.status = DeploymentStatus::Failed;
				record.error = Some("transaction failed on chain".to_string());
				record.gas_used = Some(receipt.gas_used);
				record.block_number = Some(receipt.block_number);
				Ok(())
			})
			.await
			.map_err(|e| StateError::from_storage(id, e))
	}

	fn check_transition(from: DeploymentStatus, to: DeploymentStatus) -> Result<(), String> {
		if Self::is_valid_transition(&from, &to) {
			Ok(())
		} else {
			Err(format!("cannot transition from {:?} to {:?}", from, to))
		}
	}
}
