//! Chain execution module for the contract deployment pipeline.
//!
//! This module handles everything the pipeline asks of a target chain:
//! compiling a contract template, estimating deployment gas, submitting the
//! deployment transaction, and fetching receipts. It provides abstractions
//! for different chain backends and routes operations to the client
//! configured for each chain id.

use async_trait::async_trait;
use deployer_types::{CompiledContract, GasSettings, TransactionHash, TransactionReceipt};
use std::collections::HashMap;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

/// Errors that can occur during chain execution operations.
///
/// The variants follow the pipeline's failure taxonomy: `Network` errors are
/// transient and safe to retry, while compile/estimation/submission errors
/// are definitive rejections of the deployment itself.
#[derive(Debug, Error)]
pub enum ChainError {
	/// The template failed to compile.
	#[error("Compile error: {0}")]
	Compile(String),
	/// Gas estimation was rejected for the compiled contract.
	#[error("Estimation error: {0}")]
	Estimation(String),
	/// The deployment transaction was rejected at submission.
	#[error("Submission error: {0}")]
	Submission(String),
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// No client is configured for the requested chain.
	#[error("No client available for chain {0}")]
	NoClientAvailable(u64),
}

impl ChainError {
	/// Whether a retry could plausibly succeed.
	///
	/// Only transport-level failures qualify; a compile error or an on-chain
	/// rejection will not change on a second attempt.
	pub fn is_retryable(&self) -> bool {
		matches!(self, ChainError::Network(_))
	}
}

/// Trait defining the interface for per-chain execution clients.
///
/// This trait must be implemented by any chain backend that wants to
/// integrate with the pipeline. One client instance serves one chain id.
#[async_trait]
pub trait ChainClient: Send + Sync {
	/// Compiles a contract template and its constructor parameters into a
	/// deployable artifact (bytecode, ABI, encoded constructor arguments).
	async fn compile(
		&self,
		template_code: &str,
		parameters: &serde_json::Value,
	) -> Result<CompiledContract, ChainError>;

	/// Estimates the gas needed to deploy the compiled artifact.
	async fn estimate_deployment_gas(
		&self,
		artifact: &CompiledContract,
	) -> Result<u64, ChainError>;

	/// Submits the deployment transaction and returns its hash.
	///
	/// `gas_price` and `priority_fee` default to the chain's market values
	/// when `None`.
	async fn submit_deployment(
		&self,
		artifact: &CompiledContract,
		gas_limit: u64,
		gas_price: Option<u128>,
		priority_fee: Option<u128>,
	) -> Result<TransactionHash, ChainError>;

	/// Retrieves the receipt for a transaction.
	///
	/// Returns `Ok(None)` while the transaction is not yet mined; absence is
	/// not an error.
	async fn get_receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, ChainError>;

	/// Gets the current market gas price for the chain in wei.
	async fn get_gas_price(&self) -> Result<u128, ChainError>;
}

/// Computes the gas limit for a deployment from the caller's settings.
///
/// The caller's explicit limit wins; otherwise the estimate is inflated by
/// `margin_percent` to absorb estimation drift between estimate and
/// inclusion.
pub fn deployment_gas_limit(
	estimate: u64,
	settings: Option<&GasSettings>,
	margin_percent: u64,
) -> u64 {
	if let Some(limit) = settings.and_then(|s| s.gas_limit) {
		return limit;
	}
	estimate.saturating_add(estimate.saturating_mul(margin_percent) / 100)
}

/// Service that routes chain execution operations to per-chain clients.
///
/// The ChainClientService holds one client per configured chain id and
/// exposes the same operations keyed by chain id, failing with
/// `NoClientAvailable` for unknown chains.
pub struct ChainClientService {
	/// Map of chain IDs to their corresponding execution clients.
	clients: HashMap<u64, Box<dyn ChainClient>>,
}

impl ChainClientService {
	/// Creates a new ChainClientService with the specified clients.
	pub fn new(clients: HashMap<u64, Box<dyn ChainClient>>) -> Self {
		Self { clients }
	}

	fn client(&self, chain_id: u64) -> Result<&dyn ChainClient, ChainError> {
		self.clients
			.get(&chain_id)
			.map(|c| c.as_ref())
			.ok_or(ChainError::NoClientAvailable(chain_id))
	}

	/// Whether a client is configured for the given chain.
	pub fn supports_chain(&self, chain_id: u64) -> bool {
		self.clients.contains_key(&chain_id)
	}

	/// Compiles a template for the given chain.
	pub async fn compile(
		&self,
		chain_id: u64,
		template_code: &str,
		parameters: &serde_json::Value,
	) -> Result<CompiledContract, ChainError> {
		self.client(chain_id)?.compile(template_code, parameters).await
	}

	/// Estimates deployment gas on the given chain.
	pub async fn estimate_deployment_gas(
		&self,
		chain_id: u64,
		artifact: &CompiledContract,
	) -> Result<u64, ChainError> {
		self.client(chain_id)?.estimate_deployment_gas(artifact).await
	}

	/// Submits a deployment transaction to the given chain.
	pub async fn submit_deployment(
		&self,
		chain_id: u64,
		artifact: &CompiledContract,
		gas_limit: u64,
		gas_price: Option<u128>,
		priority_fee: Option<u128>,
	) -> Result<TransactionHash, ChainError> {
		self.client(chain_id)?
			.submit_deployment(artifact, gas_limit, gas_price, priority_fee)
			.await
	}

	/// Fetches a receipt from the given chain, `None` while unmined.
	pub async fn get_receipt(
		&self,
		chain_id: u64,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, ChainError> {
		self.client(chain_id)?.get_receipt(hash).await
	}

	/// Gets the current market gas price on the given chain.
	pub async fn get_gas_price(&self, chain_id: u64) -> Result<u128, ChainError> {
		self.client(chain_id)?.get_gas_price().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_gas_limit_uses_caller_override() {
		let settings = GasSettings {
			gas_limit: Some(1_000_000),
			..Default::default()
		};
		assert_eq!(deployment_gas_limit(500_000, Some(&settings), 20), 1_000_000);
	}

	#[test]
	fn test_gas_limit_inflates_estimate() {
		assert_eq!(deployment_gas_limit(100_000, None, 20), 120_000);
		assert_eq!(deployment_gas_limit(100_000, Some(&GasSettings::default()), 20), 120_000);
		// Zero margin passes the estimate through.
		assert_eq!(deployment_gas_limit(100_000, None, 0), 100_000);
	}

	#[test]
	fn test_retryability_classification() {
		assert!(ChainError::Network("timeout".into()).is_retryable());
		assert!(!ChainError::Compile("syntax".into()).is_retryable());
		assert!(!ChainError::Estimation("would revert".into()).is_retryable());
		assert!(!ChainError::Submission("nonce too low".into()).is_retryable());
	}
}
