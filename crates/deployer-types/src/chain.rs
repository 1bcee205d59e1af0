//! Chain-execution types for the deployment pipeline.
//!
//! This module defines types related to on-chain transaction submission
//! and monitoring, including transaction hashes, receipts, and the compiled
//! contract artifacts produced before submission.

use serde::{Deserialize, Serialize};

/// Blockchain transaction hash representation.
///
/// Stores transaction hashes as raw bytes to support different blockchain formats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub Vec<u8>);

impl TransactionHash {
	/// Returns the hash as a lowercase hex string without a `0x` prefix.
	pub fn to_hex(&self) -> String {
		hex::encode(&self.0)
	}
}

impl std::fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "0x{}", self.to_hex())
	}
}

/// Transaction receipt containing execution details.
///
/// Provides information about a deployment transaction after it has been
/// included in a block. `contract_address` is only present for successful
/// contract-creation transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	/// The hash of the transaction.
	pub hash: TransactionHash,
	/// The block number where the transaction was included.
	pub block_number: u64,
	/// Gas consumed by the transaction.
	pub gas_used: u64,
	/// Whether the transaction executed successfully.
	pub success: bool,
	/// Address of the created contract, when the transaction deployed one.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub contract_address: Option<String>,
}

/// Compiled contract artifact ready for on-chain submission.
///
/// Produced by the chain client's compile step from a template and its
/// constructor parameters. The constructor arguments are kept as the raw
/// ABI-encoded bytes the compiler produced so that estimation and submission
/// use exactly the same payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledContract {
	/// Contract creation bytecode.
	pub bytecode: Vec<u8>,
	/// Contract ABI as emitted by the compiler.
	pub abi: serde_json::Value,
	/// ABI-encoded constructor arguments, appended to the bytecode on submit.
	pub constructor_args: Vec<u8>,
}
