//! Chain table configuration types.
//!
//! This module defines the configuration structures for the chains the
//! pipeline can deploy to, including RPC endpoints, the compiler sidecar
//! endpoint, and the scheduling priority assigned to each chain.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Default scheduling priority for chains absent from the table.
pub const DEFAULT_CHAIN_PRIORITY: u32 = 1;

/// Configuration for a single target chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
	/// HTTP(S) RPC endpoint for chain interaction.
	pub rpc_url: String,
	/// HTTP endpoint of the contract compiler sidecar.
	pub compiler_url: String,
	/// Human-readable chain name for logs.
	#[serde(default)]
	pub name: Option<String>,
	/// Scheduling priority; higher values are dispatched first.
	#[serde(default = "default_priority")]
	pub priority: u32,
}

fn default_priority() -> u32 {
	DEFAULT_CHAIN_PRIORITY
}

/// Chains configuration mapping chain IDs to their configurations.
///
/// This is a type alias for a HashMap that maps chain IDs (as u64) to
/// their corresponding chain configurations. The configuration supports
/// custom deserialization from TOML where chain IDs are provided as
/// string keys.
pub type ChainsConfig = HashMap<u64, ChainConfig>;

/// Helper function to deserialize chain configurations from TOML.
///
/// Chain IDs arrive as string keys in TOML (TOML doesn't support numeric
/// keys in tables) and are converted to u64 keys for internal use.
///
/// # Errors
///
/// Returns a deserialization error if a chain ID key cannot be parsed as a
/// u64 or the underlying chain configuration is invalid.
pub fn deserialize_chains<'de, D>(deserializer: D) -> Result<ChainsConfig, D::Error>
where
	D: Deserializer<'de>,
{
	let string_map: HashMap<String, ChainConfig> = HashMap::deserialize(deserializer)?;
	let mut result = HashMap::new();

	for (key, value) in string_map {
		let chain_id = key
			.parse::<u64>()
			.map_err(|e| serde::de::Error::custom(format!("Invalid chain_id '{}': {}", key, e)))?;
		result.insert(chain_id, value);
	}

	Ok(result)
}
