//! Chain priority resolution.
//!
//! Maps a chain id to its scheduling priority from the configured chain
//! table. Chains absent from the table resolve to the default low priority,
//! so unknown chains are still deployable, just never ahead of the chains the
//! operator cares about.

use deployer_types::{ChainsConfig, DEFAULT_CHAIN_PRIORITY};
use std::collections::HashMap;

/// Pure lookup from chain id to scheduling priority.
///
/// Higher values are dispatched first; the submission queue pops the maximum
/// priority, so a mainnet-class chain with priority 10 always runs ahead of a
/// default-priority chain when both are queued.
#[derive(Debug, Clone)]
pub struct PriorityResolver {
	table: HashMap<u64, u32>,
}

impl PriorityResolver {
	/// Creates a resolver from an explicit priority table.
	pub fn new(table: HashMap<u64, u32>) -> Self {
		Self { table }
	}

	/// Builds the table from the configured chains.
	pub fn from_chains(chains: &ChainsConfig) -> Self {
		let table = chains
			.iter()
			.map(|(chain_id, chain)| (*chain_id, chain.priority))
			.collect();
		Self { table }
	}

	/// Resolves the priority for a chain, defaulting for unknown chains.
	pub fn resolve(&self, chain_id: u64) -> u32 {
		self.table
			.get(&chain_id)
			.copied()
			.unwrap_or(DEFAULT_CHAIN_PRIORITY)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_resolves_from_table_with_default() {
		let resolver = PriorityResolver::new(HashMap::from([(1, 10), (137, 5)]));
		assert_eq!(resolver.resolve(1), 10);
		assert_eq!(resolver.resolve(137), 5);
		assert_eq!(resolver.resolve(99999), DEFAULT_CHAIN_PRIORITY);
	}

	#[test]
	fn test_builds_from_chain_config() {
		let mut chains = ChainsConfig::new();
		chains.insert(
			11155111,
			deployer_types::ChainConfig {
				rpc_url: "http://localhost:8545".into(),
				compiler_url: "http://localhost:9000".into(),
				name: Some("sepolia".into()),
				priority: 10,
			},
		);
		let resolver = PriorityResolver::from_chains(&chains);
		assert_eq!(resolver.resolve(11155111), 10);
		assert_eq!(resolver.resolve(1), DEFAULT_CHAIN_PRIORITY);
	}
}
