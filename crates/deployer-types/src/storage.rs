//! Storage-related types for the deployment pipeline.

/// Storage keys for different data collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Key for storing deployment records
	Deployments,
	/// Key for storing per-chain daily metric rows
	Metrics,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Deployments => "deployments",
			StorageKey::Metrics => "metrics",
		}
	}
}
