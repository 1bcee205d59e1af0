//! Storage module for the contract deployment pipeline.
//!
//! This module provides abstractions for persistent storage of deployment
//! records and per-chain daily metrics, supporting different backend
//! implementations such as in-memory or file-based storage. All mutations go
//! through compare-and-swap so that concurrent writers cannot lose updates.

use async_trait::async_trait;
use deployer_types::{ChainDailyMetric, DeploymentRecord, MetricDeltas, StorageKey};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs when creating an item that already exists.
	#[error("Already exists")]
	AlreadyExists,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs when an update closure refuses the current value.
	#[error("Update rejected: {0}")]
	Rejected(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// This trait must be implemented by any storage backend that wants to
/// integrate with the pipeline. It provides basic key-value operations plus
/// an atomic compare-and-swap, which the typed layer builds its optimistic
/// concurrency on.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key, or `None` when absent.
	async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

	/// Stores raw bytes unconditionally.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Atomically replaces the value for `key` only when the current value
	/// equals `expected` (`None` meaning the key must be absent). Returns
	/// `false` without writing when the comparison fails.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		new: Vec<u8>,
	) -> Result<bool, StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// Typed store for deployment records and daily metrics.
///
/// The DeploymentStore wraps a low-level storage backend and provides the
/// pipeline's durable operations: record creation, optimistic record updates,
/// and the atomic daily-metric upsert. Records are serialized to JSON.
pub struct DeploymentStore {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl DeploymentStore {
	/// Creates a new DeploymentStore with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn record_key(id: &str) -> String {
		format!("{}:{}", StorageKey::Deployments.as_str(), id)
	}

	fn metric_key(chain_id: u64, date: &str) -> String {
		format!("{}:{}:{}", StorageKey::Metrics.as_str(), chain_id, date)
	}

	fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
		serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
		serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Persists a freshly created deployment record.
	///
	/// Fails with `AlreadyExists` if a record with the same id is present;
	/// intake ids are unique, so a collision indicates a caller bug.
	pub async fn create_deployment(&self, record: &DeploymentRecord) -> Result<(), StorageError> {
		let bytes = Self::encode(record)?;
		let inserted = self
			.backend
			.compare_and_swap(&Self::record_key(&record.id), None, bytes)
			.await?;
		if inserted {
			Ok(())
		} else {
			Err(StorageError::AlreadyExists)
		}
	}

	/// Retrieves a deployment record by id.
	pub async fn get_deployment(&self, id: &str) -> Result<DeploymentRecord, StorageError> {
		let bytes = self
			.backend
			.get_bytes(&Self::record_key(id))
			.await?
			.ok_or(StorageError::NotFound)?;
		Self::decode(&bytes)
	}

	/// Applies `updater` to the record under optimistic concurrency.
	///
	/// The closure runs against the latest stored value and the write only
	/// lands if no concurrent writer got there first; on a lost race the
	/// closure is re-applied to the fresh value. The closure may refuse the
	/// update by returning an error string, which surfaces as
	/// `StorageError::Rejected` without writing anything.
	pub async fn update_deployment<F>(
		&self,
		id: &str,
		updater: F,
	) -> Result<DeploymentRecord, StorageError>
	where
		F: Fn(&mut DeploymentRecord) -> Result<(), String>,
	{
		let key = Self::record_key(id);
		loop {
			let current_bytes = self
				.backend
				.get_bytes(&key)
				.await?
				.ok_or(StorageError::NotFound)?;
			let mut record: DeploymentRecord = Self::decode(&current_bytes)?;

			updater(&mut record).map_err(StorageError::Rejected)?;
			record.updated_at = deployer_types::current_timestamp();

			let new_bytes = Self::encode(&record)?;
			if self
				.backend
				.compare_and_swap(&key, Some(&current_bytes), new_bytes)
				.await?
			{
				return Ok(record);
			}
			// Lost the race; re-read and re-apply.
		}
	}

	/// Atomically increments the daily metric row for `(chain_id, date)`,
	/// creating it on first touch.
	///
	/// Safe under concurrent terminal events for the same chain and day:
	/// a lost compare-and-swap re-reads the row and re-applies the deltas,
	/// so no increment is ever dropped.
	pub async fn upsert_increment_daily_metric(
		&self,
		chain_id: u64,
		date: &str,
		deltas: MetricDeltas,
	) -> Result<ChainDailyMetric, StorageError> {
		let key = Self::metric_key(chain_id, date);
		loop {
			let current_bytes = self.backend.get_bytes(&key).await?;
			let mut metric = match &current_bytes {
				Some(bytes) => Self::decode::<ChainDailyMetric>(bytes)?,
				None => ChainDailyMetric::zero(chain_id, date.to_string()),
			};
			metric.apply(&deltas);

			let new_bytes = Self::encode(&metric)?;
			if self
				.backend
				.compare_and_swap(&key, current_bytes.as_deref(), new_bytes)
				.await?
			{
				return Ok(metric);
			}
		}
	}

	/// Retrieves the daily metric row for `(chain_id, date)`, if any.
	pub async fn get_daily_metric(
		&self,
		chain_id: u64,
		date: &str,
	) -> Result<Option<ChainDailyMetric>, StorageError> {
		match self.backend.get_bytes(&Self::metric_key(chain_id, date)).await? {
			Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
			None => Ok(None),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use deployer_types::{DeploymentSpec, DeploymentStatus};
	use std::sync::Arc;

	fn spec(chain_id: u64) -> DeploymentSpec {
		DeploymentSpec {
			user_id: "user-1".into(),
			chain_id,
			template_id: "erc20".into(),
			template_code: "contract Token {}".into(),
			parameters: serde_json::json!({"name": "Token"}),
			gas_settings: None,
		}
	}

	fn store() -> DeploymentStore {
		DeploymentStore::new(Box::new(implementations::memory::MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_create_and_get() {
		let store = store();
		let record = DeploymentRecord::from_spec("dep-1".into(), &spec(1), 100);

		store.create_deployment(&record).await.unwrap();
		let loaded = store.get_deployment("dep-1").await.unwrap();
		assert_eq!(loaded.id, "dep-1");
		assert_eq!(loaded.status, DeploymentStatus::Pending);

		// Duplicate creation must be refused.
		let result = store.create_deployment(&record).await;
		assert!(matches!(result, Err(StorageError::AlreadyExists)));
	}

	#[tokio::test]
	async fn test_update_applies_and_bumps_timestamp() {
		let store = store();
		let record = DeploymentRecord::from_spec("dep-2".into(), &spec(1), 0);
		store.create_deployment(&record).await.unwrap();

		let updated = store
			.update_deployment("dep-2", |r| {
				r.status = DeploymentStatus::Processing;
				Ok(())
			})
			.await
			.unwrap();
		assert_eq!(updated.status, DeploymentStatus::Processing);
		assert!(updated.updated_at >= record.updated_at);
	}

	#[tokio::test]
	async fn test_update_rejected_leaves_record_untouched() {
		let store = store();
		let record = DeploymentRecord::from_spec("dep-3".into(), &spec(1), 0);
		store.create_deployment(&record).await.unwrap();

		let result = store
			.update_deployment("dep-3", |_| Err("not allowed".to_string()))
			.await;
		assert!(matches!(result, Err(StorageError::Rejected(_))));

		let loaded = store.get_deployment("dep-3").await.unwrap();
		assert_eq!(loaded.status, DeploymentStatus::Pending);
	}

	#[tokio::test]
	async fn test_metric_upsert_counts_every_concurrent_increment() {
		let store = Arc::new(store());

		let mut handles = Vec::new();
		for _ in 0..100 {
			let store = store.clone();
			handles.push(tokio::spawn(async move {
				store
					.upsert_increment_daily_metric(
						10,
						"2024-05-01",
						MetricDeltas::for_terminal(true, Some(21000)),
					)
					.await
					.unwrap();
			}));
		}
		for handle in handles {
			handle.await.unwrap();
		}

		let metric = store.get_daily_metric(10, "2024-05-01").await.unwrap().unwrap();
		assert_eq!(metric.total_deployments, 100);
		assert_eq!(metric.successful_deployments, 100);
		assert_eq!(metric.total_gas_used, 100 * 21000);
	}

	#[tokio::test]
	async fn test_metric_rows_are_keyed_per_chain_and_day() {
		let store = store();
		store
			.upsert_increment_daily_metric(1, "2024-05-01", MetricDeltas::for_terminal(false, None))
			.await
			.unwrap();
		store
			.upsert_increment_daily_metric(2, "2024-05-01", MetricDeltas::for_terminal(true, Some(5)))
			.await
			.unwrap();

		let chain1 = store.get_daily_metric(1, "2024-05-01").await.unwrap().unwrap();
		assert_eq!(chain1.total_deployments, 1);
		assert_eq!(chain1.successful_deployments, 0);

		let chain2 = store.get_daily_metric(2, "2024-05-01").await.unwrap().unwrap();
		assert_eq!(chain2.successful_deployments, 1);
		assert_eq!(chain2.total_gas_used, 5);

		assert!(store.get_daily_metric(1, "2024-05-02").await.unwrap().is_none());
	}
}
