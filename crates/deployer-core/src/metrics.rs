//! Terminal-event metrics aggregation.
//!
//! Consumes terminal deployment events and performs the idempotent daily
//! upsert on the per-chain metric row. The store's compare-and-swap makes the
//! increment atomic, so concurrent terminal events for the same chain and day
//! never lose counts.

use chrono::Utc;
use deployer_storage::{DeploymentStore, StorageError};
use deployer_types::{ChainDailyMetric, MetricDeltas};
use std::sync::Arc;

/// Aggregates terminal deployment events into per-chain daily counters.
pub struct MetricsAggregator {
	store: Arc<DeploymentStore>,
}

impl MetricsAggregator {
	pub fn new(store: Arc<DeploymentStore>) -> Self {
		Self { store }
	}

	/// Records one terminal deployment under today's UTC date.
	///
	/// `total_deployments` counts every terminal event, `successful_deployments`
	/// only successes, and `total_gas_used` grows by the event's gas (absent
	/// gas counts as zero, e.g. for pre-submission failures).
	pub async fn record(
		&self,
		chain_id: u64,
		success: bool,
		gas_used: Option<u64>,
	) -> Result<ChainDailyMetric, StorageError> {
		let date = Utc::now().date_naive().to_string();
		self.store
			.upsert_increment_daily_metric(
				chain_id,
				&date,
				MetricDeltas::for_terminal(success, gas_used),
			)
			.await
	}

	/// Reads today's counters for a chain, if any terminal event landed yet.
	pub async fn today(&self, chain_id: u64) -> Result<Option<ChainDailyMetric>, StorageError> {
		let date = Utc::now().date_naive().to_string();
		self.store.get_daily_metric(chain_id, &date).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use deployer_storage::implementations::memory::MemoryStorage;

	fn aggregator() -> MetricsAggregator {
		MetricsAggregator::new(Arc::new(DeploymentStore::new(Box::new(
			MemoryStorage::new(),
		))))
	}

	#[tokio::test]
	async fn test_counts_successes_and_failures_separately() {
		let aggregator = aggregator();

		aggregator.record(5, true, Some(30_000)).await.unwrap();
		aggregator.record(5, false, Some(10_000)).await.unwrap();
		aggregator.record(5, false, None).await.unwrap();

		let metric = aggregator.today(5).await.unwrap().unwrap();
		assert_eq!(metric.total_deployments, 3);
		assert_eq!(metric.successful_deployments, 1);
		assert_eq!(metric.total_gas_used, 40_000);
	}

	#[tokio::test]
	async fn test_concurrent_events_lose_no_increments() {
		let aggregator = Arc::new(aggregator());

		let mut handles = Vec::new();
		for _ in 0..100 {
			let aggregator = aggregator.clone();
			handles.push(tokio::spawn(async move {
				aggregator.record(7, true, Some(21_000)).await.unwrap();
			}));
		}
		for handle in handles {
			handle.await.unwrap();
		}

		let metric = aggregator.today(7).await.unwrap().unwrap();
		assert_eq!(metric.total_deployments, 100);
		assert_eq!(metric.successful_deployments, 100);
		assert_eq!(metric.total_gas_used, 100 * 21_000);
	}
}
