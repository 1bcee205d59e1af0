//! Per-chain daily metric types.

use serde::{Deserialize, Serialize};

/// Aggregated deployment counters for one `(chain_id, calendar date)` pair.
///
/// Counters are monotonically non-decreasing; every mutation goes through an
/// atomic upsert-with-increment in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDailyMetric {
	/// Chain these counters belong to.
	pub chain_id: u64,
	/// Calendar date in `YYYY-MM-DD` form (UTC).
	pub date: String,
	/// Deployments that reached a terminal state this day.
	pub total_deployments: u64,
	/// Deployments that reached `Success` this day.
	pub successful_deployments: u64,
	/// Sum of gas consumed by this day's terminal deployments.
	pub total_gas_used: u128,
}

impl ChainDailyMetric {
	/// An empty row for the given chain and date.
	pub fn zero(chain_id: u64, date: String) -> Self {
		Self {
			chain_id,
			date,
			total_deployments: 0,
			successful_deployments: 0,
			total_gas_used: 0,
		}
	}

	/// Applies increment deltas to this row.
	pub fn apply(&mut self, deltas: &MetricDeltas) {
		self.total_deployments += deltas.deployments;
		self.successful_deployments += deltas.successful;
		self.total_gas_used += deltas.gas_used;
	}
}

/// Increment deltas for one terminal deployment event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDeltas {
	/// Increment for `total_deployments`.
	pub deployments: u64,
	/// Increment for `successful_deployments`.
	pub successful: u64,
	/// Increment for `total_gas_used`.
	pub gas_used: u128,
}

impl MetricDeltas {
	/// Deltas for a single terminal event.
	pub fn for_terminal(success: bool, gas_used: Option<u64>) -> Self {
		Self {
			deployments: 1,
			successful: if success { 1 } else { 0 },
			gas_used: gas_used.unwrap_or(0) as u128,
		}
	}
}
