//! Batch submission orchestration.
//!
//! Submits N independent deployment specifications for one user sequentially
//! and aggregates per-item outcomes. Sequential submission bounds the load on
//! the chain clients and keeps caller-visible ordering; a failing item never
//! aborts the rest.

use crate::engine::DeployerEngine;
use deployer_types::DeploymentSpec;
use serde::{Deserialize, Serialize};

/// One failed batch item with the spec that caused it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
	/// The specification that failed.
	pub spec: DeploymentSpec,
	/// Why it failed.
	pub error: String,
}

/// Aggregate outcome of a batch submission.
///
/// `successful` holds the deployment ids of every item that reached
/// submission; `failed` holds the rejected items with their errors. The two
/// lists together cover every input spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
	/// Deployment ids of items submitted to their chains.
	pub successful: Vec<String>,
	/// Items that failed before or during submission.
	pub failed: Vec<BatchFailure>,
}

impl DeployerEngine {
	/// Submits a batch of deployment specifications sequentially.
	///
	/// Each item runs through intake, queueing, and submission before the
	/// next one starts. The returned result covers the submitted-or-rejected
	/// stage only; on-chain confirmation continues asynchronously for the
	/// successful items.
	pub async fn submit_batch(&self, specs: Vec<DeploymentSpec>) -> BatchResult {
		let mut result = BatchResult::default();

		for spec in specs {
			match self.submit_deployment(spec.clone()).await {
				Ok(submission) => {
					let deployment_id = submission.deployment_id;
					match submission.handle.wait().await {
						Ok(()) => result.successful.push(deployment_id),
						Err(e) => result.failed.push(BatchFailure {
							spec,
							error: e.to_string(),
						}),
					}
				},
				Err(e) => result.failed.push(BatchFailure {
					spec,
					error: e.to_string(),
				}),
			}
		}

		result
	}
}
