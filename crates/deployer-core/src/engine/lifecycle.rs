//! Lifecycle management for the deployment engine.
//!
//! Handles startup and shutdown procedures, ensuring the worker pools stop
//! picking up jobs when the engine is asked to exit.

use super::{DeployerEngine, EngineError};

impl DeployerEngine {
	/// Performs any initialization required before running
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(
			deployer_id = %self.config.deployer.id,
			chains = self.config.chains.len(),
			"Initializing deployment engine"
		);
		Ok(())
	}

	/// Stops both worker pools.
	///
	/// In-flight jobs finish their current invocation; queued jobs are not
	/// picked up again. Monitored transactions resume from their durable
	/// records on the next start.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down deployment engine");
		self.submissions.shutdown();
		self.confirmation_queue.shutdown();
		Ok(())
	}
}
