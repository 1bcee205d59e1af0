//! Event types for inter-service communication.
//!
//! This module defines the event system used by the pipeline for asynchronous
//! communication between components. Events flow through an event bus allowing
//! services to react to state changes in other parts of the system; the
//! metrics aggregator consumes the terminal `Finalized` events.

use crate::TransactionHash;
use serde::{Deserialize, Serialize};

/// Main event type encompassing all pipeline events.
///
/// Events are categorized by the stage that produces them, allowing
/// consumers to filter and handle specific event types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeployerEvent {
	/// Events from the submission stage.
	Deployment(DeploymentEvent),
	/// Events from the confirmation monitor.
	Confirmation(ConfirmationEvent),
}

/// Events emitted while a deployment moves through the submission pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeploymentEvent {
	/// A deployment request was accepted and queued.
	Queued {
		deployment_id: String,
		chain_id: u64,
		priority: u32,
	},
	/// The deployment transaction was submitted and is awaiting confirmation.
	Submitted {
		deployment_id: String,
		chain_id: u64,
		tx_hash: TransactionHash,
	},
	/// The deployment failed before or during submission.
	SubmissionFailed {
		deployment_id: String,
		chain_id: u64,
		error: String,
	},
}

/// Events emitted by the confirmation monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConfirmationEvent {
	/// A deployment reached a terminal state. This is the event the metrics
	/// aggregator counts; `gas_used` is absent when no receipt was involved
	/// (e.g. a compile failure).
	Finalized {
		deployment_id: String,
		chain_id: u64,
		success: bool,
		gas_used: Option<u64>,
	},
	/// The poll budget was exhausted without a receipt. The deployment record
	/// is left as-is; the transaction may still confirm later.
	TimedOut {
		deployment_id: String,
		chain_id: u64,
		tx_hash: TransactionHash,
		polls: u32,
	},
}
