//! Core orchestration engine for the contract deployment pipeline.
//!
//! This crate wires the deployment intake, the priority-ordered submission
//! queue, the confirmation polling loop, and the metrics aggregation into a
//! single engine. All collaborators (storage, chain clients) are injected at
//! construction, so the pipeline can run against real chains or mocks alike.

/// Batch submission orchestration and result types.
pub mod batch;
/// The main engine tying queues, workers, and metrics together.
pub mod engine;
/// Broadcast event bus for inter-component communication.
pub mod event_bus;
/// Terminal-event consumer performing daily metric upserts.
pub mod metrics;
/// Chain priority resolution.
pub mod priority;
/// Generic bounded-worker priority job queue.
pub mod queue;
/// Deployment record state machine.
pub mod state;
/// Queue job handlers: submission worker and confirmation monitor.
pub mod workers;

pub use batch::{BatchFailure, BatchResult};
pub use engine::{DeployerEngine, DeploymentSubmission, EngineError};
pub use event_bus::EventBus;
pub use metrics::MetricsAggregator;
pub use priority::PriorityResolver;
pub use queue::{JobContext, JobError, JobHandle, JobHandler, JobQueue, QueueConfig};
pub use state::{DeploymentStateMachine, StateError};
pub use workers::confirmation::{ConfirmationScheduler, ConfirmationWorker};
pub use workers::deploy::DeploymentWorker;

#[cfg(test)]
pub(crate) mod testutil;
