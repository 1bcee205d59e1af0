//! Broadcast event bus for inter-component communication.
//!
//! Components publish fire-and-forget events; any number of consumers can
//! subscribe. Publishing never blocks and failures (no subscribers) are
//! ignored at call sites with `.ok()`.

use deployer_types::DeployerEvent;
use tokio::sync::broadcast;

/// Cloneable handle to the pipeline's broadcast channel.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<DeployerEvent>,
}

impl EventBus {
	/// Creates an event bus retaining up to `capacity` undelivered events
	/// per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publishes an event to all current subscribers.
	///
	/// Returns the number of subscribers reached; an error means nobody is
	/// listening, which callers treat as fire-and-forget.
	pub fn publish(
		&self,
		event: DeployerEvent,
	) -> Result<usize, broadcast::error::SendError<DeployerEvent>> {
		self.sender.send(event)
	}

	/// Creates a new subscription receiving events published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<DeployerEvent> {
		self.sender.subscribe()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1024)
	}
}
