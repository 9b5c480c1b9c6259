//! Broadcast channel for oracle events.

use oracle_types::OracleEvent;
use tokio::sync::broadcast;

/// Fan-out of [`OracleEvent`]s to every subscriber.
///
/// Events published while nobody listens are dropped; slow subscribers lose
/// the oldest events once `capacity` is exceeded.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<OracleEvent>,
}

impl EventBus {
	/// Creates a bus that buffers up to `capacity` events per slow subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Receives every event published after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<OracleEvent> {
		self.sender.subscribe()
	}

	/// Broadcasts `event`. Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: OracleEvent,
	) -> Result<(), broadcast::error::SendError<OracleEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1000)
	}
}
