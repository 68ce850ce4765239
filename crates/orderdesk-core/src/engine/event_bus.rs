//! Event bus for desk-wide notifications.
//!
//! A thin wrapper over a tokio broadcast channel. Publishing never blocks;
//! slow subscribers lag and miss events rather than holding up writers.

use orderdesk_types::DeskEvent;
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<DeskEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publishes an event to every current subscriber.
	///
	/// Fails only when nobody is subscribed, which callers usually ignore.
	pub fn publish(
		&self,
		event: DeskEvent,
	) -> Result<usize, broadcast::error::SendError<DeskEvent>> {
		self.sender.send(event)
	}

	pub fn subscribe(&self) -> broadcast::Receiver<DeskEvent> {
		self.sender.subscribe()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}
