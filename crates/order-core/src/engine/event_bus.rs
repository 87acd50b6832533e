//! Broadcast of state changes to in-process subscribers.

use crate::listener::{ListenerError, StateChange, StateChangeListener};
use order_types::Vocabulary;
use tokio::sync::broadcast;

/// Fan-out channel for engine events.
///
/// Publishing never blocks. Subscribers that fall behind by more than the
/// channel capacity miss the oldest events.
#[derive(Debug)]
pub struct EventBus<T> {
	sender: broadcast::Sender<T>,
}

impl<T> Clone for EventBus<T> {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}

impl<T: Clone> EventBus<T> {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<T> {
		self.sender.subscribe()
	}

	/// Sends an event to all current subscribers.
	///
	/// Fails only when nobody is subscribed.
	pub fn publish(&self, event: T) -> Result<usize, broadcast::error::SendError<T>> {
		self.sender.send(event)
	}
}

/// Listener that forwards every state change onto an [`EventBus`].
pub struct EventBusListener<S, E> {
	bus: EventBus<StateChange<S, E>>,
}

impl<S: Vocabulary, E: Vocabulary> EventBusListener<S, E> {
	pub fn new(bus: EventBus<StateChange<S, E>>) -> Self {
		Self { bus }
	}
}

impl<S: Vocabulary, E: Vocabulary> StateChangeListener<S, E> for EventBusListener<S, E> {
	fn name(&self) -> &str {
		"event-bus"
	}

	fn on_state_change(&self, change: &StateChange<S, E>) -> Result<(), ListenerError> {
		// No subscribers is not a failure
		self.bus.publish(change.clone()).ok();
		Ok(())
	}
}
