//! State-change listeners.
//!
//! Listeners are invoked synchronously after every successful transition,
//! while the per-entity lock is still held. They observe only: a failing
//! listener is logged and skipped, it never changes the outcome of the event.

use order_types::Vocabulary;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Error reported by a listener. Logged, never propagated.
#[derive(Debug, Error)]
#[error("Listener error: {0}")]
pub struct ListenerError(pub String);

/// A completed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange<S, E> {
	pub entity_id: String,
	pub from: S,
	pub to: S,
	pub event: E,
}

/// Observer of state changes.
pub trait StateChangeListener<S, E>: Send + Sync {
	/// Short name used when logging failures.
	fn name(&self) -> &str;

	fn on_state_change(&self, change: &StateChange<S, E>) -> Result<(), ListenerError>;
}

/// Ordered set of listeners shared by every machine a factory creates.
pub type Listeners<S, E> = Arc<[Arc<dyn StateChangeListener<S, E>>]>;

/// Calls every listener in registration order, swallowing failures.
pub(crate) fn notify_all<S: Vocabulary, E: Vocabulary>(
	listeners: &[Arc<dyn StateChangeListener<S, E>>],
	change: &StateChange<S, E>,
) {
	for listener in listeners {
		if let Err(e) = listener.on_state_change(change) {
			tracing::warn!(
				listener = listener.name(),
				entity_id = %change.entity_id,
				from = %change.from,
				to = %change.to,
				error = %e,
				"State change listener failed"
			);
		}
	}
}

/// Writes one log line per transition.
pub struct AuditLogListener;

impl<S: Vocabulary, E: Vocabulary> StateChangeListener<S, E> for AuditLogListener {
	fn name(&self) -> &str {
		"audit-log"
	}

	fn on_state_change(&self, change: &StateChange<S, E>) -> Result<(), ListenerError> {
		tracing::info!(
			order_id = %change.entity_id,
			event = %change.event,
			"State changed from {} to {}",
			change.from,
			change.to
		);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use order_types::{OrderEvent, OrderState};
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct Failing(AtomicUsize);

	impl StateChangeListener<OrderState, OrderEvent> for Failing {
		fn name(&self) -> &str {
			"failing"
		}

		fn on_state_change(
			&self,
			_change: &StateChange<OrderState, OrderEvent>,
		) -> Result<(), ListenerError> {
			self.0.fetch_add(1, Ordering::SeqCst);
			Err(ListenerError("sink unavailable".into()))
		}
	}

	#[test]
	fn test_failure_does_not_stop_later_listeners() {
		let first = Arc::new(Failing(AtomicUsize::new(0)));
		let second = Arc::new(Failing(AtomicUsize::new(0)));
		let listeners: Vec<Arc<dyn StateChangeListener<OrderState, OrderEvent>>> =
			vec![first.clone(), Arc::new(AuditLogListener), second.clone()];

		let change = StateChange {
			entity_id: "5".to_string(),
			from: OrderState::Submitted,
			to: OrderState::Paid,
			event: OrderEvent::Pay,
		};
		notify_all(&listeners, &change);

		assert_eq!(first.0.load(Ordering::SeqCst), 1);
		assert_eq!(second.0.load(Ordering::SeqCst), 1);
	}
}
