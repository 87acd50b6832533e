//! Data visible to guards and actions while an event is evaluated.

use std::collections::HashMap;

/// Per-machine key/value variables that actions may read and write.
///
/// Lives only as long as the machine instance; it is not persisted.
pub type ExtendedState = HashMap<String, serde_json::Value>;

/// Header carrying the entity id, set on every payload the engine builds.
pub const ENTITY_ID_HEADER: &str = "orderId";

/// Header carrying the payment confirmation reference of a `PAY` event.
pub const PAYMENT_CONFIRMATION_HEADER: &str = "paymentConfirmationNumber";

/// Headers accompanying an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPayload {
	headers: HashMap<String, String>,
}

impl EventPayload {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a header, replacing any previous value with the same name.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());
		self
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).map(String::as_str)
	}

	pub fn headers(&self) -> &HashMap<String, String> {
		&self.headers
	}
}

/// Context handed to guards (read-only) and actions (mutable).
pub struct TransitionContext<'a> {
	/// Entity the machine is bound to.
	pub entity_id: &'a str,
	/// Headers of the event being processed.
	pub payload: &'a EventPayload,
	/// The machine's extended state.
	pub extended: &'a mut ExtendedState,
}

impl TransitionContext<'_> {
	/// Convenience accessor for a payload header.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.payload.header(name)
	}
}
