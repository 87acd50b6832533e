//! State and event vocabularies.
//!
//! A vocabulary is a closed, compile-time enumerated set of symbols. Nothing
//! registers new states or events at runtime; the transition table can only
//! reference values of these types, and the persisted form of a value is
//! always its symbolic name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a symbolic name does not belong to a vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind} name: {name}")]
pub struct UnknownName {
	pub kind: &'static str,
	pub name: String,
}

/// A closed set of symbols usable as machine states or events.
pub trait Vocabulary:
	Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
	/// Human readable kind used in error messages ("state", "event").
	const KIND: &'static str;

	/// Every member of the vocabulary, in declaration order.
	fn all() -> &'static [Self];

	/// The symbolic name used for persistence and logging.
	fn name(&self) -> &'static str;

	/// Resolves a symbolic name back into a member.
	fn from_name(name: &str) -> Result<Self, UnknownName> {
		Self::all()
			.iter()
			.copied()
			.find(|member| member.name() == name)
			.ok_or_else(|| UnknownName {
				kind: Self::KIND,
				name: name.to_string(),
			})
	}
}

/// Lifecycle states of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
	/// Order has been created and awaits payment. Initial state.
	Submitted,
	/// Payment has been confirmed.
	Paid,
	/// Order has been delivered. Terminal.
	Fulfilled,
	/// Order was cancelled before fulfilment. Terminal.
	Cancelled,
}

impl Vocabulary for OrderState {
	const KIND: &'static str = "state";

	fn all() -> &'static [Self] {
		&[Self::Submitted, Self::Paid, Self::Fulfilled, Self::Cancelled]
	}

	fn name(&self) -> &'static str {
		match self {
			OrderState::Submitted => "SUBMITTED",
			OrderState::Paid => "PAID",
			OrderState::Fulfilled => "FULFILLED",
			OrderState::Cancelled => "CANCELLED",
		}
	}
}

/// External stimuli that drive an order through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEvent {
	Pay,
	Fulfill,
	Cancel,
}

impl Vocabulary for OrderEvent {
	const KIND: &'static str = "event";

	fn all() -> &'static [Self] {
		&[Self::Pay, Self::Fulfill, Self::Cancel]
	}

	fn name(&self) -> &'static str {
		match self {
			OrderEvent::Pay => "PAY",
			OrderEvent::Fulfill => "FULFILL",
			OrderEvent::Cancel => "CANCEL",
		}
	}
}

macro_rules! impl_symbolic {
	($ty:ty) => {
		impl fmt::Display for $ty {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(self.name())
			}
		}

		impl FromStr for $ty {
			type Err = UnknownName;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				<$ty as Vocabulary>::from_name(s)
			}
		}
	};
}

impl_symbolic!(OrderState);
impl_symbolic!(OrderEvent);

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_names_match_serde_representation() {
		for state in OrderState::all() {
			let json = serde_json::to_string(state).unwrap();
			assert_eq!(json, format!("\"{}\"", state.name()));
		}
		for event in OrderEvent::all() {
			let json = serde_json::to_string(event).unwrap();
			assert_eq!(json, format!("\"{}\"", event.name()));
		}
	}

	#[test]
	fn test_parse_symbolic_name() {
		assert_eq!("PAID".parse::<OrderState>().unwrap(), OrderState::Paid);
		assert_eq!("CANCEL".parse::<OrderEvent>().unwrap(), OrderEvent::Cancel);
	}

	#[test]
	fn test_unknown_name_rejected() {
		let err = "paid".parse::<OrderState>().unwrap_err();
		assert_eq!(err.kind, "state");
		assert_eq!(err.to_string(), "Unknown state name: paid");

		assert!(serde_json::from_str::<OrderState>("\"SHIPPED\"").is_err());
	}
}
