//! Static transition table.
//!
//! The table maps `(source state, event)` to a target state with an optional
//! guard and action. It is assembled once at startup through
//! [`TransitionTableBuilder`], validated as a whole, and shared read-only by
//! every machine instance afterwards.

use super::context::TransitionContext;
use order_types::Vocabulary;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Predicate deciding whether a matched transition may fire.
pub type Guard = Arc<dyn Fn(&TransitionContext<'_>) -> bool + Send + Sync>;

/// Side effect run when a transition fires or a state is entered.
///
/// Actions cannot fail. They may log and write extended state, nothing else.
pub type Action = Arc<dyn Fn(&mut TransitionContext<'_>) + Send + Sync>;

/// Errors detected while building a transition table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
	#[error("No initial state declared")]
	MissingInitialState,
	#[error("State {0} is not part of the declared vocabulary")]
	UndeclaredState(&'static str),
	#[error("Event {0} is not part of the declared vocabulary")]
	UndeclaredEvent(&'static str),
	#[error("Duplicate transition for ({state}, {event})")]
	DuplicateTransition {
		state: &'static str,
		event: &'static str,
	},
	#[error("Terminal state {state} has an outgoing transition on {event}")]
	TerminalStateHasTransitions {
		state: &'static str,
		event: &'static str,
	},
	#[error("Duplicate entry action for state {0}")]
	DuplicateEntryAction(&'static str),
	#[error("{0} declared before any transition was registered")]
	DanglingModifier(&'static str),
}

/// Why an event did not produce a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
	/// No entry exists for the `(state, event)` pair.
	NoMatchingTransition,
	/// An entry exists but its guard evaluated to false.
	GuardFailed,
}

impl fmt::Display for RejectionReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RejectionReason::NoMatchingTransition => f.write_str("no matching transition"),
			RejectionReason::GuardFailed => f.write_str("guard failed"),
		}
	}
}

/// An event that was not accepted in the machine's current state.
///
/// This is an expected outcome, not a fault: the state is unchanged, no action
/// ran and nothing was written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Event {event} rejected in state {state}: {reason}")]
pub struct RejectedEvent {
	pub state: &'static str,
	pub event: &'static str,
	pub reason: RejectionReason,
}

/// A single table entry.
pub struct Transition<S, E> {
	source: S,
	event: E,
	target: S,
	guard: Option<Guard>,
	action: Option<Action>,
}

impl<S: Vocabulary, E: Vocabulary> Transition<S, E> {
	pub fn target(&self) -> S {
		self.target
	}

	pub fn is_guarded(&self) -> bool {
		self.guard.is_some()
	}

	pub(crate) fn action(&self) -> Option<&Action> {
		self.action.as_ref()
	}
}

impl<S: Vocabulary, E: Vocabulary> fmt::Debug for Transition<S, E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Transition")
			.field("source", &self.source)
			.field("event", &self.event)
			.field("target", &self.target)
			.field("guard", &self.guard.is_some())
			.field("action", &self.action.is_some())
			.finish()
	}
}

/// Immutable `(state, event) -> transition` map.
pub struct TransitionTable<S, E> {
	initial: S,
	terminal: HashSet<S>,
	transitions: HashMap<(S, E), Transition<S, E>>,
	entry_actions: HashMap<S, Action>,
}

impl<S: Vocabulary, E: Vocabulary> TransitionTable<S, E> {
	/// Starts a table over the given subsets of states and events.
	pub fn builder(states: &[S], events: &[E]) -> TransitionTableBuilder<S, E> {
		TransitionTableBuilder {
			states: states.iter().copied().collect(),
			events: events.iter().copied().collect(),
			initial: None,
			terminal: Vec::new(),
			transitions: Vec::new(),
			entry_actions: Vec::new(),
			dangling: None,
		}
	}

	pub fn initial_state(&self) -> S {
		self.initial
	}

	pub fn is_terminal(&self, state: S) -> bool {
		self.terminal.contains(&state)
	}

	/// Returns the entry for `(source, event)`, if any.
	pub fn lookup(&self, source: S, event: E) -> Option<&Transition<S, E>> {
		self.transitions.get(&(source, event))
	}

	pub(crate) fn entry_action(&self, state: S) -> Option<&Action> {
		self.entry_actions.get(&state)
	}

	/// Decides which transition, if any, `event` triggers in `state`.
	///
	/// Looks up the entry and evaluates its guard. Nothing is executed and
	/// nothing is mutated, so this can be called without a machine or store.
	pub fn evaluate(
		&self,
		state: S,
		event: E,
		context: &TransitionContext<'_>,
	) -> Result<&Transition<S, E>, RejectedEvent> {
		let rejected = |reason| RejectedEvent {
			state: state.name(),
			event: event.name(),
			reason,
		};

		let transition = self
			.lookup(state, event)
			.ok_or_else(|| rejected(RejectionReason::NoMatchingTransition))?;

		match &transition.guard {
			Some(guard) if !guard(context) => Err(rejected(RejectionReason::GuardFailed)),
			_ => Ok(transition),
		}
	}

	/// Number of registered transitions.
	pub fn len(&self) -> usize {
		self.transitions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.transitions.is_empty()
	}
}

/// Collects table entries and validates them on [`build`](Self::build).
pub struct TransitionTableBuilder<S, E> {
	states: HashSet<S>,
	events: HashSet<E>,
	initial: Option<S>,
	terminal: Vec<S>,
	transitions: Vec<Transition<S, E>>,
	entry_actions: Vec<(S, Action)>,
	dangling: Option<&'static str>,
}

impl<S: Vocabulary, E: Vocabulary> TransitionTableBuilder<S, E> {
	pub fn initial(mut self, state: S) -> Self {
		self.initial = Some(state);
		self
	}

	/// Marks a state as terminal. Terminal states may not have outgoing entries.
	pub fn terminal(mut self, state: S) -> Self {
		self.terminal.push(state);
		self
	}

	/// Registers `source --event--> target`.
	///
	/// Follow with [`guard`](Self::guard) or [`action`](Self::action) to
	/// attach them to this entry.
	pub fn register(mut self, source: S, event: E, target: S) -> Self {
		self.transitions.push(Transition {
			source,
			event,
			target,
			guard: None,
			action: None,
		});
		self
	}

	/// Attaches a guard to the most recently registered transition.
	pub fn guard<F>(mut self, guard: F) -> Self
	where
		F: Fn(&TransitionContext<'_>) -> bool + Send + Sync + 'static,
	{
		match self.transitions.last_mut() {
			Some(transition) => transition.guard = Some(Arc::new(guard)),
			None => self.dangling = self.dangling.or(Some("Guard")),
		}
		self
	}

	/// Attaches an action to the most recently registered transition.
	pub fn action<F>(mut self, action: F) -> Self
	where
		F: Fn(&mut TransitionContext<'_>) + Send + Sync + 'static,
	{
		match self.transitions.last_mut() {
			Some(transition) => transition.action = Some(Arc::new(action)),
			None => self.dangling = self.dangling.or(Some("Action")),
		}
		self
	}

	/// Registers an action that runs whenever `state` is entered.
	pub fn on_entry<F>(mut self, state: S, action: F) -> Self
	where
		F: Fn(&mut TransitionContext<'_>) + Send + Sync + 'static,
	{
		self.entry_actions.push((state, Arc::new(action)));
		self
	}

	/// Validates the collected entries and freezes them into a table.
	///
	/// # Errors
	///
	/// Returns the first [`ConfigurationError`] found.
	pub fn build(self) -> Result<TransitionTable<S, E>, ConfigurationError> {
		if let Some(modifier) = self.dangling {
			return Err(ConfigurationError::DanglingModifier(modifier));
		}

		let states = &self.states;
		let declared = |state: S| {
			if states.contains(&state) {
				Ok(state)
			} else {
				Err(ConfigurationError::UndeclaredState(state.name()))
			}
		};

		let initial = declared(self.initial.ok_or(ConfigurationError::MissingInitialState)?)?;
		let terminal = self
			.terminal
			.iter()
			.map(|state| declared(*state))
			.collect::<Result<HashSet<_>, _>>()?;

		let mut transitions = HashMap::with_capacity(self.transitions.len());
		for transition in self.transitions {
			declared(transition.source)?;
			declared(transition.target)?;
			if !self.events.contains(&transition.event) {
				return Err(ConfigurationError::UndeclaredEvent(transition.event.name()));
			}
			if terminal.contains(&transition.source) {
				return Err(ConfigurationError::TerminalStateHasTransitions {
					state: transition.source.name(),
					event: transition.event.name(),
				});
			}

			let key = (transition.source, transition.event);
			if transitions.contains_key(&key) {
				return Err(ConfigurationError::DuplicateTransition {
					state: transition.source.name(),
					event: transition.event.name(),
				});
			}
			transitions.insert(key, transition);
		}

		let mut entry_actions = HashMap::with_capacity(self.entry_actions.len());
		for (state, action) in self.entry_actions {
			declared(state)?;
			if entry_actions.insert(state, action).is_some() {
				return Err(ConfigurationError::DuplicateEntryAction(state.name()));
			}
		}

		Ok(TransitionTable {
			initial,
			terminal,
			transitions,
			entry_actions,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::machine::context::{EventPayload, ExtendedState};
	use order_types::{OrderEvent, OrderState};

	fn builder() -> TransitionTableBuilder<OrderState, OrderEvent> {
		TransitionTable::builder(OrderState::all(), OrderEvent::all()).initial(OrderState::Submitted)
	}

	fn evaluate(
		table: &TransitionTable<OrderState, OrderEvent>,
		state: OrderState,
		event: OrderEvent,
		payload: &EventPayload,
	) -> Result<OrderState, RejectedEvent> {
		let mut extended = ExtendedState::new();
		let context = TransitionContext {
			entity_id: "1",
			payload,
			extended: &mut extended,
		};
		table
			.evaluate(state, event, &context)
			.map(|transition| transition.target())
	}

	#[test]
	fn test_lookup_and_missing_entry() {
		let table = builder()
			.register(OrderState::Submitted, OrderEvent::Pay, OrderState::Paid)
			.build()
			.unwrap();

		let transition = table.lookup(OrderState::Submitted, OrderEvent::Pay).unwrap();
		assert_eq!(transition.target(), OrderState::Paid);
		assert!(!transition.is_guarded());
		assert!(table.lookup(OrderState::Paid, OrderEvent::Pay).is_none());

		let rejected = evaluate(&table, OrderState::Paid, OrderEvent::Pay, &EventPayload::new())
			.unwrap_err();
		assert_eq!(rejected.reason, RejectionReason::NoMatchingTransition);
		assert_eq!(rejected.state, "PAID");
		assert_eq!(rejected.event, "PAY");
	}

	#[test]
	fn test_guard_evaluation() {
		let table = builder()
			.register(OrderState::Submitted, OrderEvent::Pay, OrderState::Paid)
			.guard(|ctx| ctx.header("paymentConfirmationNumber").is_some())
			.build()
			.unwrap();

		let denied = evaluate(
			&table,
			OrderState::Submitted,
			OrderEvent::Pay,
			&EventPayload::new(),
		);
		assert_eq!(denied.unwrap_err().reason, RejectionReason::GuardFailed);

		let payload = EventPayload::new().with_header("paymentConfirmationNumber", "conf-1");
		let allowed = evaluate(&table, OrderState::Submitted, OrderEvent::Pay, &payload);
		assert_eq!(allowed.unwrap(), OrderState::Paid);
	}

	#[test]
	fn test_duplicate_transition_rejected() {
		let result = builder()
			.register(OrderState::Submitted, OrderEvent::Pay, OrderState::Paid)
			.register(OrderState::Submitted, OrderEvent::Pay, OrderState::Cancelled)
			.build();
		assert_eq!(
			result.err(),
			Some(ConfigurationError::DuplicateTransition {
				state: "SUBMITTED",
				event: "PAY",
			})
		);
	}

	#[test]
	fn test_undeclared_vocabulary_rejected() {
		let result = TransitionTable::builder(
			&[OrderState::Submitted, OrderState::Paid],
			&[OrderEvent::Pay],
		)
		.initial(OrderState::Submitted)
		.register(OrderState::Submitted, OrderEvent::Cancel, OrderState::Paid)
		.build();
		assert_eq!(result.err(), Some(ConfigurationError::UndeclaredEvent("CANCEL")));

		let result = TransitionTable::builder(
			&[OrderState::Submitted, OrderState::Paid],
			&[OrderEvent::Pay],
		)
		.initial(OrderState::Submitted)
		.register(OrderState::Paid, OrderEvent::Pay, OrderState::Fulfilled)
		.build();
		assert_eq!(result.err(), Some(ConfigurationError::UndeclaredState("FULFILLED")));
	}

	#[test]
	fn test_initial_state_required() {
		let result = TransitionTable::<OrderState, OrderEvent>::builder(
			OrderState::all(),
			OrderEvent::all(),
		)
		.register(OrderState::Submitted, OrderEvent::Pay, OrderState::Paid)
		.build();
		assert_eq!(result.err(), Some(ConfigurationError::MissingInitialState));
	}

	#[test]
	fn test_terminal_state_cannot_have_transitions() {
		let result = builder()
			.terminal(OrderState::Fulfilled)
			.register(OrderState::Fulfilled, OrderEvent::Cancel, OrderState::Cancelled)
			.build();
		assert!(matches!(
			result.err(),
			Some(ConfigurationError::TerminalStateHasTransitions { state: "FULFILLED", .. })
		));
	}

	#[test]
	fn test_dangling_action_rejected() {
		let result = builder()
			.action(|_| {})
			.register(OrderState::Submitted, OrderEvent::Pay, OrderState::Paid)
			.build();
		assert_eq!(result.err(), Some(ConfigurationError::DanglingModifier("Action")));
	}

	#[test]
	fn test_duplicate_entry_action_rejected() {
		let result = builder()
			.on_entry(OrderState::Paid, |_| {})
			.on_entry(OrderState::Paid, |_| {})
			.build();
		assert_eq!(result.err(), Some(ConfigurationError::DuplicateEntryAction("PAID")));
	}
}
