//! Machine instances and the factory that creates them.

use super::context::{EventPayload, ExtendedState, TransitionContext};
use super::table::{RejectedEvent, TransitionTable};
use crate::listener::{notify_all, Listeners, StateChange, StateChangeListener};
use order_types::Vocabulary;
use std::sync::Arc;

/// A state machine bound to a single entity.
///
/// Instances are short-lived: one is created per processed event, its state
/// is only meaningful after rehydration, and it is dropped afterwards.
pub struct Machine<S, E> {
	entity_id: String,
	state: S,
	extended: ExtendedState,
	table: Arc<TransitionTable<S, E>>,
	listeners: Listeners<S, E>,
}

impl<S: Vocabulary, E: Vocabulary> Machine<S, E> {
	pub fn state(&self) -> S {
		self.state
	}

	pub fn extended_state(&self) -> &ExtendedState {
		&self.extended
	}

	/// Applies one event.
	///
	/// On a match the transition action runs, then the entry action of the
	/// target, then the state changes and listeners are notified. A rejected
	/// event leaves the machine untouched.
	pub fn apply(&mut self, event: E, payload: &EventPayload) -> Result<S, RejectedEvent> {
		let previous = self.state;
		let mut context = TransitionContext {
			entity_id: &self.entity_id,
			payload,
			extended: &mut self.extended,
		};

		let transition = self.table.evaluate(previous, event, &context)?;
		let target = transition.target();

		if let Some(action) = transition.action() {
			action(&mut context);
		}
		if let Some(entry) = self.table.entry_action(target) {
			entry(&mut context);
		}

		self.state = target;
		let change = StateChange {
			entity_id: self.entity_id.clone(),
			from: previous,
			to: target,
			event,
		};
		notify_all(&self.listeners, &change);

		Ok(target)
	}
}

/// Creates machine instances sharing one table and listener set.
pub struct MachineFactory<S, E> {
	table: Arc<TransitionTable<S, E>>,
	listeners: Listeners<S, E>,
}

impl<S: Vocabulary, E: Vocabulary> Clone for MachineFactory<S, E> {
	fn clone(&self) -> Self {
		Self {
			table: Arc::clone(&self.table),
			listeners: Arc::clone(&self.listeners),
		}
	}
}

impl<S: Vocabulary, E: Vocabulary> MachineFactory<S, E> {
	pub fn new(
		table: TransitionTable<S, E>,
		listeners: Vec<Arc<dyn StateChangeListener<S, E>>>,
	) -> Self {
		Self {
			table: Arc::new(table),
			listeners: listeners.into(),
		}
	}

	pub fn table(&self) -> &TransitionTable<S, E> {
		&self.table
	}

	/// Starts a machine for a new entity in the initial state.
	///
	/// Runs the initial state's entry action, if any.
	pub fn create(&self, entity_id: impl Into<String>) -> Machine<S, E> {
		let mut machine = self.rehydrate(entity_id, self.table.initial_state());
		if let Some(entry) = self.table.entry_action(machine.state) {
			let payload = EventPayload::new();
			let mut context = TransitionContext {
				entity_id: &machine.entity_id,
				payload: &payload,
				extended: &mut machine.extended,
			};
			entry(&mut context);
		}
		machine
	}

	/// Builds a machine positioned at a previously stored state.
	///
	/// No actions run and no listener is notified.
	pub fn rehydrate(&self, entity_id: impl Into<String>, state: S) -> Machine<S, E> {
		Machine {
			entity_id: entity_id.into(),
			state,
			extended: ExtendedState::new(),
			table: Arc::clone(&self.table),
			listeners: Arc::clone(&self.listeners),
		}
	}
}
