//! Finite-state machine primitives.
//!
//! [`TransitionTable`] holds the static transition definitions,
//! [`MachineFactory`] hands out short-lived [`Machine`] instances bound to one
//! entity each, and [`TransitionContext`] carries the event payload and
//! extended state through guards and actions.

pub mod context;
pub mod instance;
pub mod table;

pub use context::{
	EventPayload, ExtendedState, TransitionContext, ENTITY_ID_HEADER, PAYMENT_CONFIRMATION_HEADER,
};
pub use instance::{Machine, MachineFactory};
pub use table::{
	Action, ConfigurationError, Guard, RejectedEvent, RejectionReason, Transition,
	TransitionTable, TransitionTableBuilder,
};
