//! Persistent finite-state-machine engine for orders.
//!
//! A static [`TransitionTable`](machine::TransitionTable) defines which event
//! moves an entity from one state to another. Every event is processed by the
//! [`PersistentStateMachine`](persistence::PersistentStateMachine): it locks
//! the entity, rehydrates a fresh machine from storage, applies the event,
//! notifies listeners and writes the new state back. [`OrderService`] exposes
//! the order lifecycle on top of it, and [`OrderServiceBuilder`] wires the
//! service from configuration.

pub mod builder;
pub mod engine;
pub mod listener;
pub mod machine;
pub mod persistence;
pub mod state;

pub use builder::{BuilderError, OrderFactories, OrderServiceBuilder};
pub use engine::{event_bus::EventBus, OrderService, OrderStateChange};
pub use listener::{AuditLogListener, ListenerError, StateChange, StateChangeListener};
pub use persistence::{PersistenceError, ProcessError, StateRepository};
