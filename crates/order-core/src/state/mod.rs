//! Domain state machines and their repositories.

pub mod order;

pub use order::{order_transition_table, OrderRepository};
