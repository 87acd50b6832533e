//! Persisted order record.

use crate::OrderState;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier assigned by the persistence layer when an order is created.
pub type OrderId = u64;

/// Durable representation of an order.
///
/// The state is serialized by symbolic name (`"SUBMITTED"`, `"PAID"`, ...)
/// so stored records stay readable and survive reordering of the enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
	/// Unique identifier for this order.
	pub id: OrderId,
	/// Calendar date the order was placed.
	pub created_on: NaiveDate,
	/// Unix timestamp (seconds) of the last persisted change.
	pub updated_at: u64,
	/// Current lifecycle state.
	pub state: OrderState,
}

impl OrderRecord {
	/// Storage identifier of this record within the orders namespace.
	pub fn storage_id(&self) -> String {
		self.id.to_string()
	}
}
