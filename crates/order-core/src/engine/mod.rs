//! Order lifecycle facade.
//!
//! [`OrderService`] is what callers use: it creates and reads orders directly
//! through the repository and routes every lifecycle event through the
//! persistent state machine.

pub mod event_bus;

use crate::listener::StateChange;
use crate::machine::{EventPayload, ENTITY_ID_HEADER, PAYMENT_CONFIRMATION_HEADER};
use crate::persistence::{with_timeout, PersistentStateMachine, ProcessError};
use crate::state::OrderRepository;
use chrono::NaiveDate;
use event_bus::EventBus;
use order_types::{OrderEvent, OrderId, OrderRecord, OrderState};
use std::sync::Arc;
use tracing::instrument;

/// State change as published on the order event bus.
pub type OrderStateChange = StateChange<OrderState, OrderEvent>;

/// Entry point for creating orders and driving them through their lifecycle.
pub struct OrderService {
	/// Service identifier from configuration, used in logs.
	service_id: String,
	repository: Arc<OrderRepository>,
	machine: PersistentStateMachine<OrderState, OrderEvent>,
	event_bus: EventBus<OrderStateChange>,
}

impl OrderService {
	pub fn new(
		service_id: String,
		repository: Arc<OrderRepository>,
		machine: PersistentStateMachine<OrderState, OrderEvent>,
		event_bus: EventBus<OrderStateChange>,
	) -> Self {
		Self {
			service_id,
			repository,
			machine,
			event_bus,
		}
	}

	pub fn service_id(&self) -> &str {
		&self.service_id
	}

	/// Bus on which every successful transition is published.
	pub fn event_bus(&self) -> &EventBus<OrderStateChange> {
		&self.event_bus
	}

	/// Creates an order in the initial state.
	#[instrument(skip_all, fields(created_on = %created_on))]
	pub async fn create(&self, created_on: NaiveDate) -> Result<OrderRecord, ProcessError> {
		let initial = self.machine.factory().table().initial_state();
		let record = with_timeout(
			self.machine.persistence_timeout(),
			"create",
			self.repository.create(created_on, initial),
		)
		.await?;

		// Entry actions of the initial state run once the id is known. They
		// only have side effects here: the extended state they fill is dropped
		// with the machine, and later events rehydrate from storage.
		let _ = self.machine.factory().create(record.storage_id());

		tracing::info!(order_id = %record.id, state = %record.state, "Created order");
		Ok(record)
	}

	/// Returns the stored record.
	pub async fn get(&self, id: OrderId) -> Result<OrderRecord, ProcessError> {
		let entity_id = id.to_string();
		with_timeout(
			self.machine.persistence_timeout(),
			"load",
			self.repository.load(&entity_id),
		)
		.await?
		.ok_or_else(|| ProcessError::EntityNotFound(id.to_string()))
	}

	/// Confirms payment for a submitted order.
	pub async fn pay(&self, id: OrderId, confirmation_ref: &str) -> Result<OrderState, ProcessError> {
		let payload =
			Self::payload(id).with_header(PAYMENT_CONFIRMATION_HEADER, confirmation_ref);
		self.send(id, OrderEvent::Pay, payload).await
	}

	/// Marks a paid order as fulfilled.
	pub async fn fulfill(&self, id: OrderId) -> Result<OrderState, ProcessError> {
		self.send(id, OrderEvent::Fulfill, Self::payload(id)).await
	}

	/// Cancels an order that has not been fulfilled.
	pub async fn cancel(&self, id: OrderId) -> Result<OrderState, ProcessError> {
		self.send(id, OrderEvent::Cancel, Self::payload(id)).await
	}

	fn payload(id: OrderId) -> EventPayload {
		EventPayload::new().with_header(ENTITY_ID_HEADER, id.to_string())
	}

	#[instrument(skip_all, fields(service = %self.service_id, order_id = %id, event = %event))]
	async fn send(
		&self,
		id: OrderId,
		event: OrderEvent,
		payload: EventPayload,
	) -> Result<OrderState, ProcessError> {
		let state = self.machine.process(&id.to_string(), event, payload).await?;
		tracing::info!(state = %state, "Processed event");
		Ok(state)
	}
}
