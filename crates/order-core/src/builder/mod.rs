//! Builder for the order service.
//!
//! Instantiates the configured storage backend through its registered
//! factory, builds the order transition table, attaches the configured
//! listeners and wires everything into an [`OrderService`].

use crate::engine::event_bus::{EventBus, EventBusListener};
use crate::engine::OrderService;
use crate::listener::{AuditLogListener, StateChangeListener};
use crate::machine::MachineFactory;
use crate::persistence::{with_timeout, PersistenceError, PersistentStateMachine};
use crate::state::{order_transition_table, OrderRepository};
use order_config::Config;
use order_storage::{StorageError, StorageInterface, StorageService};
use order_types::{OrderEvent, OrderState, StorageKey};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Capacity of the state-change broadcast channel.
const EVENT_BUS_CAPACITY: usize = 1000;

/// Errors that can occur while building the order service.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Storage unavailable: {0}")]
	Storage(String),
}

/// Factory functions available to the builder, keyed by implementation name.
pub struct OrderFactories<SF> {
	pub storage_factories: HashMap<String, SF>,
}

/// Builds an [`OrderService`] from configuration.
pub struct OrderServiceBuilder {
	config: Config,
	listeners: Vec<Arc<dyn StateChangeListener<OrderState, OrderEvent>>>,
}

impl OrderServiceBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			listeners: Vec::new(),
		}
	}

	/// Registers an additional listener, notified after the built-in ones.
	pub fn with_listener(
		mut self,
		listener: Arc<dyn StateChangeListener<OrderState, OrderEvent>>,
	) -> Self {
		self.listeners.push(listener);
		self
	}

	/// Builds the service, failing fast on any configuration problem.
	pub async fn build<SF>(self, factories: OrderFactories<SF>) -> Result<OrderService, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let service = &self.config.service;

		// Only the primary backend is instantiated
		let primary = &self.config.storage.primary;
		let storage_config = self.config.storage.implementations.get(primary).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' not found in implementations",
				primary
			))
		})?;
		let factory = factories.storage_factories.get(primary).ok_or_else(|| {
			BuilderError::Config(format!("Unknown storage implementation '{}'", primary))
		})?;
		let backend = factory(storage_config).map_err(|e| {
			tracing::error!(
				component = "storage",
				implementation = %primary,
				error = %e,
				"Failed to create storage implementation"
			);
			BuilderError::Config(format!(
				"Failed to create storage implementation '{}': {}",
				primary, e
			))
		})?;
		tracing::info!(component = "storage", implementation = %primary, "Loaded");

		let storage = Arc::new(StorageService::new(backend));
		let reachable = with_timeout(service.persistence_timeout(), "probe", async {
			storage
				.exists(StorageKey::Sequences.as_str(), "orders")
				.await
				.map_err(|e| PersistenceError::Storage(e.to_string()))
		})
		.await
		.map_err(|e| {
			tracing::error!(component = "storage", error = %e, "Storage probe failed");
			BuilderError::Storage(e.to_string())
		})?;
		tracing::debug!(component = "storage", existing_data = reachable, "Storage ready");

		let table = order_transition_table().map_err(|e| {
			tracing::error!(component = "engine", error = %e, "Invalid transition table");
			BuilderError::Config(e.to_string())
		})?;

		let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
		let mut listeners: Vec<Arc<dyn StateChangeListener<OrderState, OrderEvent>>> =
			vec![Arc::new(EventBusListener::new(event_bus.clone()))];
		if service.audit_log {
			listeners.push(Arc::new(AuditLogListener));
		}
		listeners.extend(self.listeners);
		tracing::info!(
			component = "engine",
			transitions = table.len(),
			listeners = listeners.len(),
			"Loaded"
		);

		let repository = Arc::new(OrderRepository::new(storage));
		let machine = PersistentStateMachine::new(
			MachineFactory::new(table, listeners),
			repository.clone(),
			service.persistence_timeout(),
			service.lock_timeout(),
		);

		Ok(OrderService::new(
			service.id.clone(),
			repository,
			machine,
			event_bus,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::listener::{ListenerError, StateChange};
	use order_config::ConfigBuilder;
	use order_storage::implementations::memory;
	use std::sync::atomic::{AtomicUsize, Ordering};

	type Factory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

	fn memory_only() -> OrderFactories<Factory> {
		OrderFactories {
			storage_factories: HashMap::from([(
				"memory".to_string(),
				memory::create_storage as Factory,
			)]),
		}
	}

	#[derive(Default)]
	struct Counter(AtomicUsize);

	impl StateChangeListener<OrderState, OrderEvent> for Counter {
		fn name(&self) -> &str {
			"counter"
		}

		fn on_state_change(
			&self,
			_change: &StateChange<OrderState, OrderEvent>,
		) -> Result<(), ListenerError> {
			self.0.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	#[tokio::test]
	async fn test_unknown_factory_rejected() {
		let config = ConfigBuilder::new()
			.storage("redis", toml::Value::Table(toml::Table::new()))
			.build();

		let result = OrderServiceBuilder::new(config).build(memory_only()).await;
		assert!(matches!(result, Err(BuilderError::Config(ref msg)) if msg.contains("redis")));
	}

	#[tokio::test]
	async fn test_invalid_backend_config_rejected() {
		let mut table = toml::Table::new();
		table.insert("storage_path".into(), "/tmp".into());
		let config = ConfigBuilder::new()
			.storage("memory", toml::Value::Table(table))
			.build();

		let result = OrderServiceBuilder::new(config).build(memory_only()).await;
		assert!(matches!(result, Err(BuilderError::Config(ref msg)) if msg.contains("Unknown field")));
	}

	#[tokio::test]
	async fn test_extra_listener_notified() {
		let counter = Arc::new(Counter::default());
		let service = OrderServiceBuilder::new(ConfigBuilder::new().audit_log(false).build())
			.with_listener(counter.clone())
			.build(memory_only())
			.await
			.unwrap();
		assert_eq!(service.service_id(), "test-orders");

		let order = service
			.create(chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
			.await
			.unwrap();
		service.cancel(order.id).await.unwrap();
		let _ = service.pay(order.id, "late").await;

		assert_eq!(counter.0.load(Ordering::SeqCst), 1);
	}
}
