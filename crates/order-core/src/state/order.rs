//! Order lifecycle definition and persistence.
//!
//! Orders move SUBMITTED -> PAID -> FULFILLED, and can be cancelled from
//! SUBMITTED or PAID. FULFILLED and CANCELLED are terminal.

use crate::machine::{ConfigurationError, TransitionContext, TransitionTable, ENTITY_ID_HEADER};
use crate::persistence::{PersistenceError, StateRepository};
use async_trait::async_trait;
use chrono::NaiveDate;
use order_storage::{StorageError, StorageService};
use order_types::{OrderEvent, OrderId, OrderRecord, OrderState, StorageKey, Vocabulary};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Sequence record the order ids are allocated from.
const ORDER_SEQUENCE: &str = "orders";

/// Builds the order lifecycle table.
///
/// | source    | event   | target    | action                    |
/// |-----------|---------|-----------|---------------------------|
/// | SUBMITTED | PAY     | PAID      |                           |
/// | PAID      | FULFILL | FULFILLED | record payment processing |
/// | SUBMITTED | CANCEL  | CANCELLED |                           |
/// | PAID      | CANCEL  | CANCELLED |                           |
pub fn order_transition_table() -> Result<TransitionTable<OrderState, OrderEvent>, ConfigurationError>
{
	TransitionTable::builder(OrderState::all(), OrderEvent::all())
		.initial(OrderState::Submitted)
		.terminal(OrderState::Fulfilled)
		.terminal(OrderState::Cancelled)
		.on_entry(OrderState::Submitted, remember_order_id)
		.register(OrderState::Submitted, OrderEvent::Pay, OrderState::Paid)
		.register(OrderState::Paid, OrderEvent::Fulfill, OrderState::Fulfilled)
		.action(record_payment_processing)
		.register(OrderState::Submitted, OrderEvent::Cancel, OrderState::Cancelled)
		.register(OrderState::Paid, OrderEvent::Cancel, OrderState::Cancelled)
		.build()
}

/// Stores the order id in extended state.
fn remember_order_id(context: &mut TransitionContext<'_>) {
	let order_id = context
		.header(ENTITY_ID_HEADER)
		.unwrap_or(context.entity_id)
		.to_string();
	tracing::debug!(order_id = %order_id, "Order submitted");
	context
		.extended
		.insert(ENTITY_ID_HEADER.to_string(), order_id.into());
}

fn record_payment_processing(context: &mut TransitionContext<'_>) {
	tracing::info!(order_id = %context.entity_id, "Processing payment");
	context.extended.insert(
		ENTITY_ID_HEADER.to_string(),
		context.entity_id.to_string().into(),
	);
}

fn now_secs() -> Result<u64, PersistenceError> {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_secs())
		.map_err(|e| PersistenceError::Storage(format!("Clock error: {}", e)))
}

fn storage_error(e: StorageError) -> PersistenceError {
	PersistenceError::Storage(e.to_string())
}

/// Reads and writes [`OrderRecord`]s.
pub struct OrderRepository {
	storage: Arc<StorageService>,
	/// Serializes id allocation.
	sequence: Mutex<()>,
}

impl OrderRepository {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			sequence: Mutex::new(()),
		}
	}

	/// Allocates the next id and stores a new record in `state`.
	pub async fn create(
		&self,
		created_on: NaiveDate,
		state: OrderState,
	) -> Result<OrderRecord, PersistenceError> {
		let id = self.next_id().await?;
		let record = OrderRecord {
			id,
			created_on,
			updated_at: now_secs()?,
			state,
		};
		self.save(record).await
	}

	pub async fn load(&self, id: &str) -> Result<Option<OrderRecord>, PersistenceError> {
		match self.storage.retrieve(StorageKey::Orders.as_str(), id).await {
			Ok(record) => Ok(Some(record)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(storage_error(e)),
		}
	}

	/// Writes a record as-is, creating or replacing it.
	///
	/// State changes of existing orders go through
	/// [`persist_state`](StateRepository::persist_state) instead.
	pub async fn save(&self, record: OrderRecord) -> Result<OrderRecord, PersistenceError> {
		self.storage
			.store(StorageKey::Orders.as_str(), &record.storage_id(), &record)
			.await
			.map_err(storage_error)?;
		Ok(record)
	}

	async fn next_id(&self) -> Result<OrderId, PersistenceError> {
		let _sequence = self.sequence.lock().await;
		let last: OrderId = match self
			.storage
			.retrieve(StorageKey::Sequences.as_str(), ORDER_SEQUENCE)
			.await
		{
			Ok(last) => last,
			Err(StorageError::NotFound) => 0,
			Err(e) => return Err(storage_error(e)),
		};

		let next = last + 1;
		self.storage
			.store(StorageKey::Sequences.as_str(), ORDER_SEQUENCE, &next)
			.await
			.map_err(storage_error)?;
		Ok(next)
	}
}

#[async_trait]
impl StateRepository<OrderState> for OrderRepository {
	async fn load_state(&self, entity_id: &str) -> Result<Option<OrderState>, PersistenceError> {
		Ok(self.load(entity_id).await?.map(|record| record.state))
	}

	async fn persist_state(
		&self,
		entity_id: &str,
		previous: OrderState,
		next: OrderState,
	) -> Result<(), PersistenceError> {
		let mut record = self.load(entity_id).await?.ok_or_else(|| {
			PersistenceError::Storage(format!("Order {} disappeared before persist", entity_id))
		})?;
		if record.state != previous {
			return Err(PersistenceError::Conflict {
				expected: previous.name(),
				actual: record.state.name(),
			});
		}

		record.state = next;
		record.updated_at = now_secs()?;
		self.storage
			.update(StorageKey::Orders.as_str(), entity_id, &record)
			.await
			.map_err(storage_error)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::machine::{EventPayload, MachineFactory, RejectionReason};
	use order_storage::implementations::file::FileStorage;
	use order_storage::implementations::memory::MemoryStorage;
	use order_storage::StorageInterface;
	use tempfile::TempDir;

	mockall::mock! {
		pub Backend {}

		#[async_trait]
		impl StorageInterface for Backend {
			async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;
			async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;
			async fn delete(&self, key: &str) -> Result<(), StorageError>;
			async fn exists(&self, key: &str) -> Result<bool, StorageError>;
		}
	}

	fn date() -> NaiveDate {
		NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
	}

	fn memory_repository() -> OrderRepository {
		OrderRepository::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	#[test]
	fn test_table_shape() {
		let table = order_transition_table().unwrap();

		assert_eq!(table.initial_state(), OrderState::Submitted);
		assert_eq!(table.len(), 4);
		assert!(table.is_terminal(OrderState::Fulfilled));
		assert!(table.is_terminal(OrderState::Cancelled));
		for event in OrderEvent::all() {
			assert!(table.lookup(OrderState::Fulfilled, *event).is_none());
			assert!(table.lookup(OrderState::Cancelled, *event).is_none());
		}
		assert!(table.lookup(OrderState::Submitted, OrderEvent::Fulfill).is_none());
	}

	#[test]
	fn test_fulfill_records_order_id() {
		let factory = MachineFactory::new(order_transition_table().unwrap(), Vec::new());

		let mut machine = factory.rehydrate("12", OrderState::Paid);
		machine
			.apply(OrderEvent::Fulfill, &EventPayload::new())
			.unwrap();
		assert_eq!(machine.extended_state()[ENTITY_ID_HEADER], "12");

		let created = factory.create("13");
		assert_eq!(created.extended_state()[ENTITY_ID_HEADER], "13");
	}

	#[test]
	fn test_cancel_after_fulfill_rejected() {
		let factory = MachineFactory::new(order_transition_table().unwrap(), Vec::new());
		let mut machine = factory.rehydrate("1", OrderState::Fulfilled);

		let rejected = machine
			.apply(OrderEvent::Cancel, &EventPayload::new())
			.unwrap_err();
		assert_eq!(rejected.reason, RejectionReason::NoMatchingTransition);
	}

	#[tokio::test]
	async fn test_ids_are_sequential() {
		let repository = memory_repository();

		let first = repository.create(date(), OrderState::Submitted).await.unwrap();
		let second = repository.create(date(), OrderState::Submitted).await.unwrap();

		assert_eq!(first.id, 1);
		assert_eq!(second.id, 2);
		assert_eq!(repository.load("2").await.unwrap(), Some(second));
		assert_eq!(repository.load("3").await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_save_of_loaded_record_is_noop() {
		let repository = memory_repository();
		let created = repository.create(date(), OrderState::Paid).await.unwrap();

		let loaded = repository.load("1").await.unwrap().unwrap();
		let saved = repository.save(loaded).await.unwrap();
		assert_eq!(saved, created);
		assert_eq!(repository.load("1").await.unwrap(), Some(created));
	}

	#[tokio::test]
	async fn test_conditional_persist() {
		let repository = memory_repository();
		let record = repository.create(date(), OrderState::Submitted).await.unwrap();
		let id = record.storage_id();

		repository
			.persist_state(&id, OrderState::Submitted, OrderState::Paid)
			.await
			.unwrap();
		assert_eq!(
			repository.load_state(&id).await.unwrap(),
			Some(OrderState::Paid)
		);

		let conflict = repository
			.persist_state(&id, OrderState::Submitted, OrderState::Cancelled)
			.await
			.unwrap_err();
		assert!(matches!(
			conflict,
			PersistenceError::Conflict {
				expected: "SUBMITTED",
				actual: "PAID",
			}
		));
		assert_eq!(
			repository.load_state(&id).await.unwrap(),
			Some(OrderState::Paid)
		);
	}

	#[tokio::test]
	async fn test_state_survives_file_reopen() {
		let dir = TempDir::new().unwrap();
		let open = || {
			OrderRepository::new(Arc::new(StorageService::new(Box::new(FileStorage::new(
				dir.path().to_path_buf(),
			)))))
		};

		let record = open().create(date(), OrderState::Submitted).await.unwrap();
		open()
			.persist_state(&record.storage_id(), OrderState::Submitted, OrderState::Paid)
			.await
			.unwrap();

		let reopened = open();
		let loaded = reopened.load("1").await.unwrap().unwrap();
		assert_eq!(loaded.state, OrderState::Paid);
		assert_eq!(loaded.created_on, date());
		assert_eq!(reopened.create(date(), OrderState::Submitted).await.unwrap().id, 2);
	}

	#[tokio::test]
	async fn test_unknown_stored_state_is_error() {
		let mut backend = MockBackend::new();
		backend.expect_get_bytes().returning(|_| {
			Ok(br#"{"id":1,"created_on":"2024-05-17","updated_at":0,"state":"SHIPPED"}"#.to_vec())
		});
		let repository = OrderRepository::new(Arc::new(StorageService::new(Box::new(backend))));

		let err = repository.load_state("1").await.unwrap_err();
		assert!(matches!(err, PersistenceError::Storage(ref msg) if msg.contains("SHIPPED")));
	}

	#[tokio::test]
	async fn test_backend_write_failure_surfaces() {
		let stored = serde_json::to_vec(&OrderRecord {
			id: 1,
			created_on: date(),
			updated_at: 0,
			state: OrderState::Submitted,
		})
		.unwrap();

		let mut backend = MockBackend::new();
		backend
			.expect_get_bytes()
			.returning(move |_| Ok(stored.clone()));
		backend.expect_exists().returning(|_| Ok(true));
		backend
			.expect_set_bytes()
			.times(1)
			.returning(|_, _| Err(StorageError::Backend("disk full".into())));
		let repository = OrderRepository::new(Arc::new(StorageService::new(Box::new(backend))));

		let err = repository
			.persist_state("1", OrderState::Submitted, OrderState::Paid)
			.await
			.unwrap_err();
		assert!(matches!(err, PersistenceError::Storage(ref msg) if msg.contains("disk full")));
	}
}
