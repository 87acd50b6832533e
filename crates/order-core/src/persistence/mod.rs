//! Rehydration and persistence bridge.
//!
//! [`PersistentStateMachine`] wraps every event in the same cycle: take the
//! entity's lock, load its stored state, rebuild a machine at that state,
//! apply the event and write the new state back. Storage is the only source of
//! truth; no machine outlives a single call.

pub mod locks;

use crate::machine::{EventPayload, MachineFactory, RejectedEvent};
use async_trait::async_trait;
use locks::{EntityLockGuard, EntityLocks};
use order_types::Vocabulary;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, Instrument};

/// Failures of the storage side of the bridge. All of them are retryable.
#[derive(Debug, Error)]
pub enum PersistenceError {
	#[error("Persistence {operation} timed out after {timeout_ms}ms")]
	Timeout {
		operation: &'static str,
		timeout_ms: u64,
	},
	#[error("Timed out after {timeout_ms}ms waiting for the entity lock")]
	LockTimeout { timeout_ms: u64 },
	#[error("Stored state changed concurrently: expected {expected}, found {actual}")]
	Conflict {
		expected: &'static str,
		actual: &'static str,
	},
	#[error("Storage error: {0}")]
	Storage(String),
}

/// Outcome of processing an event that did not produce a new state.
#[derive(Debug, Error)]
pub enum ProcessError {
	#[error("Entity not found: {0}")]
	EntityNotFound(String),
	#[error(transparent)]
	Rejected(#[from] RejectedEvent),
	#[error("Persistence error: {0}")]
	Persistence(#[from] PersistenceError),
}

impl ProcessError {
	/// Whether repeating the same call may succeed.
	///
	/// Only persistence failures qualify; a rejection or a missing entity
	/// will be rejected again.
	pub fn is_retryable(&self) -> bool {
		matches!(self, ProcessError::Persistence(_))
	}
}

/// Where the bridge reads and writes entity state.
#[async_trait]
pub trait StateRepository<S>: Send + Sync {
	/// Returns the stored state, or `None` if the entity does not exist.
	async fn load_state(&self, entity_id: &str) -> Result<Option<S>, PersistenceError>;

	/// Stores `next` if the stored state is still `previous`.
	///
	/// Fails with [`PersistenceError::Conflict`] otherwise.
	async fn persist_state(&self, entity_id: &str, previous: S, next: S)
		-> Result<(), PersistenceError>;
}

/// Bounds a persistence call by `timeout`.
pub(crate) async fn with_timeout<T, F>(
	timeout: Duration,
	operation: &'static str,
	future: F,
) -> Result<T, PersistenceError>
where
	F: Future<Output = Result<T, PersistenceError>>,
{
	tokio::time::timeout(timeout, future)
		.await
		.map_err(|_| PersistenceError::Timeout {
			operation,
			timeout_ms: timeout.as_millis() as u64,
		})?
}

/// A state machine whose state lives in a [`StateRepository`].
pub struct PersistentStateMachine<S, E> {
	factory: MachineFactory<S, E>,
	repository: Arc<dyn StateRepository<S>>,
	locks: Arc<EntityLocks>,
	persistence_timeout: Duration,
}

impl<S: Vocabulary, E: Vocabulary> PersistentStateMachine<S, E> {
	pub fn new(
		factory: MachineFactory<S, E>,
		repository: Arc<dyn StateRepository<S>>,
		persistence_timeout: Duration,
		lock_timeout: Duration,
	) -> Self {
		Self {
			factory,
			repository,
			locks: Arc::new(EntityLocks::new(lock_timeout)),
			persistence_timeout,
		}
	}

	pub fn factory(&self) -> &MachineFactory<S, E> {
		&self.factory
	}

	pub fn persistence_timeout(&self) -> Duration {
		self.persistence_timeout
	}

	/// Number of entities currently being processed.
	pub fn in_flight(&self) -> usize {
		self.locks.active()
	}

	/// Processes one event for one entity and returns the new state.
	///
	/// Calls for the same entity are serialized. A rejected event writes
	/// nothing. A persistence failure after a successful transition leaves the
	/// stored state as it was; listeners will already have been notified.
	///
	/// A persist that times out is not cancelled. The entity stays locked until
	/// the write completes, so the next caller loads whatever it left behind.
	#[instrument(skip_all, fields(entity_id = %entity_id, event = %event))]
	pub async fn process(
		&self,
		entity_id: &str,
		event: E,
		payload: EventPayload,
	) -> Result<S, ProcessError> {
		let guard = self.locks.acquire(entity_id).await?;
		tracing::debug!("Acquired entity lock");

		let current = with_timeout(
			self.persistence_timeout,
			"load",
			self.repository.load_state(entity_id),
		)
		.await?
		.ok_or_else(|| ProcessError::EntityNotFound(entity_id.to_string()))?;

		let mut machine = self.factory.rehydrate(entity_id, current);
		tracing::debug!(state = %current, "Rehydrated machine");

		let next = machine.apply(event, &payload).inspect_err(|rejected| {
			tracing::warn!(state = %current, reason = %rejected.reason, "Rejected event");
		})?;

		self.persist(entity_id, current, next, guard).await?;

		tracing::debug!(
			from = %current,
			to = %next,
			headers = ?payload.headers(),
			"Persisted transition"
		);
		Ok(next)
	}

	/// Writes `next` on a task that owns the entity lock.
	async fn persist(
		&self,
		entity_id: &str,
		current: S,
		next: S,
		guard: EntityLockGuard,
	) -> Result<(), PersistenceError> {
		let repository = Arc::clone(&self.repository);
		let entity_id = entity_id.to_string();
		let write = tokio::spawn(
			async move {
				let result = repository.persist_state(&entity_id, current, next).await;
				drop(guard);
				result
			}
			.in_current_span(),
		);

		with_timeout(self.persistence_timeout, "persist", async {
			write
				.await
				.map_err(|e| PersistenceError::Storage(format!("Persist task failed: {}", e)))?
		})
		.await
	}
}
