//! Per-entity mutual exclusion.

use super::PersistenceError;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Table of async mutexes keyed by entity id.
///
/// Entries are created on first use and removed again once no caller holds or
/// waits for them, so the table only grows with the number of entities that
/// are currently in flight.
pub struct EntityLocks {
	locks: DashMap<String, Arc<Mutex<()>>>,
	timeout: Duration,
}

impl EntityLocks {
	pub fn new(timeout: Duration) -> Self {
		Self {
			locks: DashMap::new(),
			timeout,
		}
	}

	/// Waits up to the configured timeout for exclusive access to `entity_id`.
	///
	/// The guard owns a handle to the table, so it can be moved into a task
	/// that outlives the caller.
	pub async fn acquire(
		self: &Arc<Self>,
		entity_id: &str,
	) -> Result<EntityLockGuard, PersistenceError> {
		// Clone out of the map so no shard lock is held across the await
		let lock = Arc::clone(&self.locks.entry(entity_id.to_string()).or_default());

		// Bound outside the match so the pending lock future, and the Arc it
		// owns, is dropped before the idle check below
		let acquired = tokio::time::timeout(self.timeout, lock.lock_owned()).await;

		match acquired {
			Ok(guard) => Ok(EntityLockGuard {
				locks: Arc::clone(self),
				entity_id: entity_id.to_string(),
				guard: Some(guard),
			}),
			Err(_) => {
				self.release_if_idle(entity_id);
				Err(PersistenceError::LockTimeout {
					timeout_ms: self.timeout.as_millis() as u64,
				})
			},
		}
	}

	/// Number of entities with an entry in the table.
	pub fn active(&self) -> usize {
		self.locks.len()
	}

	fn release_if_idle(&self, entity_id: &str) {
		self.locks
			.remove_if(entity_id, |_, lock| Arc::strong_count(lock) == 1);
	}
}

/// Exclusive access to one entity; released on drop.
pub struct EntityLockGuard {
	locks: Arc<EntityLocks>,
	entity_id: String,
	guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for EntityLockGuard {
	fn drop(&mut self) {
		// Release the mutex first so its Arc no longer counts as a holder
		drop(self.guard.take());
		self.locks.release_if_idle(&self.entity_id);
	}
}
