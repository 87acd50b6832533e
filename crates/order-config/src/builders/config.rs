//! Configuration builder for tests and local development.

use crate::{Config, ServiceConfig, StorageConfig};
use std::collections::HashMap;

/// Fluent builder for [`Config`] with defaults suitable for tests.
///
/// The default configuration uses the in-memory storage backend and short
/// timeouts so a wedged test fails quickly.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	audit_log: bool,
	storage_primary: String,
	storage_implementations: HashMap<String, toml::Value>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			audit_log: true,
			storage_primary: "memory".to_string(),
			storage_implementations: HashMap::from([(
				"memory".to_string(),
				toml::Value::Table(toml::Table::new()),
			)]),
		}
	}

	pub fn audit_log(mut self, enabled: bool) -> Self {
		self.audit_log = enabled;
		self
	}

	/// Selects the primary storage backend and registers its table.
	pub fn storage(mut self, primary: impl Into<String>, table: toml::Value) -> Self {
		let primary = primary.into();
		self.storage_implementations.insert(primary.clone(), table);
		self.storage_primary = primary;
		self
	}

	pub fn build(self) -> Config {
		Config {
			service: ServiceConfig {
				id: "test-orders".to_string(),
				persistence_timeout_ms: 1_000,
				lock_timeout_ms: 2_000,
				audit_log: self.audit_log,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations: self.storage_implementations,
			},
		}
	}
}
