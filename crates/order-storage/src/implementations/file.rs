//! File-based storage backend.
//!
//! Each key is stored as its own file under the configured directory. Files
//! start with a small header so truncated or foreign files are detected on
//! read instead of being handed to the deserializer.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use order_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use std::path::PathBuf;
use tokio::fs;

#[allow(clippy::doc_nested_refdefs)]
/// Fixed-size file header.
///
/// Binary layout (16 bytes total):
/// - [0-3]: Magic bytes "ORDS"
/// - [4-5]: Version (u16, little-endian)
/// - [6-9]: Payload length (u32, little-endian)
/// - [10-15]: Reserved, zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileHeader {
	version: u16,
	payload_len: u32,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"ORDS";
	const VERSION: u16 = 1;
	const SIZE: usize = 16;

	fn for_payload(payload: &[u8]) -> Result<Self, StorageError> {
		let payload_len = u32::try_from(payload.len())
			.map_err(|_| StorageError::Backend("Value too large for file storage".into()))?;
		Ok(Self {
			version: Self::VERSION,
			payload_len,
		})
	}

	fn encode(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..10].copy_from_slice(&self.payload_len.to_le_bytes());
		bytes
	}

	/// Splits a file into its header and payload, checking both.
	fn decode(data: &[u8]) -> Result<(Self, &[u8]), StorageError> {
		let (header, payload) = data
			.split_at_checked(Self::SIZE)
			.ok_or_else(|| StorageError::Backend("File too small for header".into()))?;

		if &header[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unrecognized file format".into()));
		}

		let version = u16::from_le_bytes([header[4], header[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		let payload_len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
		if payload.len() != payload_len as usize {
			return Err(StorageError::Backend(format!(
				"Truncated file: header declares {} bytes, found {}",
				payload_len,
				payload.len()
			)));
		}

		Ok((
			Self {
				version,
				payload_len,
			},
			payload,
		))
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Maps a key to a filesystem-safe path, e.g. `orders:7` → `orders_7.bin`.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', '\\', ':'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);
		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			},
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let (_, payload) = FileHeader::decode(&data).inspect_err(|e| {
			tracing::warn!(path = %path.display(), error = %e, "Rejected stored file");
		})?;
		Ok(payload.to_vec())
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let header = FileHeader::for_payload(&value)?;
		let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
		file_data.extend_from_slice(&header.encode());
		file_data.extend_from_slice(&value);

		// Write to a sibling temp file and rename so readers never see a partial value
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, file_data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		tracing::trace!(key, bytes = value.len(), "Wrote file");
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.get_file_path(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}
}

/// Configuration schema for [`FileStorage`].
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let storage_path = Field::new("storage_path", FieldType::String).with_validator(|value| {
			match value.as_str() {
				Some(path) if !path.trim().is_empty() => Ok(()),
				_ => Err("storage_path cannot be empty".to_string()),
			}
		});
		Schema::new(vec![], vec![storage_path]).validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for data files (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

/// Registry for the file backend.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
