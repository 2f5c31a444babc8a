//! Storage module for the order lifecycle system.
//!
//! This module provides the persistence seam of the lifecycle engine. A backend
//! implements [`StorageInterface`], a small key/value contract with one atomic
//! primitive ([`StorageInterface::commit`]); [`StorageService`] layers typed JSON
//! access on top and implements the three collaborator stores the core consumes:
//! [`OrderStore`], [`HistoryStore`] and [`TimeoutConfigStore`].

use async_trait::async_trait;
use lifecycle_types::ConfigSchema;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod history;
pub mod orders;
pub mod timeouts;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub use history::HistoryStore;
pub use orders::{IdleQuery, OrderStore, StatusUpdate};
pub use timeouts::TimeoutConfigStore;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// A guarded commit found its preconditions violated and wrote nothing.
	#[error("Precondition failed: {0}")]
	PreconditionFailed(String),
	/// An identifier cannot be used as part of a storage key.
	#[error("Invalid key component: {0}")]
	InvalidKey(String),
}

/// Condition that must hold for a [`WriteBatch`] to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
	/// The key must currently hold exactly these bytes.
	Matches { key: String, expected: Vec<u8> },
	/// The key must not exist.
	Absent { key: String },
}

impl Precondition {
	pub fn key(&self) -> &str {
		match self {
			Precondition::Matches { key, .. } | Precondition::Absent { key } => key,
		}
	}

	/// Evaluates the condition against the key's current value.
	pub fn holds(&self, current: Option<&[u8]>) -> bool {
		match (self, current) {
			(Precondition::Matches { expected, .. }, Some(current)) => expected == current,
			(Precondition::Matches { .. }, None) => false,
			(Precondition::Absent { .. }, current) => current.is_none(),
		}
	}
}

/// A single write within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
	Put { key: String, value: Vec<u8> },
	Delete { key: String },
}

/// A set of writes applied all-or-nothing, guarded by preconditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
	pub preconditions: Vec<Precondition>,
	pub ops: Vec<WriteOp>,
}

impl WriteBatch {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn require(mut self, precondition: Precondition) -> Self {
		self.preconditions.push(precondition);
		self
	}

	pub fn put(mut self, key: impl Into<String>, value: Vec<u8>) -> Self {
		self.ops.push(WriteOp::Put {
			key: key.into(),
			value,
		});
		self
	}

	pub fn delete(mut self, key: impl Into<String>) -> Self {
		self.ops.push(WriteOp::Delete { key: key.into() });
		self
	}
}

/// Trait defining the low-level interface for storage backends.
///
/// Every backend must make [`commit`](StorageInterface::commit) atomic: either all
/// preconditions hold and all writes become visible together, or nothing changes.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, overwriting any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key. Missing keys are not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists every key starting with `prefix`, sorted ascending.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	/// Applies a guarded batch atomically.
	async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::NAME, file::create_storage as StorageFactory),
		(memory::NAME, memory::create_storage as StorageFactory),
	]
}

/// Longest tenant, order or merchant id accepted in a storage key.
///
/// The longest composite key (a history row) then stays under 125 bytes, which
/// keeps every backend's encoded key within common file name limits.
pub const MAX_KEY_COMPONENT_LEN: usize = 48;

/// Rejects identifiers that would corrupt composite keys.
pub(crate) fn check_key_component(kind: &str, value: &str) -> Result<(), StorageError> {
	if value.is_empty() || value.contains(':') {
		return Err(StorageError::InvalidKey(format!(
			"{} '{}' must be non-empty and must not contain ':'",
			kind, value
		)));
	}
	if value.len() > MAX_KEY_COMPONENT_LEN {
		return Err(StorageError::InvalidKey(format!(
			"{} is {} bytes, the limit is {}",
			kind,
			value.len(),
			MAX_KEY_COMPONENT_LEN
		)));
	}
	Ok(())
}

/// High-level storage service that provides typed operations.
///
/// The StorageService wraps a low-level storage backend and provides
/// convenient methods for storing and retrieving typed data with
/// automatic JSON serialization.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Serializes a value the way every typed helper stores it.
	pub fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
		serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
		serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Stores a serializable value, overwriting any previous value.
	pub async fn store<T: Serialize>(&self, key: &str, data: &T) -> Result<(), StorageError> {
		self.backend.set_bytes(key, Self::encode(data)?).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(&self, key: &str) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(key).await?;
		Self::decode(&bytes)
	}

	/// Retrieves a value along with the exact bytes it was decoded from.
	///
	/// The bytes are what a later [`Precondition::Matches`] compares against.
	pub async fn retrieve_with_raw<T: DeserializeOwned>(
		&self,
		key: &str,
	) -> Result<(T, Vec<u8>), StorageError> {
		let bytes = self.backend.get_bytes(key).await?;
		let value = Self::decode(&bytes)?;
		Ok((value, bytes))
	}

	/// Retrieves a value, mapping a missing key to `None`.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		key: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(key).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Removes a value from storage.
	pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
		self.backend.delete(key).await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		self.backend.exists(key).await
	}

	/// Lists keys under a prefix.
	pub async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		self.backend.list_keys(prefix).await
	}

	/// Retrieves every value under a prefix, in key order.
	///
	/// Keys deleted between listing and reading are skipped.
	pub async fn list<T: DeserializeOwned>(
		&self,
		prefix: &str,
	) -> Result<Vec<(String, T)>, StorageError> {
		let keys = self.backend.list_keys(prefix).await?;
		let mut values = Vec::with_capacity(keys.len());
		for key in keys {
			match self.backend.get_bytes(&key).await {
				Ok(bytes) => values.push((key, Self::decode(&bytes)?)),
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			}
		}
		Ok(values)
	}

	/// Applies a guarded batch atomically.
	pub async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
		self.backend.commit(batch).await
	}

	/// Returns the configuration schema of the backend.
	pub fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.backend.config_schema()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Item {
		name: String,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_typed_round_trip_and_listing() {
		let storage = service();
		storage
			.store("items:b", &Item { name: "b".into() })
			.await
			.unwrap();
		storage
			.store("items:a", &Item { name: "a".into() })
			.await
			.unwrap();
		storage
			.store("other:c", &Item { name: "c".into() })
			.await
			.unwrap();

		let items: Vec<(String, Item)> = storage.list("items:").await.unwrap();
		let names: Vec<_> = items.iter().map(|(_, item)| item.name.as_str()).collect();
		assert_eq!(names, vec!["a", "b"]);

		assert!(storage
			.retrieve_optional::<Item>("items:zzz")
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn test_commit_rejects_stale_bytes() {
		let storage = service();
		storage
			.store("items:a", &Item { name: "v1".into() })
			.await
			.unwrap();
		let (_, raw): (Item, _) = storage.retrieve_with_raw("items:a").await.unwrap();

		storage
			.store("items:a", &Item { name: "v2".into() })
			.await
			.unwrap();

		let batch = WriteBatch::new()
			.require(Precondition::Matches {
				key: "items:a".into(),
				expected: raw,
			})
			.put(
				"items:a",
				StorageService::encode(&Item { name: "v3".into() }).unwrap(),
			)
			.put(
				"items:b",
				StorageService::encode(&Item { name: "side".into() }).unwrap(),
			);

		let result = storage.commit(batch).await;
		assert!(matches!(result, Err(StorageError::PreconditionFailed(_))));

		let current: Item = storage.retrieve("items:a").await.unwrap();
		assert_eq!(current.name, "v2");
		assert!(!storage.exists("items:b").await.unwrap());
	}

	#[test]
	fn test_precondition_evaluation() {
		let matches = Precondition::Matches {
			key: "k".into(),
			expected: b"x".to_vec(),
		};
		assert!(matches.holds(Some(b"x")));
		assert!(!matches.holds(Some(b"y")));
		assert!(!matches.holds(None));

		let absent = Precondition::Absent { key: "k".into() };
		assert!(absent.holds(None));
		assert!(!absent.holds(Some(b"x")));
	}

	#[test]
	fn test_key_component_validation() {
		assert!(check_key_component("tenant", "t1").is_ok());
		assert!(check_key_component("tenant", "").is_err());
		assert!(matches!(
			check_key_component("order", "a:b"),
			Err(StorageError::InvalidKey(_))
		));
		assert!(check_key_component("order", &"o".repeat(MAX_KEY_COMPONENT_LEN)).is_ok());
		assert!(matches!(
			check_key_component("order", &"o".repeat(MAX_KEY_COMPONENT_LEN + 1)),
			Err(StorageError::InvalidKey(_))
		));
	}

	#[test]
	fn test_all_implementations_registered() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["file", "memory"]);
	}
}
