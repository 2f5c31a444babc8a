//! In-memory storage backend.
//!
//! Nothing survives a restart, which suits tests and single-process deployments.
//! Every mutation goes through [`MemoryStorage::commit`] and runs under the map's
//! write lock, so readers never observe half of a batch.

use crate::{Precondition, StorageError, StorageInterface, WriteBatch, WriteOp};
use async_trait::async_trait;
use lifecycle_types::{ConfigSchema, Schema, ValidationError};
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::RwLock;

/// Name of this implementation in `storage.implementations`.
pub const NAME: &str = "memory";

/// Keys in a `BTreeMap` so prefix listings come out sorted.
#[derive(Default)]
pub struct MemoryStorage {
	entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.entries
			.read()
			.await
			.get(key)
			.cloned()
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.commit(WriteBatch::new().put(key, value)).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.commit(WriteBatch::new().delete(key)).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.entries.read().await.contains_key(key))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let entries = self.entries.read().await;
		Ok(entries
			.range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
			.map(|(key, _)| key)
			.take_while(|key| key.starts_with(prefix))
			.cloned()
			.collect())
	}

	async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
		let mut entries = self.entries.write().await;

		for precondition in &batch.preconditions {
			let current = entries.get(precondition.key()).map(Vec::as_slice);
			if !precondition.holds(current) {
				return Err(StorageError::PreconditionFailed(describe(precondition)));
			}
		}

		for op in batch.ops {
			match op {
				WriteOp::Put { key, value } => {
					entries.insert(key, value);
				},
				WriteOp::Delete { key } => {
					entries.remove(&key);
				},
			}
		}
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

/// Human-readable reason a precondition failed.
pub(crate) fn describe(precondition: &Precondition) -> String {
	match precondition {
		Precondition::Matches { key, .. } => format!("{} was modified concurrently", key),
		Precondition::Absent { key } => format!("{} already exists", key),
	}
}

/// The memory backend takes no settings; its section only has to be a table.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Creates a memory backend from its (empty) configuration section.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}
