//! File-based storage backend implementation.
//!
//! Each key is stored as one file under the configured directory. File names are
//! the hex encoding of the key, so any key round-trips through the filesystem and
//! prefix listings can be answered from a directory scan. Keys whose encoded name
//! would exceed the usual 255 byte file name limit are rejected before any I/O.
//!
//! Mutations are serialized by an in-process mutex and an exclusive advisory lock
//! on `.commit.lock`, so several processes may share one directory. A commit stages
//! every value in a synced temp file, then durably writes `.commit.journal` naming
//! the keys it touches. Renaming the journal into place is the commit point: a
//! commit interrupted after it is replayed by the next access to the directory,
//! and staged files without a journal are discarded.

use crate::implementations::memory::describe;
use crate::{StorageError, StorageInterface, WriteBatch, WriteOp};
use async_trait::async_trait;
use fs2::FileExt;
use lifecycle_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Name of this implementation in `storage.implementations`.
pub const NAME: &str = "file";

const DATA_EXTENSION: &str = "bin";
const TEMP_EXTENSION: &str = "tmp";
const LOCK_FILE: &str = ".commit.lock";
const JOURNAL_FILE: &str = ".commit.journal";
const JOURNAL_TEMP_FILE: &str = ".commit.journal.tmp";
const MAX_FILE_NAME_LEN: usize = 255;

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	/// Serializes writers within this process.
	write_lock: Mutex<()>,
	/// Set until this instance has checked the directory for interrupted commits.
	recovery_pending: AtomicBool,
}

/// Holds the cross-process lock until dropped.
struct CommitGuard {
	_file: std::fs::File,
}

/// Keys touched by a commit, written before any live file changes.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Journal {
	puts: Vec<String>,
	deletes: Vec<String>,
}

fn backend(e: std::io::Error) -> StorageError {
	StorageError::Backend(e.to_string())
}

fn is_not_found(e: &std::io::Error) -> bool {
	e.kind() == std::io::ErrorKind::NotFound
}

impl FileStorage {
	/// Creates a new FileStorage instance rooted at `base_path`.
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			write_lock: Mutex::new(()),
			recovery_pending: AtomicBool::new(true),
		}
	}

	fn get_file_path(&self, key: &str) -> Result<PathBuf, StorageError> {
		let file_name = format!("{}.{}", hex::encode(key), DATA_EXTENSION);
		if file_name.len() > MAX_FILE_NAME_LEN {
			return Err(StorageError::InvalidKey(format!(
				"key of {} bytes is too long for the file backend",
				key.len()
			)));
		}
		Ok(self.base_path.join(file_name))
	}

	fn staged_path(&self, key: &str) -> Result<PathBuf, StorageError> {
		Ok(self.get_file_path(key)?.with_extension(TEMP_EXTENSION))
	}

	fn key_from_path(path: &Path) -> Option<String> {
		if path.extension()? != DATA_EXTENSION {
			return None;
		}
		let stem = path.file_stem()?.to_str()?;
		let bytes = hex::decode(stem).ok()?;
		String::from_utf8(bytes).ok()
	}

	async fn ensure_dir(&self) -> Result<(), StorageError> {
		fs::create_dir_all(&self.base_path).await.map_err(backend)
	}

	/// Takes the cross-process commit lock. Blocks a worker thread, not the runtime.
	async fn lock_directory(&self) -> Result<CommitGuard, StorageError> {
		self.ensure_dir().await?;
		let lock_path = self.base_path.join(LOCK_FILE);
		tokio::task::spawn_blocking(move || {
			let file = std::fs::OpenOptions::new()
				.create(true)
				.truncate(false)
				.write(true)
				.open(&lock_path)?;
			file.lock_exclusive()?;
			Ok::<_, std::io::Error>(CommitGuard { _file: file })
		})
		.await
		.map_err(|e| StorageError::Backend(e.to_string()))?
		.map_err(|e| StorageError::Backend(format!("Failed to lock storage directory: {}", e)))
	}

	async fn read_optional(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
		match fs::read(self.get_file_path(key)?).await {
			Ok(data) => Ok(Some(data)),
			Err(e) if is_not_found(&e) => Ok(None),
			Err(e) => Err(backend(e)),
		}
	}

	async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
		let mut file = fs::File::create(path).await.map_err(backend)?;
		file.write_all(bytes).await.map_err(backend)?;
		file.sync_all().await.map_err(backend)
	}

	async fn remove_if_present(path: &Path) -> Result<(), StorageError> {
		match fs::remove_file(path).await {
			Ok(_) => Ok(()),
			Err(e) if is_not_found(&e) => Ok(()),
			Err(e) => Err(backend(e)),
		}
	}

	async fn discard_staged(staged: &[PathBuf]) {
		for temp_path in staged {
			if let Err(e) = fs::remove_file(temp_path).await {
				tracing::debug!("Failed to remove staged file {:?}: {}", temp_path, e);
			}
		}
	}

	/// Moves every staged put into place, removes deleted keys, then drops the journal.
	///
	/// Safe to repeat: a put whose staged file is gone was already renamed.
	async fn replay(&self, journal: &Journal) -> Result<(), StorageError> {
		for key in &journal.puts {
			let path = self.get_file_path(key)?;
			match fs::rename(path.with_extension(TEMP_EXTENSION), &path).await {
				Ok(()) => {},
				Err(e) if is_not_found(&e) => {},
				Err(e) => return Err(backend(e)),
			}
		}
		for key in &journal.deletes {
			Self::remove_if_present(&self.get_file_path(key)?).await?;
		}
		Self::remove_if_present(&self.base_path.join(JOURNAL_FILE)).await
	}

	/// Finishes an interrupted commit. Callers hold both commit locks.
	///
	/// A journal left by any process is replayed. Staged files that no journal
	/// names are only swept on this instance's first recovery.
	async fn recover(&self) -> Result<(), StorageError> {
		match fs::read(self.base_path.join(JOURNAL_FILE)).await {
			Ok(bytes) => {
				let journal: Journal = serde_json::from_slice(&bytes)
					.map_err(|e| StorageError::Serialization(e.to_string()))?;
				tracing::warn!(
					puts = journal.puts.len(),
					deletes = journal.deletes.len(),
					"Replaying interrupted commit in {:?}",
					self.base_path
				);
				self.replay(&journal).await?;
			},
			Err(e) if is_not_found(&e) => {},
			Err(e) => return Err(backend(e)),
		}

		if self.recovery_pending.load(Ordering::SeqCst) {
			self.discard_stray_files().await?;
			self.recovery_pending.store(false, Ordering::SeqCst);
		}
		Ok(())
	}

	async fn discard_stray_files(&self) -> Result<(), StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if is_not_found(&e) => return Ok(()),
			Err(e) => return Err(backend(e)),
		};
		while let Some(entry) = entries.next_entry().await.map_err(backend)? {
			let path = entry.path();
			if path.extension().is_some_and(|ext| ext == TEMP_EXTENSION) {
				tracing::debug!("Discarding uncommitted file {:?}", path);
				Self::remove_if_present(&path).await?;
			}
		}
		Ok(())
	}

	/// Runs recovery once before the first read of this instance.
	async fn ensure_recovered(&self) -> Result<(), StorageError> {
		if !self.recovery_pending.load(Ordering::SeqCst) {
			return Ok(());
		}
		if !fs::try_exists(&self.base_path).await.map_err(backend)? {
			return Ok(());
		}
		let _local = self.write_lock.lock().await;
		let _directory = self.lock_directory().await?;
		self.recover().await
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.ensure_recovered().await?;
		self.read_optional(key).await?.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.commit(WriteBatch::new().put(key, value)).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.commit(WriteBatch::new().delete(key)).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let path = self.get_file_path(key)?;
		self.ensure_recovered().await?;
		fs::try_exists(path).await.map_err(backend)
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		self.ensure_recovered().await?;
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if is_not_found(&e) => return Ok(Vec::new()),
			Err(e) => return Err(backend(e)),
		};

		let mut keys = Vec::new();
		while let Some(entry) = entries.next_entry().await.map_err(backend)? {
			match Self::key_from_path(&entry.path()) {
				Some(key) if key.starts_with(prefix) => keys.push(key),
				Some(_) => {},
				None => tracing::trace!("Skipping non-data file {:?}", entry.path()),
			}
		}
		keys.sort();
		Ok(keys)
	}

	async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
		// Later ops on the same key win, as in the memory backend
		let mut effects: BTreeMap<&str, Option<&[u8]>> = BTreeMap::new();
		for op in &batch.ops {
			match op {
				WriteOp::Put { key, value } => effects.insert(key.as_str(), Some(value.as_slice())),
				WriteOp::Delete { key } => effects.insert(key.as_str(), None),
			};
		}
		for key in effects.keys() {
			self.get_file_path(key)?;
		}

		let _local = self.write_lock.lock().await;
		let _directory = self.lock_directory().await?;
		self.recover().await?;

		for precondition in &batch.preconditions {
			let current = self.read_optional(precondition.key()).await?;
			if !precondition.holds(current.as_deref()) {
				return Err(StorageError::PreconditionFailed(describe(precondition)));
			}
		}

		let mut journal = Journal::default();
		let mut staged = Vec::new();
		for (key, effect) in &effects {
			match effect {
				Some(value) => {
					let temp_path = self.staged_path(key)?;
					if let Err(e) = Self::write_synced(&temp_path, value).await {
						staged.push(temp_path);
						Self::discard_staged(&staged).await;
						return Err(e);
					}
					staged.push(temp_path);
					journal.puts.push(key.to_string());
				},
				None => journal.deletes.push(key.to_string()),
			}
		}

		let journal_bytes =
			serde_json::to_vec(&journal).map_err(|e| StorageError::Serialization(e.to_string()))?;
		let journal_temp = self.base_path.join(JOURNAL_TEMP_FILE);
		let written = match Self::write_synced(&journal_temp, &journal_bytes).await {
			Ok(()) => fs::rename(&journal_temp, self.base_path.join(JOURNAL_FILE))
				.await
				.map_err(backend),
			Err(e) => Err(e),
		};
		if let Err(e) = written {
			staged.push(journal_temp);
			Self::discard_staged(&staged).await;
			return Err(e);
		}

		// The batch is durable from here on
		if let Err(first) = self.replay(&journal).await {
			tracing::warn!("Applying commit failed, retrying: {}", first);
			if let Err(e) = self.replay(&journal).await {
				self.recovery_pending.store(true, Ordering::SeqCst);
				return Err(StorageError::Backend(format!(
					"commit is journaled but not yet applied: {}",
					e
				)));
			}
		}
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(path) if path.trim().is_empty() => {
							Err("storage_path cannot be empty".into())
						},
						_ => Ok(()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/orders")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/orders")
		.to_string();

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}
