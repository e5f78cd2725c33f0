// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info};

use crate::error::LocalStoreError;
use crate::record::{validate_id, SyncRecord};

/// Durable cache of one collection.
///
/// Calls are expected to be fast and local; the engine invokes them while
/// holding its replica lock and never across a network call.
pub trait LocalStore<T: SyncRecord>: Send + Sync {
	fn get_all(&self) -> Result<Vec<T>, LocalStoreError>;
	fn get_by_id(&self, id: &str) -> Result<Option<T>, LocalStoreError>;

	fn list_by_key(&self, key: &str) -> Result<Vec<T>, LocalStoreError> {
		Ok(
			self
				.get_all()?
				.into_iter()
				.filter(|record| record.list_key() == Some(key))
				.collect(),
		)
	}

	fn upsert(&self, record: &T) -> Result<(), LocalStoreError>;

	/// Removes a record. Deleting an unknown id is not an error.
	fn delete(&self, id: &str) -> Result<(), LocalStoreError>;

	fn clear(&self) -> Result<(), LocalStoreError>;
}

impl<T: SyncRecord, S: LocalStore<T> + ?Sized> LocalStore<T> for Arc<S> {
	fn get_all(&self) -> Result<Vec<T>, LocalStoreError> {
		(**self).get_all()
	}

	fn get_by_id(&self, id: &str) -> Result<Option<T>, LocalStoreError> {
		(**self).get_by_id(id)
	}

	fn list_by_key(&self, key: &str) -> Result<Vec<T>, LocalStoreError> {
		(**self).list_by_key(key)
	}

	fn upsert(&self, record: &T) -> Result<(), LocalStoreError> {
		(**self).upsert(record)
	}

	fn delete(&self, id: &str) -> Result<(), LocalStoreError> {
		(**self).delete(id)
	}

	fn clear(&self) -> Result<(), LocalStoreError> {
		(**self).clear()
	}
}

/// In-memory store, ordered by id. Contents do not survive a restart.
pub struct MemoryLocalStore<T> {
	records: Mutex<BTreeMap<String, T>>,
}

impl<T: SyncRecord> MemoryLocalStore<T> {
	pub fn new() -> Self {
		Self {
			records: Mutex::new(BTreeMap::new()),
		}
	}

	pub fn with_records(records: impl IntoIterator<Item = T>) -> Self {
		let map = records
			.into_iter()
			.map(|record| (record.id().to_string(), record))
			.collect();
		Self {
			records: Mutex::new(map),
		}
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, T>> {
		self.records.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

impl<T: SyncRecord> Default for MemoryLocalStore<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: SyncRecord> LocalStore<T> for MemoryLocalStore<T> {
	fn get_all(&self) -> Result<Vec<T>, LocalStoreError> {
		Ok(self.lock().values().cloned().collect())
	}

	fn get_by_id(&self, id: &str) -> Result<Option<T>, LocalStoreError> {
		Ok(self.lock().get(id).cloned())
	}

	fn upsert(&self, record: &T) -> Result<(), LocalStoreError> {
		self
			.lock()
			.insert(record.id().to_string(), record.clone());
		Ok(())
	}

	fn delete(&self, id: &str) -> Result<(), LocalStoreError> {
		self.lock().remove(id);
		Ok(())
	}

	fn clear(&self) -> Result<(), LocalStoreError> {
		self.lock().clear();
		Ok(())
	}
}

/// File-backed store keeping one JSON document per record.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write leaves the previous version intact.
pub struct FileLocalStore<T> {
	dir: PathBuf,
	_record: PhantomData<fn() -> T>,
}

impl<T: SyncRecord> FileLocalStore<T> {
	pub fn new(dir: PathBuf) -> Self {
		Self {
			dir,
			_record: PhantomData,
		}
	}

	/// Opens the store for `collection` under `data_dir`, creating the
	/// directory if needed.
	pub fn open(data_dir: &Path, collection: &str) -> Result<Self, LocalStoreError> {
		validate_id(collection)?;
		let dir = data_dir.join(collection);
		std::fs::create_dir_all(&dir)?;

		info!(
			collection = collection,
			dir = %dir.display(),
			"initialized local record store"
		);

		Ok(Self::new(dir))
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn record_path(&self, id: &str) -> PathBuf {
		self.dir.join(format!("{id}.json"))
	}

	fn record_files(&self) -> Result<Vec<PathBuf>, LocalStoreError> {
		if !self.dir.exists() {
			return Ok(Vec::new());
		}

		let mut paths = Vec::new();
		for entry in std::fs::read_dir(&self.dir)? {
			let path = entry?.path();
			if path.extension().and_then(|e| e.to_str()) == Some("json") {
				paths.push(path);
			}
		}
		Ok(paths)
	}
}

impl<T: SyncRecord> LocalStore<T> for FileLocalStore<T> {
	fn get_all(&self) -> Result<Vec<T>, LocalStoreError> {
		let mut records = Vec::new();

		for path in self.record_files()? {
			match std::fs::read_to_string(&path) {
				Ok(contents) => match serde_json::from_str::<T>(&contents) {
					Ok(record) => records.push(record),
					Err(e) => {
						error!(
							path = %path.display(),
							error = %e,
							"failed to parse record file"
						);
					}
				},
				Err(e) => {
					error!(
						path = %path.display(),
						error = %e,
						"failed to read record file"
					);
				}
			}
		}

		records.sort_by(|a, b| a.id().cmp(b.id()));
		debug!(dir = %self.dir.display(), count = records.len(), "listed records");

		Ok(records)
	}

	fn get_by_id(&self, id: &str) -> Result<Option<T>, LocalStoreError> {
		validate_id(id)?;
		let path = self.record_path(id);

		if !path.exists() {
			return Ok(None);
		}

		let contents = std::fs::read_to_string(&path)?;
		Ok(Some(serde_json::from_str(&contents)?))
	}

	fn upsert(&self, record: &T) -> Result<(), LocalStoreError> {
		validate_id(record.id())?;
		std::fs::create_dir_all(&self.dir)?;

		let path = self.record_path(record.id());
		let tmp_path = self.dir.join(format!("{}.json.tmp", record.id()));

		let json = serde_json::to_string_pretty(record)?;
		std::fs::write(&tmp_path, json)?;
		std::fs::rename(&tmp_path, &path)?;

		debug!(record_id = record.id(), path = %path.display(), "saved record to disk");

		Ok(())
	}

	fn delete(&self, id: &str) -> Result<(), LocalStoreError> {
		validate_id(id)?;
		match std::fs::remove_file(self.record_path(id)) {
			Ok(()) => {
				debug!(record_id = id, "deleted record from disk");
				Ok(())
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	fn clear(&self) -> Result<(), LocalStoreError> {
		let files = self.record_files()?;
		let count = files.len();
		for path in files {
			std::fs::remove_file(&path)?;
		}

		info!(dir = %self.dir.display(), count = count, "cleared local record store");

		Ok(())
	}
}
