// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Durable ordered queue of writes the remote store has not confirmed yet.
//!
//! Entries are replayed strictly in ascending sequence order. A failing entry
//! stays queued and the pass moves on, except that later entries for the
//! same id are held back for the rest of the pass so a newer write is never
//! applied ahead of an older one.

use std::collections::HashSet;
use std::future::Future;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{OutboxError, RemoteError};
use crate::record::SyncRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxOperation {
	Save,
	Delete,
}

impl std::fmt::Display for OutboxOperation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OutboxOperation::Save => write!(f, "save"),
			OutboxOperation::Delete => write!(f, "delete"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry<T> {
	pub sequence: u64,
	pub operation: OutboxOperation,
	pub id: String,
	/// Present for saves, absent for deletes.
	pub payload: Option<T>,
}

impl<T: SyncRecord> OutboxEntry<T> {
	/// A save entry. The sequence is assigned by [`Outbox::append`].
	pub fn save(record: T) -> Self {
		Self {
			sequence: 0,
			operation: OutboxOperation::Save,
			id: record.id().to_string(),
			payload: Some(record),
		}
	}

	/// A delete entry. The sequence is assigned by [`Outbox::append`].
	pub fn delete(id: impl Into<String>) -> Self {
		Self {
			sequence: 0,
			operation: OutboxOperation::Delete,
			id: id.into(),
			payload: None,
		}
	}

	fn is_well_formed(&self) -> bool {
		match (self.operation, &self.payload) {
			(OutboxOperation::Save, Some(record)) => record.id() == self.id,
			(OutboxOperation::Save, None) => false,
			(OutboxOperation::Delete, _) => true,
		}
	}
}

/// Result of one flush pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
	pub attempted: usize,
	pub applied: usize,
	pub failed: usize,
	/// Entries held back because an earlier entry for the same id failed.
	pub skipped: usize,
	pub remaining: usize,
	/// The pass was folded into one already running.
	pub coalesced: bool,
}

impl FlushReport {
	pub(crate) fn coalesced(remaining: usize) -> Self {
		Self {
			remaining,
			coalesced: true,
			..Default::default()
		}
	}
}

/// What a pass over a snapshot of the queue achieved.
#[derive(Debug, Default)]
pub(crate) struct PassOutcome {
	pub attempted: usize,
	pub applied: Vec<u64>,
	/// Ids of the applied entries, in replay order.
	pub applied_ids: Vec<String>,
	pub failed: usize,
	pub skipped: usize,
}

impl PassOutcome {
	pub(crate) fn into_report(self, remaining: usize) -> FlushReport {
		FlushReport {
			attempted: self.attempted,
			applied: self.applied.len(),
			failed: self.failed,
			skipped: self.skipped,
			remaining,
			coalesced: false,
		}
	}
}

/// Calls `apply` for each entry in the given order and collects the
/// sequences that succeeded.
pub(crate) async fn apply_in_order<T, F, Fut>(entries: Vec<OutboxEntry<T>>, mut apply: F) -> PassOutcome
where
	F: FnMut(OutboxEntry<T>) -> Fut,
	Fut: Future<Output = Result<(), RemoteError>>,
{
	let mut outcome = PassOutcome::default();
	let mut blocked: HashSet<String> = HashSet::new();

	for entry in entries {
		if blocked.contains(&entry.id) {
			debug!(
				sequence = entry.sequence,
				record_id = %entry.id,
				"holding back entry behind failed write for same id"
			);
			outcome.skipped += 1;
			continue;
		}

		let sequence = entry.sequence;
		let id = entry.id.clone();
		let operation = entry.operation;
		outcome.attempted += 1;

		match apply(entry).await {
			Ok(()) => {
				debug!(sequence = sequence, record_id = %id, operation = %operation, "replayed outbox entry");
				outcome.applied.push(sequence);
				outcome.applied_ids.push(id);
			}
			Err(e) => {
				warn!(
					sequence = sequence,
					record_id = %id,
					operation = %operation,
					error = %e,
					"outbox entry replay failed"
				);
				outcome.failed += 1;
				blocked.insert(id);
			}
		}
	}

	outcome
}

/// Persistence backend for an [`Outbox`].
pub trait OutboxStorage<T>: Send + Sync {
	fn load(&self) -> Result<Vec<OutboxEntry<T>>, OutboxError>;

	/// Replaces the persisted queue with `entries`.
	fn save(&self, entries: &[OutboxEntry<T>]) -> Result<(), OutboxError>;
}

impl<T, S: OutboxStorage<T> + ?Sized> OutboxStorage<T> for Arc<S> {
	fn load(&self) -> Result<Vec<OutboxEntry<T>>, OutboxError> {
		(**self).load()
	}

	fn save(&self, entries: &[OutboxEntry<T>]) -> Result<(), OutboxError> {
		(**self).save(entries)
	}
}

impl<T, S: OutboxStorage<T> + ?Sized> OutboxStorage<T> for Box<S> {
	fn load(&self) -> Result<Vec<OutboxEntry<T>>, OutboxError> {
		(**self).load()
	}

	fn save(&self, entries: &[OutboxEntry<T>]) -> Result<(), OutboxError> {
		(**self).save(entries)
	}
}

/// Outbox persisted as a single JSON array file.
pub struct JsonFileOutboxStorage<T> {
	path: PathBuf,
	_record: PhantomData<fn() -> T>,
}

impl<T> JsonFileOutboxStorage<T> {
	pub fn new(path: PathBuf) -> Self {
		Self {
			path,
			_record: PhantomData,
		}
	}

	/// `<data_dir>/outbox-<collection>.json`
	pub fn for_collection(data_dir: &Path, collection: &str) -> Self {
		Self::new(data_dir.join(format!("outbox-{collection}.json")))
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl<T: SyncRecord> OutboxStorage<T> for JsonFileOutboxStorage<T> {
	fn load(&self) -> Result<Vec<OutboxEntry<T>>, OutboxError> {
		if !self.path.exists() {
			return Ok(Vec::new());
		}

		let contents = std::fs::read_to_string(&self.path)?;
		if contents.trim().is_empty() {
			return Ok(Vec::new());
		}

		Ok(serde_json::from_str(&contents)?)
	}

	fn save(&self, entries: &[OutboxEntry<T>]) -> Result<(), OutboxError> {
		if let Some(parent) = self.path.parent() {
			std::fs::create_dir_all(parent)?;
		}

		let tmp_path = self.path.with_extension("json.tmp");
		let json = serde_json::to_string_pretty(entries)?;
		std::fs::write(&tmp_path, json)?;
		std::fs::rename(&tmp_path, &self.path)?;

		debug!(path = %self.path.display(), count = entries.len(), "persisted outbox");
		Ok(())
	}
}

/// Non-durable outbox storage. Writes can be made to fail on demand.
pub struct MemoryOutboxStorage<T> {
	entries: Mutex<Vec<OutboxEntry<T>>>,
	fail_writes: AtomicBool,
}

impl<T: SyncRecord> MemoryOutboxStorage<T> {
	pub fn new() -> Self {
		Self::with_entries(Vec::new())
	}

	pub fn with_entries(entries: Vec<OutboxEntry<T>>) -> Self {
		Self {
			entries: Mutex::new(entries),
			fail_writes: AtomicBool::new(false),
		}
	}

	/// Makes every subsequent `save` fail, as a full storage quota would.
	pub fn set_fail_writes(&self, fail: bool) {
		self.fail_writes.store(fail, Ordering::SeqCst);
	}

	/// The last successfully persisted queue.
	pub fn snapshot(&self) -> Vec<OutboxEntry<T>> {
		self
			.entries
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}
}

impl<T: SyncRecord> Default for MemoryOutboxStorage<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: SyncRecord> OutboxStorage<T> for MemoryOutboxStorage<T> {
	fn load(&self) -> Result<Vec<OutboxEntry<T>>, OutboxError> {
		Ok(self.snapshot())
	}

	fn save(&self, entries: &[OutboxEntry<T>]) -> Result<(), OutboxError> {
		if self.fail_writes.load(Ordering::SeqCst) {
			return Err(OutboxError::Unavailable("storage quota exceeded".to_string()));
		}
		*self.entries.lock().unwrap_or_else(PoisonError::into_inner) = entries.to_vec();
		Ok(())
	}
}

pub struct Outbox<T> {
	entries: Vec<OutboxEntry<T>>,
	next_sequence: u64,
	storage: Box<dyn OutboxStorage<T>>,
}

impl<T: SyncRecord> Outbox<T> {
	/// Restores the queue from `storage`. Malformed entries are dropped.
	pub fn load(storage: impl OutboxStorage<T> + 'static) -> Result<Self, OutboxError> {
		let mut entries = storage.load()?;
		let loaded = entries.len();

		entries.retain(|entry| {
			let ok = entry.is_well_formed();
			if !ok {
				error!(
					sequence = entry.sequence,
					record_id = %entry.id,
					"dropping malformed outbox entry"
				);
			}
			ok
		});
		entries.sort_by_key(|entry| entry.sequence);

		let next_sequence = entries.last().map(|e| e.sequence + 1).unwrap_or(1);

		if loaded > 0 {
			info!(count = entries.len(), next_sequence = next_sequence, "restored outbox");
		}

		let outbox = Self {
			entries,
			next_sequence,
			storage: Box::new(storage),
		};
		if outbox.entries.len() != loaded {
			outbox.persist();
		}
		Ok(outbox)
	}

	pub fn in_memory() -> Self {
		Self {
			entries: Vec::new(),
			next_sequence: 1,
			storage: Box::new(MemoryOutboxStorage::new()),
		}
	}

	/// Queues `entry` under the next sequence number and persists the queue.
	///
	/// A persistence failure is logged and the entry is kept in memory; the
	/// full queue is written again on the next change.
	pub fn append(&mut self, mut entry: OutboxEntry<T>) -> u64 {
		let sequence = self.next_sequence;
		self.next_sequence += 1;
		entry.sequence = sequence;

		if !entry.is_well_formed() {
			error!(sequence = sequence, record_id = %entry.id, "refusing malformed outbox entry");
			return sequence;
		}

		debug!(
			sequence = sequence,
			record_id = %entry.id,
			operation = %entry.operation,
			"queued outbox entry"
		);
		self.entries.push(entry);
		self.persist();
		sequence
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Queued entries in ascending sequence order.
	pub fn entries(&self) -> &[OutboxEntry<T>] {
		&self.entries
	}

	pub fn has_pending_for(&self, id: &str) -> bool {
		self.entries.iter().any(|entry| entry.id == id)
	}

	/// Snapshot of the queue for a flush pass run outside the owner's lock.
	pub fn pending(&self) -> Vec<OutboxEntry<T>> {
		self.entries.clone()
	}

	/// Removes the given sequences, persists, and returns the remaining count.
	pub fn complete(&mut self, sequences: &[u64]) -> usize {
		if sequences.is_empty() {
			return self.entries.len();
		}

		let done: HashSet<u64> = sequences.iter().copied().collect();
		self
			.entries
			.retain(|entry| !done.contains(&entry.sequence));
		self.persist();
		self.entries.len()
	}

	/// Runs one pass over the whole queue.
	pub async fn flush<F, Fut>(&mut self, apply: F) -> FlushReport
	where
		F: FnMut(OutboxEntry<T>) -> Fut,
		Fut: Future<Output = Result<(), RemoteError>>,
	{
		let outcome = apply_in_order(self.pending(), apply).await;
		let remaining = self.complete(&outcome.applied);
		outcome.into_report(remaining)
	}

	fn persist(&self) {
		if let Err(e) = self.storage.save(&self.entries) {
			warn!(
				count = self.entries.len(),
				error = %e,
				"failed to persist outbox, keeping entries in memory"
			);
		}
	}
}

impl<T> std::fmt::Debug for Outbox<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Outbox")
			.field("len", &self.entries.len())
			.field("next_sequence", &self.next_sequence)
			.finish()
	}
}
