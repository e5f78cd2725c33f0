// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Folding remote state into the local replica.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{Replica, WeakEngine};
use crate::error::LocalStoreError;
use crate::events::ChangeSource;
use crate::record::SyncRecord;
use crate::remote::{ChangeEvent, RemoteChange, RemoteStore};
use crate::signal::Connectivity;
use crate::store::LocalStore;

/// Tracks which ids were written locally while a remote snapshot read
/// (bootstrap or refresh) was in flight, so the snapshot cannot roll them
/// back.
#[derive(Debug, Default)]
pub(crate) struct WriteLog {
	epoch: u64,
	touched: HashMap<String, u64>,
	open: BTreeMap<u64, usize>,
}

impl WriteLog {
	pub(crate) fn record(&mut self, id: &str) {
		if self.open.is_empty() {
			return;
		}
		self.epoch += 1;
		self.touched.insert(id.to_string(), self.epoch);
	}

	/// Opens a snapshot. Writes recorded after this point make the
	/// snapshot stale for their ids.
	pub(crate) fn begin(&mut self) -> u64 {
		*self.open.entry(self.epoch).or_default() += 1;
		self.epoch
	}

	pub(crate) fn end(&mut self, snapshot: u64) {
		if let Some(count) = self.open.get_mut(&snapshot) {
			*count -= 1;
			if *count == 0 {
				self.open.remove(&snapshot);
			}
		}

		match self.open.keys().next().copied() {
			None => self.touched.clear(),
			Some(oldest) => self.touched.retain(|_, epoch| *epoch > oldest),
		}
	}

	pub(crate) fn is_stale(&self, id: &str, snapshot: u64) -> bool {
		self
			.touched
			.get(id)
			.is_some_and(|epoch| *epoch > snapshot)
	}
}

/// Applies remote changes to the replica and returns how many records
/// actually changed.
///
/// Ids with queued outbox entries are left alone: the local copy is newer
/// than anything the remote can report until the outbox drains.
pub(crate) fn merge_remote<T: SyncRecord>(
	replica: &mut Replica<T>,
	changes: Vec<RemoteChange<T>>,
	snapshot: Option<u64>,
) -> usize {
	let mut changed = 0;

	for change in changes {
		let id = change.id().to_string();

		if replica.outbox.has_pending_for(&id) {
			debug!(record_id = %id, "skipping remote change for record with queued writes");
			continue;
		}
		if snapshot.is_some_and(|epoch| replica.writes.is_stale(&id, epoch)) {
			debug!(record_id = %id, "skipping remote change older than local write");
			continue;
		}

		let result = match change {
			RemoteChange::Upserted(record) => match record.canonicalize() {
				Ok(record) => upsert_if_changed(&*replica.local, &record),
				Err(e) => {
					warn!(record_id = %id, error = %e, "discarding invalid remote record");
					continue;
				}
			},
			RemoteChange::Removed(id) => remove_if_present(&*replica.local, &id),
		};

		match result {
			Ok(true) => {
				replica.writes.record(&id);
				changed += 1;
			}
			Ok(false) => {}
			Err(e) => {
				error!(record_id = %id, error = %e, "failed to apply remote change locally");
			}
		}
	}

	changed
}

fn upsert_if_changed<T: SyncRecord>(
	local: &dyn LocalStore<T>,
	record: &T,
) -> Result<bool, LocalStoreError> {
	if local.get_by_id(record.id())?.as_ref() == Some(record) {
		return Ok(false);
	}
	local.upsert(record)?;
	Ok(true)
}

fn remove_if_present<T: SyncRecord>(
	local: &dyn LocalStore<T>,
	id: &str,
) -> Result<bool, LocalStoreError> {
	if local.get_by_id(id)?.is_none() {
		return Ok(false);
	}
	local.delete(id)?;
	Ok(true)
}

/// Long-lived task mirroring the remote change feed into the replica.
/// Subscribing waits until `connectivity` first reports online.
pub(crate) async fn run_mirror<T: SyncRecord>(
	engine: WeakEngine<T>,
	remote: Arc<dyn RemoteStore<T>>,
	connectivity: Option<watch::Receiver<Connectivity>>,
	cancel: CancellationToken,
	collection: String,
) {
	if let Some(mut connectivity) = connectivity {
		let online = tokio::select! {
			_ = cancel.cancelled() => false,
			ready = connectivity.wait_for(|now| *now == Connectivity::Online) => ready.is_ok(),
		};
		if !online {
			debug!(collection = %collection, "mirror stopped before going online");
			return;
		}
	}

	let subscribed = {
		let Some(engine) = engine.upgrade() else {
			return;
		};
		engine.call_remote(remote.subscribe()).await
	};

	let mut subscription = match subscribed {
		Ok(Some(subscription)) => subscription,
		Ok(None) => {
			debug!(collection = %collection, "remote store has no change feed");
			return;
		}
		Err(e) => {
			error!(collection = %collection, error = %e, "failed to subscribe to remote changes");
			return;
		}
	};

	info!(collection = %collection, "mirroring remote changes");

	loop {
		let event = tokio::select! {
			_ = cancel.cancelled() => break,
			event = subscription.next() => event,
		};

		match event {
			Some(ChangeEvent::Batch(changes)) => {
				let Some(engine) = engine.upgrade() else {
					break;
				};
				debug!(collection = %collection, count = changes.len(), "received remote change batch");
				engine.apply_remote(changes, ChangeSource::Remote, None).await;
			}
			Some(ChangeEvent::Error(message)) => {
				error!(collection = %collection, error = %message, "remote change feed error");
			}
			None => {
				info!(collection = %collection, "remote change feed closed");
				break;
			}
		}
	}

	debug!(collection = %collection, "mirror stopped");
}
