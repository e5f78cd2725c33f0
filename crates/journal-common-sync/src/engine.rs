// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{LocalStoreError, RemoteError, SyncError};
use crate::events::{ChangeSource, EventBus, NoopEventBus, SyncEvent, SyncStatus};
use crate::mirror::{self, WriteLog};
use crate::outbox::{
	apply_in_order, FlushReport, MemoryOutboxStorage, Outbox, OutboxEntry, OutboxOperation,
	OutboxStorage,
};
use crate::record::{validate_id, SyncRecord};
use crate::remote::{RemoteChange, RemoteStore};
use crate::signal::{Connectivity, SignalReceivers, SyncSignals};
use crate::store::LocalStore;

/// The local store and the outbox, guarded together so a write can never
/// interleave with a flush updating the queue.
pub(crate) struct Replica<T> {
	pub(crate) local: Box<dyn LocalStore<T>>,
	pub(crate) outbox: Outbox<T>,
	pub(crate) writes: WriteLog,
}

impl<T: SyncRecord> Replica<T> {
	fn apply(&mut self, write: &Write<T>) -> Result<(), LocalStoreError> {
		match write {
			Write::Save(record) => self.local.upsert(record)?,
			Write::Delete(id) => self.local.delete(id)?,
		}
		self.writes.record(write.id());
		Ok(())
	}
}

/// A caller write, as applied locally and pushed to the remote store.
enum Write<T> {
	Save(T),
	Delete(String),
}

impl<T: SyncRecord> Write<T> {
	fn id(&self) -> &str {
		match self {
			Write::Save(record) => record.id(),
			Write::Delete(id) => id,
		}
	}

	fn operation(&self) -> OutboxOperation {
		match self {
			Write::Save(_) => OutboxOperation::Save,
			Write::Delete(_) => OutboxOperation::Delete,
		}
	}

	fn into_entry(self) -> OutboxEntry<T> {
		match self {
			Write::Save(record) => OutboxEntry::save(record),
			Write::Delete(id) => OutboxEntry::delete(id),
		}
	}

	fn from_entry(entry: OutboxEntry<T>) -> Option<Self> {
		match (entry.operation, entry.payload) {
			(OutboxOperation::Save, Some(record)) => Some(Write::Save(record)),
			(OutboxOperation::Save, None) => None,
			(OutboxOperation::Delete, _) => Some(Write::Delete(entry.id)),
		}
	}
}

/// Background work dispatched through [`SyncEngine::sync`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum SyncJob {
	Bootstrap,
	Refresh(RefreshQuery),
	Flush,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RefreshQuery {
	All,
	ById(String),
	ByKey(String),
}

pub(crate) struct EngineInner<T> {
	config: SyncConfig,
	replica: Mutex<Replica<T>>,
	remote: Option<Arc<dyn RemoteStore<T>>>,
	events: Arc<dyn EventBus>,
	status: watch::Sender<SyncStatus>,
	/// Absent without signals, which counts as online.
	connectivity: Option<watch::Receiver<Connectivity>>,
	flushing: AtomicBool,
	flush_requested: AtomicBool,
	bootstrapped: AtomicBool,
	/// One-shot background jobs.
	jobs: TaskTracker,
	/// The mirror and the signal listener.
	workers: TaskTracker,
	cancel: CancellationToken,
}

/// Offline-first replica of one collection.
///
/// `SyncEngine` is a cheap handle: clones share the same replica, outbox and
/// background tasks. Build one per collection at the composition root with
/// [`SyncEngine::builder`] and call [`SyncEngine::shutdown`] before exit.
///
/// Writes try the remote store first and fall back to the local replica
/// plus the outbox; remote failures are never returned to the caller. Reads
/// are answered from the local replica and trigger a background refresh.
pub struct SyncEngine<T: SyncRecord> {
	inner: Arc<EngineInner<T>>,
}

impl<T: SyncRecord> Clone for SyncEngine<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

/// Non-owning handle held by long-lived tasks so they do not keep the
/// engine alive.
pub(crate) struct WeakEngine<T>(Weak<EngineInner<T>>);

impl<T: SyncRecord> WeakEngine<T> {
	pub(crate) fn upgrade(&self) -> Option<SyncEngine<T>> {
		self.0.upgrade().map(|inner| SyncEngine { inner })
	}
}

pub struct SyncEngineBuilder<T: SyncRecord> {
	config: SyncConfig,
	local: Box<dyn LocalStore<T>>,
	remote: Option<Arc<dyn RemoteStore<T>>>,
	outbox_storage: Option<Box<dyn OutboxStorage<T>>>,
	events: Arc<dyn EventBus>,
	signals: Option<SyncSignals>,
}

impl<T: SyncRecord> SyncEngineBuilder<T> {
	/// Without a remote store the engine runs in local mode.
	pub fn remote(mut self, remote: Arc<dyn RemoteStore<T>>) -> Self {
		self.remote = Some(remote);
		self
	}

	/// Defaults to in-memory storage, which loses queued writes on restart.
	pub fn outbox_storage(mut self, storage: impl OutboxStorage<T> + 'static) -> Self {
		self.outbox_storage = Some(Box::new(storage));
		self
	}

	pub fn event_bus(mut self, events: Arc<dyn EventBus>) -> Self {
		self.events = events;
		self
	}

	/// Without signals connectivity is assumed to be online.
	pub fn signals(mut self, signals: SyncSignals) -> Self {
		self.signals = Some(signals);
		self
	}

	/// Loads the outbox, publishes the initial status and dispatches the
	/// startup work: bootstrap, the change mirror, the signal listener and
	/// the initial flush.
	pub async fn start(self) -> Result<SyncEngine<T>, SyncError> {
		self.config.validate()?;

		let outbox = match self.outbox_storage {
			Some(storage) => Outbox::load(storage)?,
			None => {
				debug!(
					collection = %self.config.collection,
					"no outbox storage configured, queued writes will not survive a restart"
				);
				Outbox::load(MemoryOutboxStorage::new())?
			}
		};

		let pending = outbox.len();
		let initial = match self.remote {
			Some(_) => SyncStatus::from_pending(pending),
			None => SyncStatus::Local,
		};
		let (status, _) = watch::channel(initial);

		let engine = SyncEngine {
			inner: Arc::new(EngineInner {
				config: self.config,
				replica: Mutex::new(Replica {
					local: self.local,
					outbox,
					writes: WriteLog::default(),
				}),
				remote: self.remote,
				events: self.events,
				status,
				connectivity: self.signals.as_ref().map(|s| s.subscribe().connectivity),
				flushing: AtomicBool::new(false),
				flush_requested: AtomicBool::new(false),
				bootstrapped: AtomicBool::new(false),
				jobs: TaskTracker::new(),
				workers: TaskTracker::new(),
				cancel: CancellationToken::new(),
			}),
		};

		info!(
			collection = %engine.collection(),
			remote = engine.inner.remote.is_some(),
			pending = pending,
			"sync engine started"
		);
		engine.set_status(initial);

		if let Some(remote) = engine.inner.remote.clone() {
			// While offline, bootstrap waits for the first reconnect.
			engine.sync(SyncJob::Bootstrap);

			engine.inner.workers.spawn(mirror::run_mirror(
				engine.downgrade(),
				remote,
				engine.inner.connectivity.clone(),
				engine.inner.cancel.clone(),
				engine.collection().to_string(),
			));

			if let Some(signals) = &self.signals {
				engine.inner.workers.spawn(listen_for_signals(
					engine.downgrade(),
					signals.subscribe(),
					engine.inner.cancel.clone(),
					engine.collection().to_string(),
				));
			}

			if engine.inner.config.flush_on_start && !engine.is_offline() {
				engine.sync(SyncJob::Flush);
			}
		}

		Ok(engine)
	}
}

impl<T: SyncRecord> SyncEngine<T> {
	pub fn builder(config: SyncConfig, local: impl LocalStore<T> + 'static) -> SyncEngineBuilder<T> {
		SyncEngineBuilder {
			config,
			local: Box::new(local),
			remote: None,
			outbox_storage: None,
			events: Arc::new(NoopEventBus),
			signals: None,
		}
	}

	pub fn collection(&self) -> &str {
		&self.inner.config.collection
	}

	pub fn has_remote(&self) -> bool {
		self.inner.remote.is_some()
	}

	pub fn status(&self) -> SyncStatus {
		*self.inner.status.borrow()
	}

	/// Receiver that observes every status change of this engine.
	pub fn status_changes(&self) -> watch::Receiver<SyncStatus> {
		self.inner.status.subscribe()
	}

	/// True while the shared signals report no connectivity.
	pub fn is_offline(&self) -> bool {
		self
			.inner
			.connectivity
			.as_ref()
			.is_some_and(|connectivity| *connectivity.borrow() == Connectivity::Offline)
	}

	pub async fn pending_count(&self) -> usize {
		self.inner.replica.lock().await.outbox.len()
	}

	/// Queued writes in replay order.
	pub async fn pending_entries(&self) -> Vec<OutboxEntry<T>> {
		self.inner.replica.lock().await.outbox.pending()
	}

	// --- write path ---

	/// Saves `record`. Succeeds once the local replica holds it, whether or
	/// not the remote store was reachable.
	pub async fn save(&self, record: T) -> Result<(), SyncError> {
		let record = record.canonicalize()?;
		self.write(Write::Save(record)).await
	}

	/// Same as [`save`](Self::save); the remote store upserts by id.
	pub async fn update(&self, record: T) -> Result<(), SyncError> {
		self.save(record).await
	}

	/// Deletes `id`. Deleting an unknown id is not an error.
	pub async fn delete(&self, id: &str) -> Result<(), SyncError> {
		validate_id(id)?;
		self.write(Write::Delete(id.to_string())).await
	}

	async fn write(&self, write: Write<T>) -> Result<(), SyncError> {
		let Some(remote) = &self.inner.remote else {
			self.inner.replica.lock().await.apply(&write)?;
			debug!(
				collection = %self.collection(),
				record_id = %write.id(),
				operation = %write.operation(),
				"stored record locally (no remote configured)"
			);
			self.set_status(SyncStatus::Local);
			return Ok(());
		};

		{
			let offline = self.is_offline();
			let mut replica = self.inner.replica.lock().await;
			// A write must not overtake the queued write for the same id.
			if offline || replica.outbox.has_pending_for(write.id()) {
				replica.apply(&write)?;
				debug!(
					collection = %self.collection(),
					record_id = %write.id(),
					offline = offline,
					"queued write without contacting remote store"
				);
				replica.outbox.append(write.into_entry());
				let pending = replica.outbox.len();
				drop(replica);

				self.set_status(SyncStatus::Queued { count: pending });
				if !offline {
					self.sync(SyncJob::Flush);
				}
				return Ok(());
			}
		}

		match self.push(remote, &write).await {
			Ok(()) => {
				let mut replica = self.inner.replica.lock().await;
				replica.apply(&write)?;
				let pending = replica.outbox.len();
				drop(replica);

				debug!(
					collection = %self.collection(),
					record_id = %write.id(),
					operation = %write.operation(),
					"write reached remote store"
				);
				self.set_status(SyncStatus::from_pending(pending));
			}
			Err(e) => {
				let mut replica = self.inner.replica.lock().await;
				replica.apply(&write)?;
				warn!(
					collection = %self.collection(),
					record_id = %write.id(),
					operation = %write.operation(),
					error = %e,
					"remote write failed, queued for retry"
				);
				replica.outbox.append(write.into_entry());
				let pending = replica.outbox.len();
				drop(replica);

				self.set_status(SyncStatus::Queued { count: pending });
			}
		}

		Ok(())
	}

	async fn push(&self, remote: &Arc<dyn RemoteStore<T>>, write: &Write<T>) -> Result<(), RemoteError> {
		match write {
			Write::Save(record) => self.call_remote(remote.save(record)).await,
			Write::Delete(id) => self.call_remote(remote.delete(id)).await,
		}
	}

	// --- read path ---

	/// Current local contents. A remote refresh runs in the background.
	pub async fn get_all(&self) -> Result<Vec<T>, SyncError> {
		let records = self.inner.replica.lock().await.local.get_all()?;
		self.sync(SyncJob::Refresh(RefreshQuery::All));
		Ok(records)
	}

	pub async fn get_by_id(&self, id: &str) -> Result<Option<T>, SyncError> {
		validate_id(id)?;
		let record = self.inner.replica.lock().await.local.get_by_id(id)?;
		self.sync(SyncJob::Refresh(RefreshQuery::ById(id.to_string())));
		Ok(record)
	}

	pub async fn list_by_key(&self, key: &str) -> Result<Vec<T>, SyncError> {
		let key = T::canonical_key(key);
		let records = self.inner.replica.lock().await.local.list_by_key(&key)?;
		self.sync(SyncJob::Refresh(RefreshQuery::ByKey(key.to_string())));
		Ok(records)
	}

	/// Empties the local replica. Queued writes stay in the outbox.
	pub async fn clear_local(&self) -> Result<(), SyncError> {
		self.inner.replica.lock().await.local.clear()?;
		info!(collection = %self.collection(), "cleared local replica");
		self.publish_changed(ChangeSource::Refresh);
		Ok(())
	}

	// --- background work ---

	/// Dispatches `job` as a background task. The caller never waits for it;
	/// nothing is dispatched without a remote store or after shutdown, and
	/// only flushes are dispatched while offline.
	fn sync(&self, job: SyncJob) {
		if self.inner.remote.is_none() || self.inner.cancel.is_cancelled() {
			return;
		}
		if self.is_offline() && !matches!(job, SyncJob::Flush) {
			return;
		}

		let engine = self.clone();
		self.inner.jobs.spawn(async move {
			engine.run_job(job).await;
		});
	}

	async fn run_job(&self, job: SyncJob) {
		let Some(remote) = self.inner.remote.clone() else {
			return;
		};

		match job {
			SyncJob::Flush => {
				self.flush().await;
			}
			SyncJob::Bootstrap => {
				if self.inner.bootstrapped.swap(true, Ordering::SeqCst) {
					return;
				}
				let snapshot = self.inner.replica.lock().await.writes.begin();
				match self.call_remote(remote.list_all()).await {
					Ok(records) => {
						info!(
							collection = %self.collection(),
							count = records.len(),
							"bootstrapped from remote store"
						);
						self.apply_remote(upserts(records), ChangeSource::Bootstrap, Some(snapshot))
							.await;
					}
					Err(e) => {
						warn!(
							collection = %self.collection(),
							error = %e,
							"bootstrap failed, keeping local replica"
						);
					}
				}
				self.inner.replica.lock().await.writes.end(snapshot);
			}
			SyncJob::Refresh(query) => {
				let snapshot = self.inner.replica.lock().await.writes.begin();
				let fetched = match &query {
					RefreshQuery::All => self.call_remote(remote.list_all()).await,
					RefreshQuery::ById(id) => self
						.call_remote(remote.get_by_id(id))
						.await
						.map(|record| record.into_iter().collect()),
					RefreshQuery::ByKey(key) => self.call_remote(remote.list_by_key(key)).await,
				};
				match fetched {
					Ok(records) if !records.is_empty() => {
						self.apply_remote(upserts(records), ChangeSource::Refresh, Some(snapshot))
							.await;
					}
					Ok(_) => {}
					Err(e) => {
						debug!(
							collection = %self.collection(),
							query = ?query,
							error = %e,
							"background refresh failed"
						);
					}
				}
				self.inner.replica.lock().await.writes.end(snapshot);
			}
		}
	}

	/// Merges remote changes and publishes a single change notification if
	/// anything in the replica changed.
	pub(crate) async fn apply_remote(
		&self,
		changes: Vec<RemoteChange<T>>,
		source: ChangeSource,
		snapshot: Option<u64>,
	) {
		let changed = {
			let mut replica = self.inner.replica.lock().await;
			mirror::merge_remote(&mut replica, changes, snapshot)
		};

		if changed > 0 {
			debug!(
				collection = %self.collection(),
				source = %source,
				changed = changed,
				"applied remote changes"
			);
			self.publish_changed(source);
		}
	}

	/// Requests a flush without waiting for it.
	pub fn request_flush(&self) {
		self.sync(SyncJob::Flush);
	}

	/// Bootstrap if it has not run yet, then flush.
	fn reconnected(&self) {
		self.sync(SyncJob::Bootstrap);
		self.sync(SyncJob::Flush);
	}

	/// Replays the outbox now.
	///
	/// At most one pass runs at a time. A call arriving while a pass is
	/// running returns immediately with `coalesced` set, and the running
	/// pass goes around once more to pick it up.
	pub async fn flush(&self) -> FlushReport {
		let Some(remote) = self.inner.remote.clone() else {
			return FlushReport {
				remaining: self.pending_count().await,
				..Default::default()
			};
		};

		let inner = &self.inner;
		inner.flush_requested.store(true, Ordering::SeqCst);

		let mut report = None;
		while inner.flush_requested.load(Ordering::SeqCst) {
			if inner.flushing.swap(true, Ordering::SeqCst) {
				break;
			}
			inner.flush_requested.store(false, Ordering::SeqCst);
			report = Some(self.flush_pass(&remote).await);
			inner.flushing.store(false, Ordering::SeqCst);
		}

		match report {
			Some(report) => report,
			None => {
				debug!(collection = %self.collection(), "flush already running, coalesced");
				FlushReport::coalesced(self.pending_count().await)
			}
		}
	}

	async fn flush_pass(&self, remote: &Arc<dyn RemoteStore<T>>) -> FlushReport {
		let pending = self.inner.replica.lock().await.outbox.pending();

		if !pending.is_empty() {
			info!(
				collection = %self.collection(),
				count = pending.len(),
				"flushing outbox"
			);
		}

		let outcome = apply_in_order(pending, |entry| self.push_entry(remote, entry)).await;
		let remaining = {
			let mut replica = self.inner.replica.lock().await;
			for id in &outcome.applied_ids {
				replica.writes.record(id);
			}
			replica.outbox.complete(&outcome.applied)
		};
		let report = outcome.into_report(remaining);

		if report.attempted > 0 {
			info!(
				collection = %self.collection(),
				applied = report.applied,
				failed = report.failed,
				skipped = report.skipped,
				remaining = report.remaining,
				"outbox flush finished"
			);
		}
		self.set_status(SyncStatus::from_pending(remaining));

		report
	}

	async fn push_entry(
		&self,
		remote: &Arc<dyn RemoteStore<T>>,
		entry: OutboxEntry<T>,
	) -> Result<(), RemoteError> {
		let sequence = entry.sequence;
		match Write::from_entry(entry) {
			Some(write) => self.push(remote, &write).await,
			None => {
				error!(sequence = sequence, "outbox save entry has no payload");
				Err(RemoteError::Rejected("save entry without payload".to_string()))
			}
		}
	}

	/// Awaits a remote call, bounded by the configured timeout.
	pub(crate) async fn call_remote<R, F>(&self, call: F) -> Result<R, RemoteError>
	where
		F: Future<Output = Result<R, RemoteError>>,
	{
		match self.inner.config.remote_timeout {
			Some(limit) => tokio::time::timeout(limit, call)
				.await
				.map_err(|_| RemoteError::Timeout)?,
			None => call.await,
		}
	}

	/// Waits until every background job dispatched so far has finished.
	/// The mirror and signal listener are not included.
	pub async fn wait_idle(&self) {
		let jobs = &self.inner.jobs;
		jobs.close();
		jobs.wait().await;
		if !self.inner.cancel.is_cancelled() {
			jobs.reopen();
		}
	}

	/// Stops the mirror and signal listener and waits for in-flight jobs.
	/// Writes keep working afterwards but no background work is started.
	pub async fn shutdown(&self) {
		info!(collection = %self.collection(), "shutting down sync engine");
		self.inner.cancel.cancel();
		self.inner.jobs.close();
		self.inner.workers.close();
		self.inner.jobs.wait().await;
		self.inner.workers.wait().await;
		debug!(collection = %self.collection(), "sync engine stopped");
	}

	// --- events ---

	fn set_status(&self, status: SyncStatus) {
		self.inner.status.send_replace(status);
		self.inner.events.publish(SyncEvent::StatusChanged {
			collection: self.collection().to_string(),
			status,
		});
	}

	fn publish_changed(&self, source: ChangeSource) {
		self.inner.events.publish(SyncEvent::ItemsChanged {
			collection: self.collection().to_string(),
			source,
		});
	}

	fn downgrade(&self) -> WeakEngine<T> {
		WeakEngine(Arc::downgrade(&self.inner))
	}
}

fn upserts<T>(records: Vec<T>) -> Vec<RemoteChange<T>> {
	records.into_iter().map(RemoteChange::Upserted).collect()
}

/// Long-lived task turning connectivity transitions and force-sync requests
/// into flushes.
async fn listen_for_signals<T: SyncRecord>(
	engine: WeakEngine<T>,
	mut signals: SignalReceivers,
	cancel: CancellationToken,
	collection: String,
) {
	let mut last = *signals.connectivity.borrow_and_update();
	let mut watching = true;
	let mut forced = true;

	while watching || forced {
		let (flush, came_online) = tokio::select! {
			_ = cancel.cancelled() => break,
			changed = signals.connectivity.changed(), if watching => {
				if changed.is_err() {
					watching = false;
					(false, false)
				} else {
					let now = *signals.connectivity.borrow_and_update();
					let came_online = now == Connectivity::Online && last != Connectivity::Online;
					last = now;
					if came_online {
						info!(collection = %collection, "connectivity restored, flushing outbox");
					}
					(came_online, came_online)
				}
			}
			received = signals.force.recv(), if forced => match received {
				Ok(request) => (request.targets(&collection), false),
				Err(broadcast::error::RecvError::Lagged(missed)) => {
					warn!(collection = %collection, missed = missed, "missed force sync signals");
					(true, false)
				}
				Err(broadcast::error::RecvError::Closed) => {
					forced = false;
					(false, false)
				}
			},
		};

		if flush {
			let Some(engine) = engine.upgrade() else {
				break;
			};
			if came_online {
				engine.reconnected();
			} else {
				engine.request_flush();
			}
		}
	}

	debug!(collection = %collection, "signal listener stopped");
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::MemoryLocalStore;
	use crate::test_support::Note;

	#[tokio::test]
	async fn test_local_mode_writes_and_reports_local() {
		let engine = SyncEngine::builder(SyncConfig::new("notes"), MemoryLocalStore::<Note>::new())
			.start()
			.await
			.unwrap();

		engine.save(Note::new("a", "1")).await.unwrap();
		engine.delete("missing").await.unwrap();

		assert_eq!(engine.status(), SyncStatus::Local);
		assert_eq!(engine.get_all().await.unwrap().len(), 1);
		assert_eq!(engine.pending_count().await, 0);

		let report = engine.flush().await;
		assert_eq!(report, FlushReport::default());
	}

	#[tokio::test]
	async fn test_rejects_invalid_ids() {
		let engine = SyncEngine::builder(SyncConfig::new("notes"), MemoryLocalStore::<Note>::new())
			.start()
			.await
			.unwrap();

		assert!(matches!(
			engine.save(Note::new("", "x")).await,
			Err(SyncError::Record(_))
		));
		assert!(matches!(engine.delete("a/b").await, Err(SyncError::Record(_))));
	}

	#[tokio::test]
	async fn test_rejects_invalid_config() {
		let result = SyncEngine::builder(SyncConfig::new("../up"), MemoryLocalStore::<Note>::new())
			.start()
			.await;
		assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
	}

	#[test]
	fn test_write_entry_conversion() {
		let write = Write::Save(Note::new("a", "1"));
		assert_eq!(write.operation(), OutboxOperation::Save);
		let entry = write.into_entry();
		assert!(matches!(Write::from_entry(entry), Some(Write::Save(_))));

		let broken = OutboxEntry::<Note> {
			sequence: 1,
			operation: OutboxOperation::Save,
			id: "a".to_string(),
			payload: None,
		};
		assert!(Write::from_entry(broken).is_none());
	}
}
