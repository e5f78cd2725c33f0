// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared fixtures for the sync engine integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use journal_common_sync::{
	ChangeEvent, ChangeSource, EventBus, LocalStore, LocalStoreError, MemoryLocalStore, RemoteChange,
	RemoteError, RemoteStore, Subscription, SyncConfig, SyncEngine, SyncEvent, SyncRecord, SyncStatus,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub const COLLECTION: &str = "items";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
	pub id: String,
	pub price: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub group: Option<String>,
}

impl Item {
	pub fn new(id: &str, price: u32) -> Self {
		Self {
			id: id.to_string(),
			price,
			group: None,
		}
	}

	pub fn in_group(mut self, group: &str) -> Self {
		self.group = Some(group.to_string());
		self
	}
}

impl SyncRecord for Item {
	fn id(&self) -> &str {
		&self.id
	}

	fn list_key(&self) -> Option<&str> {
		self.group.as_deref()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
	Save(Item),
	Delete(String),
	GetById(String),
	ListAll,
	ListByKey(String),
	Subscribe,
}

/// In-memory remote store with switchable failures.
#[derive(Default)]
pub struct MockRemote {
	records: Mutex<BTreeMap<String, Item>>,
	calls: Mutex<Vec<Call>>,
	failing: AtomicBool,
	failing_ids: Mutex<HashSet<String>>,
	delay: Mutex<Option<Duration>>,
	feed_enabled: bool,
	feed: Mutex<Option<mpsc::Sender<ChangeEvent<Item>>>>,
	unsubscribed: Arc<AtomicBool>,
}

impl MockRemote {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn with_feed() -> Arc<Self> {
		Arc::new(Self {
			feed_enabled: true,
			..Default::default()
		})
	}

	pub fn failing() -> Arc<Self> {
		let remote = Self::new();
		remote.set_failing(true);
		remote
	}

	pub fn with_records(records: impl IntoIterator<Item = Item>) -> Arc<Self> {
		let remote = Self::new();
		for record in records {
			remote.insert(record);
		}
		remote
	}

	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	pub fn fail_id(&self, id: &str) {
		self.failing_ids.lock().unwrap().insert(id.to_string());
	}

	pub fn set_delay(&self, delay: Option<Duration>) {
		*self.delay.lock().unwrap() = delay;
	}

	/// Changes remote state without going through the engine.
	pub fn insert(&self, record: Item) {
		self
			.records
			.lock()
			.unwrap()
			.insert(record.id.clone(), record);
	}

	pub fn record(&self, id: &str) -> Option<Item> {
		self.records.lock().unwrap().get(id).cloned()
	}

	pub fn records(&self) -> Vec<Item> {
		self.records.lock().unwrap().values().cloned().collect()
	}

	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().unwrap().clone()
	}

	pub fn clear_calls(&self) {
		self.calls.lock().unwrap().clear();
	}

	pub fn saves(&self) -> Vec<Item> {
		self
			.calls()
			.into_iter()
			.filter_map(|call| match call {
				Call::Save(item) => Some(item),
				_ => None,
			})
			.collect()
	}

	pub fn count(&self, call: &Call) -> usize {
		self.calls().iter().filter(|c| *c == call).count()
	}

	pub fn unsubscribed(&self) -> bool {
		self.unsubscribed.load(Ordering::SeqCst)
	}

	/// Delivers an event on the open change feed.
	pub async fn emit(&self, event: ChangeEvent<Item>) {
		let sender = self.feed.lock().unwrap().clone();
		sender
			.expect("no open subscription")
			.send(event)
			.await
			.expect("subscription closed");
	}

	pub fn has_subscriber(&self) -> bool {
		self.feed.lock().unwrap().is_some()
	}

	async fn enter(&self, call: Call, id: Option<&str>) -> Result<(), RemoteError> {
		self.calls.lock().unwrap().push(call);

		let delay = *self.delay.lock().unwrap();
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}

		if self.failing.load(Ordering::SeqCst) {
			return Err(RemoteError::Network("connection refused".to_string()));
		}
		if let Some(id) = id {
			if self.failing_ids.lock().unwrap().contains(id) {
				return Err(RemoteError::Server {
					status: 500,
					message: format!("cannot store {id}"),
				});
			}
		}
		Ok(())
	}
}

#[async_trait]
impl RemoteStore<Item> for MockRemote {
	async fn save(&self, record: &Item) -> Result<(), RemoteError> {
		self
			.enter(Call::Save(record.clone()), Some(record.id.as_str()))
			.await?;
		self.insert(record.clone());
		Ok(())
	}

	async fn delete(&self, id: &str) -> Result<(), RemoteError> {
		self.enter(Call::Delete(id.to_string()), Some(id)).await?;
		self.records.lock().unwrap().remove(id);
		Ok(())
	}

	async fn get_by_id(&self, id: &str) -> Result<Option<Item>, RemoteError> {
		self.enter(Call::GetById(id.to_string()), None).await?;
		Ok(self.record(id))
	}

	async fn list_all(&self) -> Result<Vec<Item>, RemoteError> {
		self.enter(Call::ListAll, None).await?;
		Ok(self.records())
	}

	async fn list_by_key(&self, key: &str) -> Result<Vec<Item>, RemoteError> {
		self.enter(Call::ListByKey(key.to_string()), None).await?;
		Ok(self
			.records()
			.into_iter()
			.filter(|item| item.group.as_deref() == Some(key))
			.collect())
	}

	async fn subscribe(&self) -> Result<Option<Subscription<Item>>, RemoteError> {
		if !self.feed_enabled {
			return Ok(None);
		}
		self.calls.lock().unwrap().push(Call::Subscribe);

		let (tx, subscription) = Subscription::channel(16);
		*self.feed.lock().unwrap() = Some(tx);

		let flag = Arc::clone(&self.unsubscribed);
		Ok(Some(
			subscription.on_unsubscribe(move || flag.store(true, Ordering::SeqCst)),
		))
	}
}

/// Event bus that keeps everything published to it.
#[derive(Default)]
pub struct RecordingEventBus {
	events: Mutex<Vec<SyncEvent>>,
}

impl RecordingEventBus {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn events(&self) -> Vec<SyncEvent> {
		self.events.lock().unwrap().clone()
	}

	pub fn clear(&self) {
		self.events.lock().unwrap().clear();
	}

	pub fn statuses(&self) -> Vec<SyncStatus> {
		self
			.events()
			.into_iter()
			.filter_map(|event| match event {
				SyncEvent::StatusChanged { status, .. } => Some(status),
				_ => None,
			})
			.collect()
	}

	pub fn last_status(&self) -> Option<SyncStatus> {
		self.statuses().pop()
	}

	pub fn changes(&self, source: ChangeSource) -> usize {
		self
			.events()
			.iter()
			.filter(|event| {
				matches!(event, SyncEvent::ItemsChanged { source: s, .. } if *s == source)
			})
			.count()
	}
}

impl EventBus for RecordingEventBus {
	fn publish(&self, event: SyncEvent) {
		self.events.lock().unwrap().push(event);
	}
}

/// Local store whose writes always fail.
pub struct BrokenLocalStore;

impl LocalStore<Item> for BrokenLocalStore {
	fn get_all(&self) -> Result<Vec<Item>, LocalStoreError> {
		Ok(Vec::new())
	}

	fn get_by_id(&self, _id: &str) -> Result<Option<Item>, LocalStoreError> {
		Ok(None)
	}

	fn upsert(&self, _record: &Item) -> Result<(), LocalStoreError> {
		Err(LocalStoreError::Unavailable("disk full".to_string()))
	}

	fn delete(&self, _id: &str) -> Result<(), LocalStoreError> {
		Err(LocalStoreError::Unavailable("disk full".to_string()))
	}

	fn clear(&self) -> Result<(), LocalStoreError> {
		Ok(())
	}
}

pub struct Harness {
	pub engine: SyncEngine<Item>,
	pub remote: Arc<MockRemote>,
	pub local: Arc<MemoryLocalStore<Item>>,
	pub events: Arc<RecordingEventBus>,
}

impl Harness {
	/// Starts an engine against `remote` and waits for the startup jobs.
	pub async fn start(remote: Arc<MockRemote>) -> Self {
		Self::start_with(remote, SyncConfig::new(COLLECTION), Vec::new()).await
	}

	pub async fn start_with(remote: Arc<MockRemote>, config: SyncConfig, seed: Vec<Item>) -> Self {
		let local = Arc::new(MemoryLocalStore::with_records(seed));
		let events = RecordingEventBus::new();

		let engine = SyncEngine::builder(config, Arc::clone(&local))
			.remote(remote.clone())
			.event_bus(events.clone())
			.start()
			.await
			.unwrap();
		engine.wait_idle().await;

		Self {
			engine,
			remote,
			local,
			events,
		}
	}

	/// Local contents, read without triggering a refresh.
	pub fn local_items(&self) -> Vec<Item> {
		self.local.get_all().unwrap()
	}

	pub fn local_ids(&self) -> Vec<String> {
		self.local_items().into_iter().map(|item| item.id).collect()
	}

	pub async fn pending_ids(&self) -> Vec<String> {
		self
			.engine
			.pending_entries()
			.await
			.into_iter()
			.map(|entry| entry.id)
			.collect()
	}
}

pub fn upserted(items: &[Item]) -> ChangeEvent<Item> {
	ChangeEvent::Batch(items.iter().cloned().map(RemoteChange::Upserted).collect())
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
	let deadline = Instant::now() + Duration::from_secs(2);
	while !condition() {
		assert!(Instant::now() < deadline, "timed out waiting for {what}");
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
}
