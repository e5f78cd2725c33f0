// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RemoteError;
use crate::record::SyncRecord;

/// Authoritative store for one collection.
///
/// Every call may fail or stall. The engine treats all failures alike and
/// bounds calls with [`crate::SyncConfig::remote_timeout`] when configured.
#[async_trait]
pub trait RemoteStore<T: SyncRecord>: Send + Sync {
	/// Idempotent upsert by id.
	async fn save(&self, record: &T) -> Result<(), RemoteError>;

	/// Deleting an id the remote does not know must succeed.
	async fn delete(&self, id: &str) -> Result<(), RemoteError>;

	async fn get_by_id(&self, id: &str) -> Result<Option<T>, RemoteError>;

	async fn list_all(&self) -> Result<Vec<T>, RemoteError>;

	async fn list_by_key(&self, key: &str) -> Result<Vec<T>, RemoteError>;

	/// Opens a change feed for the whole collection. Stores without
	/// real-time support return `Ok(None)`.
	async fn subscribe(&self) -> Result<Option<Subscription<T>>, RemoteError> {
		Ok(None)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteChange<T> {
	Upserted(T),
	Removed(String),
}

impl<T: SyncRecord> RemoteChange<T> {
	pub fn id(&self) -> &str {
		match self {
			RemoteChange::Upserted(record) => record.id(),
			RemoteChange::Removed(id) => id,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<T> {
	/// Changes that arrived together and should be applied as one unit.
	Batch(Vec<RemoteChange<T>>),
	/// The feed hit an error. Delivery may resume once the store reconnects.
	Error(String),
}

/// Receiving end of a remote change feed. Dropping it unsubscribes.
pub struct Subscription<T> {
	receiver: mpsc::Receiver<ChangeEvent<T>>,
	on_unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
	pub fn new(receiver: mpsc::Receiver<ChangeEvent<T>>) -> Self {
		Self {
			receiver,
			on_unsubscribe: None,
		}
	}

	/// Creates a subscription together with the sender a store feeds it from.
	pub fn channel(buffer: usize) -> (mpsc::Sender<ChangeEvent<T>>, Self) {
		let (tx, rx) = mpsc::channel(buffer.max(1));
		(tx, Self::new(rx))
	}

	/// Runs `f` when the subscription is dropped.
	pub fn on_unsubscribe(mut self, f: impl FnOnce() + Send + 'static) -> Self {
		self.on_unsubscribe = Some(Box::new(f));
		self
	}

	/// Waits for the next event. `None` means the feed has ended for good.
	pub async fn next(&mut self) -> Option<ChangeEvent<T>> {
		self.receiver.recv().await
	}
}

impl<T> Drop for Subscription<T> {
	fn drop(&mut self) {
		if let Some(f) = self.on_unsubscribe.take() {
			f();
		}
	}
}

impl<T> std::fmt::Debug for Subscription<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("closed", &self.receiver.is_closed())
			.finish()
	}
}
