// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Derived sync state of one collection. Broadcast only, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SyncStatus {
	/// No remote store is configured.
	Local,
	/// The last remote operation succeeded and nothing is queued.
	Online,
	/// Writes are waiting in the outbox.
	Queued { count: usize },
}

impl SyncStatus {
	pub fn from_pending(count: usize) -> Self {
		if count == 0 {
			SyncStatus::Online
		} else {
			SyncStatus::Queued { count }
		}
	}
}

impl fmt::Display for SyncStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncStatus::Local => write!(f, "local"),
			SyncStatus::Online => write!(f, "online"),
			SyncStatus::Queued { count } => write!(f, "queued ({count})"),
		}
	}
}

/// Why the local replica changed underneath its readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
	/// A batch from the real-time change feed.
	Remote,
	/// A background refresh after a local read.
	Refresh,
	/// The initial pull at startup.
	Bootstrap,
}

impl fmt::Display for ChangeSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ChangeSource::Remote => write!(f, "remote"),
			ChangeSource::Refresh => write!(f, "refresh"),
			ChangeSource::Bootstrap => write!(f, "bootstrap"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
	ItemsChanged {
		collection: String,
		source: ChangeSource,
	},
	StatusChanged {
		collection: String,
		status: SyncStatus,
	},
}

impl SyncEvent {
	/// `<collection>:changed` or `<collection>:status`.
	pub fn topic(&self) -> String {
		match self {
			SyncEvent::ItemsChanged { collection, .. } => format!("{collection}:changed"),
			SyncEvent::StatusChanged { collection, .. } => format!("{collection}:status"),
		}
	}

	pub fn collection(&self) -> &str {
		match self {
			SyncEvent::ItemsChanged { collection, .. } | SyncEvent::StatusChanged { collection, .. } => {
				collection
			}
		}
	}
}

/// Best-effort publish/subscribe sink. Publishing never blocks and never
/// fails; events may be dropped.
pub trait EventBus: Send + Sync {
	fn publish(&self, event: SyncEvent);
}

impl<E: EventBus + ?Sized> EventBus for Arc<E> {
	fn publish(&self, event: SyncEvent) {
		(**self).publish(event)
	}
}

/// Event bus backed by a tokio broadcast channel. Slow subscribers lag and
/// lose the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
	sender: broadcast::Sender<SyncEvent>,
}

impl BroadcastEventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
		self.sender.subscribe()
	}
}

impl Default for BroadcastEventBus {
	fn default() -> Self {
		Self::new(256)
	}
}

impl EventBus for BroadcastEventBus {
	fn publish(&self, event: SyncEvent) {
		let topic = event.topic();
		// No receivers is not an error for a fire-and-forget bus.
		let delivered = self.sender.send(event).unwrap_or(0);
		trace!(topic = %topic, receivers = delivered, "published sync event");
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventBus;

impl EventBus for NoopEventBus {
	fn publish(&self, _event: SyncEvent) {}
}
