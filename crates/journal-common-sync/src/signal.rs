// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Process-wide signals that trigger an outbox flush.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
	Online,
	Offline,
}

/// Request to flush now. `collection: None` targets every engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceSync {
	pub collection: Option<String>,
}

impl ForceSync {
	pub fn all() -> Self {
		Self { collection: None }
	}

	pub fn collection(name: impl Into<String>) -> Self {
		Self {
			collection: Some(name.into()),
		}
	}

	pub fn targets(&self, collection: &str) -> bool {
		self
			.collection
			.as_deref()
			.map_or(true, |target| target == collection)
	}
}

/// Shared by every engine in a process. Cloning yields another handle to
/// the same signals.
#[derive(Debug, Clone)]
pub struct SyncSignals {
	connectivity: Arc<watch::Sender<Connectivity>>,
	force: broadcast::Sender<ForceSync>,
}

impl SyncSignals {
	pub fn new(initial: Connectivity) -> Self {
		let (connectivity, _) = watch::channel(initial);
		let (force, _) = broadcast::channel(16);
		Self {
			connectivity: Arc::new(connectivity),
			force,
		}
	}

	/// Records the current connectivity. Only actual transitions wake
	/// listeners.
	pub fn set_connectivity(&self, value: Connectivity) {
		let changed = self.connectivity.send_if_modified(|current| {
			if *current == value {
				false
			} else {
				*current = value;
				true
			}
		});
		if changed {
			info!(connectivity = ?value, "connectivity changed");
		}
	}

	pub fn connectivity(&self) -> Connectivity {
		*self.connectivity.borrow()
	}

	pub fn force_sync(&self, request: ForceSync) {
		debug!(collection = ?request.collection, "force sync requested");
		let _ = self.force.send(request);
	}

	pub fn subscribe(&self) -> SignalReceivers {
		SignalReceivers {
			connectivity: self.connectivity.subscribe(),
			force: self.force.subscribe(),
		}
	}
}

impl Default for SyncSignals {
	fn default() -> Self {
		Self::new(Connectivity::Online)
	}
}

/// One engine's view of [`SyncSignals`].
#[derive(Debug)]
pub struct SignalReceivers {
	pub connectivity: watch::Receiver<Connectivity>,
	pub force: broadcast::Receiver<ForceSync>,
}
