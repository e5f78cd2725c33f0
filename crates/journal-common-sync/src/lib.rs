// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Offline-first synchronization engine.
//!
//! A [`SyncEngine`] keeps a fast local replica of one collection consistent
//! with an authoritative [`RemoteStore`]. Writes go to the remote first and
//! fall back to the local replica plus a durable [`Outbox`] when the remote
//! is unreachable. Reads are served from the [`LocalStore`] and refreshed in
//! the background. Remote change notifications are mirrored into the local
//! replica as they arrive.
//!
//! The engine is generic over the record type and is instantiated once per
//! collection.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
mod mirror;
pub mod outbox;
pub mod record;
pub mod remote;
pub mod signal;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncEngineBuilder};
pub use error::{LocalStoreError, OutboxError, RecordError, RemoteError, SyncError};
pub use events::{BroadcastEventBus, ChangeSource, EventBus, NoopEventBus, SyncEvent, SyncStatus};
pub use outbox::{
	FlushReport, JsonFileOutboxStorage, MemoryOutboxStorage, Outbox, OutboxEntry, OutboxOperation,
	OutboxStorage,
};
pub use record::{validate_id, SyncRecord};
pub use remote::{ChangeEvent, RemoteChange, RemoteStore, Subscription};
pub use signal::{Connectivity, ForceSync, SignalReceivers, SyncSignals};
pub use store::{FileLocalStore, LocalStore, MemoryLocalStore};
