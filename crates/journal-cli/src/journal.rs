// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Composition root: one sync engine per collection, sharing the event bus
//! and the connectivity/force-sync signals.

use std::sync::Arc;

use anyhow::{Context, Result};
use journal_cli_config::JournalConfig;
use journal_common_http::RetryConfig;
use journal_common_sync::{
	BroadcastEventBus, Connectivity, FileLocalStore, JsonFileOutboxStorage, SyncConfig, SyncEngine,
	SyncRecord, SyncSignals,
};
use journal_models::{Analysis, Trade, ANALYSES, TRADES};
use journal_remote_http::HttpRemoteStore;
use tracing::info;

/// Records the CLI can create from user-supplied JSON.
pub trait JournalRecord: SyncRecord {
	fn generate_id() -> String;
}

impl JournalRecord for Trade {
	fn generate_id() -> String {
		Trade::generate_id()
	}
}

impl JournalRecord for Analysis {
	fn generate_id() -> String {
		Analysis::generate_id()
	}
}

pub struct Journal {
	pub trades: SyncEngine<Trade>,
	pub analyses: SyncEngine<Analysis>,
	pub events: Arc<BroadcastEventBus>,
	pub signals: SyncSignals,
}

impl Journal {
	pub async fn open(config: &JournalConfig) -> Result<Self> {
		let signals = SyncSignals::new(if config.sync.offline {
			Connectivity::Offline
		} else {
			Connectivity::Online
		});
		let events = Arc::new(BroadcastEventBus::default());

		let http = match &config.remote {
			Some(remote) => Some(
				journal_common_http::new_client_with_timeout(remote.request_timeout())
					.context("failed to build HTTP client")?,
			),
			None => None,
		};

		let trades = start_engine::<Trade>(TRADES, config, http.as_ref(), &events, &signals).await?;
		let analyses =
			start_engine::<Analysis>(ANALYSES, config, http.as_ref(), &events, &signals).await?;

		info!(
			data_dir = %config.data_dir.display(),
			remote = trades.has_remote(),
			offline = config.sync.offline,
			"journal opened"
		);

		Ok(Self {
			trades,
			analyses,
			events,
			signals,
		})
	}

	/// Waits for bootstrap, refreshes and flushes dispatched so far.
	pub async fn settle(&self) {
		tokio::join!(self.trades.wait_idle(), self.analyses.wait_idle());
	}

	pub async fn shutdown(&self) {
		self.settle().await;
		tokio::join!(self.trades.shutdown(), self.analyses.shutdown());
	}
}

async fn start_engine<T: SyncRecord>(
	collection: &str,
	config: &JournalConfig,
	http: Option<&reqwest::Client>,
	events: &Arc<BroadcastEventBus>,
	signals: &SyncSignals,
) -> Result<SyncEngine<T>> {
	let sync_config = SyncConfig::new(collection)
		.with_remote_timeout(Some(config.sync.remote_timeout()))
		.with_flush_on_start(config.sync.flush_on_start);

	let local = FileLocalStore::<T>::open(&config.data_dir, collection)
		.with_context(|| format!("failed to open local store for {collection}"))?;

	let mut builder = SyncEngine::builder(sync_config, local)
		.outbox_storage(JsonFileOutboxStorage::<T>::for_collection(
			&config.data_dir,
			collection,
		))
		.event_bus(events.clone())
		.signals(signals.clone());

	if let (Some(remote), Some(http)) = (&config.remote, http) {
		let retry = RetryConfig {
			max_attempts: remote.max_retry_attempts,
			..Default::default()
		};
		let mut store = HttpRemoteStore::<T>::new(remote.base_url.clone(), collection, http.clone())
			.with_retry_config(retry);
		if let Some(token) = &remote.auth_token {
			store = store.with_auth_token(token.clone());
		}
		builder = builder.remote(Arc::new(store));
	}

	builder
		.start()
		.await
		.with_context(|| format!("failed to start sync engine for {collection}"))
}
