// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Server-sent change feed for one remote collection.
//!
//! Each SSE event carries a JSON frame `{"upserted": [...], "removed": [...]}`
//! which is forwarded to the subscriber as a single batch. The connection is
//! re-established with capped exponential backoff until the subscription is
//! dropped.

use std::time::Duration;

use eventsource_stream::{Event, Eventsource};
use futures::StreamExt;
use journal_common_sync::{ChangeEvent, RemoteChange, SyncRecord};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::client::{apply_auth, status_error};
use crate::error::HttpRemoteError;

/// Reconnection behavior of the change feed.
#[derive(Debug, Clone)]
pub struct StreamConfig {
	pub reconnect_base_delay: Duration,
	pub reconnect_max_delay: Duration,
	/// Events buffered for a slow subscriber.
	pub buffer: usize,
}

impl Default for StreamConfig {
	fn default() -> Self {
		Self {
			reconnect_base_delay: Duration::from_secs(1),
			reconnect_max_delay: Duration::from_secs(30),
			buffer: 64,
		}
	}
}

impl StreamConfig {
	pub fn reconnect_delay(&self, consecutive_failures: u32) -> Duration {
		let factor = 2u32.saturating_pow(consecutive_failures.min(10));
		self
			.reconnect_base_delay
			.saturating_mul(factor)
			.min(self.reconnect_max_delay)
	}
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: SyncRecord"))]
struct ChangeFrame<T> {
	#[serde(default)]
	upserted: Vec<T>,
	#[serde(default)]
	removed: Vec<String>,
}

impl<T> ChangeFrame<T> {
	fn into_changes(self) -> Vec<RemoteChange<T>> {
		self
			.upserted
			.into_iter()
			.map(RemoteChange::Upserted)
			.chain(self.removed.into_iter().map(RemoteChange::Removed))
			.collect()
	}
}

/// Decodes one SSE event. Comments, heartbeats and empty frames yield `None`.
fn decode_event<T: SyncRecord>(event: &Event) -> Result<Option<Vec<RemoteChange<T>>>, HttpRemoteError> {
	if event.data.is_empty() || event.event == "heartbeat" {
		return Ok(None);
	}

	let frame: ChangeFrame<T> =
		serde_json::from_str(&event.data).map_err(|e| HttpRemoteError::Decode(e.to_string()))?;
	let changes = frame.into_changes();
	if changes.is_empty() {
		return Ok(None);
	}
	Ok(Some(changes))
}

pub(crate) struct ChangeStream<T> {
	pub(crate) url: Url,
	pub(crate) http: reqwest::Client,
	pub(crate) auth_token: Option<String>,
	pub(crate) config: StreamConfig,
	pub(crate) sender: mpsc::Sender<ChangeEvent<T>>,
	pub(crate) cancel: CancellationToken,
}

impl<T: SyncRecord> ChangeStream<T> {
	pub(crate) async fn run(self) {
		let mut consecutive_failures: u32 = 0;

		loop {
			info!(url = %self.url, "connecting to change stream");

			let result = tokio::select! {
				_ = self.cancel.cancelled() => break,
				result = self.connect_and_forward() => result,
			};

			match result {
				Ok(()) => {
					debug!(url = %self.url, "change stream ended");
					consecutive_failures = 0;
				}
				Err(e) => {
					consecutive_failures = consecutive_failures.saturating_add(1);
					error!(url = %self.url, error = %e, attempts = consecutive_failures, "change stream error");
					if !self.deliver(ChangeEvent::Error(e.to_string())).await {
						break;
					}
				}
			}

			let delay = self.config.reconnect_delay(consecutive_failures);
			debug!(delay_ms = delay.as_millis() as u64, "reconnecting to change stream");

			tokio::select! {
				_ = self.cancel.cancelled() => break,
				_ = tokio::time::sleep(delay) => {}
			}
		}

		info!(url = %self.url, "change stream closed");
	}

	/// Returns false once the subscriber is gone.
	async fn deliver(&self, event: ChangeEvent<T>) -> bool {
		tokio::select! {
			_ = self.cancel.cancelled() => false,
			sent = self.sender.send(event) => sent.is_ok(),
		}
	}

	async fn connect_and_forward(&self) -> Result<(), HttpRemoteError> {
		let req = self
			.http
			.get(self.url.clone())
			.header("Accept", "text/event-stream")
			.header("Cache-Control", "no-cache");
		let response = apply_auth(req, self.auth_token.as_deref()).send().await?;

		let status = response.status();
		if !status.is_success() {
			return Err(status_error(status, response).await);
		}

		info!(url = %self.url, "change stream established");

		let mut events = response.bytes_stream().eventsource();
		while let Some(event) = events.next().await {
			let event = event.map_err(|e| HttpRemoteError::Stream(e.to_string()))?;
			let outcome = match decode_event::<T>(&event) {
				Ok(Some(changes)) => {
					debug!(count = changes.len(), "received remote changes");
					ChangeEvent::Batch(changes)
				}
				Ok(None) => continue,
				Err(e) => {
					warn!(data = %event.data, error = %e, "failed to decode change event");
					ChangeEvent::Error(e.to_string())
				}
			};
			if !self.deliver(outcome).await {
				return Ok(());
			}
		}

		Ok(())
	}
}
