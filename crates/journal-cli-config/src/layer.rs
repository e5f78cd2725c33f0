// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration layer for merging from multiple sources.

use serde::Deserialize;
use std::path::PathBuf;

/// Partial configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
	#[serde(default)]
	pub data_dir: Option<PathBuf>,
	#[serde(default)]
	pub remote: Option<RemoteLayer>,
	#[serde(default)]
	pub sync: Option<SyncLayer>,
}

#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteLayer {
	#[serde(default)]
	pub base_url: Option<String>,
	#[serde(default)]
	pub auth_token: Option<String>,
	#[serde(default)]
	pub request_timeout_secs: Option<u64>,
	#[serde(default)]
	pub max_retry_attempts: Option<u32>,
	/// `false` forces local-only mode even when a URL is configured.
	#[serde(default)]
	pub enabled: Option<bool>,
}

impl std::fmt::Debug for RemoteLayer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RemoteLayer")
			.field("base_url", &self.base_url)
			.field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
			.field("request_timeout_secs", &self.request_timeout_secs)
			.field("max_retry_attempts", &self.max_retry_attempts)
			.field("enabled", &self.enabled)
			.finish()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncLayer {
	#[serde(default)]
	pub remote_timeout_ms: Option<u64>,
	#[serde(default)]
	pub flush_on_start: Option<bool>,
	/// Start with connectivity reported offline.
	#[serde(default)]
	pub offline: Option<bool>,
}

impl ConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ConfigLayer) {
		if other.data_dir.is_some() {
			self.data_dir = other.data_dir;
		}
		merge_option(&mut self.remote, other.remote, RemoteLayer::merge);
		merge_option(&mut self.sync, other.sync, SyncLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

impl RemoteLayer {
	fn merge(&mut self, other: RemoteLayer) {
		if other.base_url.is_some() {
			self.base_url = other.base_url;
		}
		if other.auth_token.is_some() {
			self.auth_token = other.auth_token;
		}
		if other.request_timeout_secs.is_some() {
			self.request_timeout_secs = other.request_timeout_secs;
		}
		if other.max_retry_attempts.is_some() {
			self.max_retry_attempts = other.max_retry_attempts;
		}
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
	}
}

impl SyncLayer {
	fn merge(&mut self, other: SyncLayer) {
		if other.remote_timeout_ms.is_some() {
			self.remote_timeout_ms = other.remote_timeout_ms;
		}
		if other.flush_on_start.is_some() {
			self.flush_on_start = other.flush_on_start;
		}
		if other.offline.is_some() {
			self.offline = other.offline;
		}
	}
}
