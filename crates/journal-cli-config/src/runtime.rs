// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runtime configuration types with resolved defaults.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::layer::{ConfigLayer, RemoteLayer, SyncLayer};
use crate::paths::PathsConfig;
use crate::ConfigError;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;

/// The final, validated configuration for the journal.
#[derive(Debug, Clone)]
pub struct JournalConfig {
	/// Root of the local replicas and outbox files.
	pub data_dir: PathBuf,
	/// `None` runs every collection in local-only mode.
	pub remote: Option<RemoteConfig>,
	pub sync: SyncSection,
	pub paths: PathsConfig,
}

#[derive(Clone)]
pub struct RemoteConfig {
	pub base_url: Url,
	pub auth_token: Option<String>,
	pub request_timeout_secs: u64,
	pub max_retry_attempts: u32,
}

impl std::fmt::Debug for RemoteConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RemoteConfig")
			.field("base_url", &self.base_url.as_str())
			.field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
			.field("request_timeout_secs", &self.request_timeout_secs)
			.field("max_retry_attempts", &self.max_retry_attempts)
			.finish()
	}
}

impl RemoteConfig {
	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSection {
	pub remote_timeout_ms: u64,
	pub flush_on_start: bool,
	/// Writes are queued without contacting the remote until connectivity
	/// is reported back.
	pub offline: bool,
}

impl Default for SyncSection {
	fn default() -> Self {
		Self {
			remote_timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
			flush_on_start: true,
			offline: false,
		}
	}
}

impl SyncSection {
	pub fn remote_timeout(&self) -> Duration {
		Duration::from_millis(self.remote_timeout_ms)
	}
}

impl JournalConfig {
	/// Resolves a merged layer into a runtime config, filling defaults.
	pub fn from_layer(layer: ConfigLayer, paths: PathsConfig) -> Result<Self, ConfigError> {
		let data_dir = layer.data_dir.unwrap_or_else(|| paths.data_dir.clone());
		let remote = layer.remote.map(resolve_remote).transpose()?.flatten();
		let sync = resolve_sync(layer.sync.unwrap_or_default());

		Ok(Self {
			data_dir,
			remote,
			sync,
			paths,
		})
	}
}

fn resolve_remote(layer: RemoteLayer) -> Result<Option<RemoteConfig>, ConfigError> {
	if layer.enabled == Some(false) {
		return Ok(None);
	}
	let Some(raw_url) = layer.base_url else {
		return Ok(None);
	};

	let mut base_url =
		Url::parse(&raw_url).map_err(|e| ConfigError::invalid_value("remote.base_url", e.to_string()))?;
	// Collection paths are appended to the base, so it must name a directory.
	if !base_url.path().ends_with('/') {
		let path = format!("{}/", base_url.path());
		base_url.set_path(&path);
	}

	Ok(Some(RemoteConfig {
		base_url,
		auth_token: layer.auth_token,
		request_timeout_secs: layer
			.request_timeout_secs
			.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
		max_retry_attempts: layer
			.max_retry_attempts
			.unwrap_or(DEFAULT_MAX_RETRY_ATTEMPTS),
	}))
}

fn resolve_sync(layer: SyncLayer) -> SyncSection {
	let defaults = SyncSection::default();
	SyncSection {
		remote_timeout_ms: layer.remote_timeout_ms.unwrap_or(defaults.remote_timeout_ms),
		flush_on_start: layer.flush_on_start.unwrap_or(defaults.flush_on_start),
		offline: layer.offline.unwrap_or(defaults.offline),
	}
}
