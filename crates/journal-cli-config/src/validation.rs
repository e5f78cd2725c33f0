// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration validation rules.

use tracing::warn;

use crate::runtime::JournalConfig;
use crate::ConfigError;

pub fn validate_config(config: &JournalConfig) -> Result<(), ConfigError> {
	if config.data_dir.as_os_str().is_empty() {
		return Err(ConfigError::invalid_value("data_dir", "cannot be empty"));
	}

	if config.sync.remote_timeout_ms == 0 {
		return Err(ConfigError::invalid_value(
			"sync.remote_timeout_ms",
			"must be greater than zero",
		));
	}

	if let Some(remote) = &config.remote {
		if !matches!(remote.base_url.scheme(), "http" | "https") {
			return Err(ConfigError::invalid_value(
				"remote.base_url",
				format!("unsupported scheme '{}'", remote.base_url.scheme()),
			));
		}
		if remote.request_timeout_secs == 0 {
			return Err(ConfigError::invalid_value(
				"remote.request_timeout_secs",
				"must be greater than zero",
			));
		}
		if remote.max_retry_attempts == 0 {
			return Err(ConfigError::invalid_value(
				"remote.max_retry_attempts",
				"must be at least 1",
			));
		}
		if remote.auth_token.is_none() {
			warn!(base_url = %remote.base_url, "remote configured without an auth_token");
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::paths::PathsConfig;
	use crate::runtime::{RemoteConfig, SyncSection};
	use url::Url;

	fn config() -> JournalConfig {
		JournalConfig {
			data_dir: "/tmp/journal".into(),
			remote: Some(RemoteConfig {
				base_url: Url::parse("https://journal.example/").unwrap(),
				auth_token: Some("tok".to_string()),
				request_timeout_secs: 30,
				max_retry_attempts: 3,
			}),
			sync: SyncSection::default(),
			paths: PathsConfig {
				user_config_file: "/tmp/journal/config.toml".into(),
				data_dir: "/tmp/journal".into(),
			},
		}
	}

	#[test]
	fn test_valid_config_passes() {
		assert!(validate_config(&config()).is_ok());
	}

	#[test]
	fn test_zero_timeouts_are_rejected() {
		let mut cfg = config();
		cfg.sync.remote_timeout_ms = 0;
		assert!(validate_config(&cfg).is_err());

		let mut cfg = config();
		if let Some(remote) = cfg.remote.as_mut() {
			remote.request_timeout_secs = 0;
		}
		assert!(validate_config(&cfg).is_err());
	}

	#[test]
	fn test_non_http_scheme_is_rejected() {
		let mut cfg = config();
		if let Some(remote) = cfg.remote.as_mut() {
			remote.base_url = Url::parse("ftp://journal.example/").unwrap();
		}
		let err = validate_config(&cfg).unwrap_err();
		assert!(err.to_string().contains("unsupported scheme"));
	}
}
