// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: files, environment, CLI, defaults.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::layer::*;
use crate::paths::PathsConfig;
use crate::ConfigError;

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	UserFile = 30,
	Environment = 50,
	Cli = 60,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	/// Name for logging
	fn name(&self) -> &'static str;

	fn precedence(&self) -> Precedence;

	fn load(&self) -> Result<ConfigLayer, ConfigError>;
}

/// Built-in defaults source. Defaults are applied when the merged layer is
/// resolved, so this contributes an empty layer.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ConfigLayer::default())
	}
}

/// File-based configuration source (TOML). A missing file is an empty layer.
pub struct FileSource {
	path: PathBuf,
	name: &'static str,
}

impl FileSource {
	/// User config: ~/.config/journal/config.toml
	pub fn user(paths: &PathsConfig) -> Self {
		Self {
			path: paths.user_config_file.clone(),
			name: "user-config",
		}
	}

	/// An explicitly chosen file, taking the place of the user config.
	pub fn custom(path: PathBuf) -> Self {
		Self {
			path,
			name: "custom-config",
		}
	}
}

impl ConfigSource for FileSource {
	fn name(&self) -> &'static str {
		self.name
	}
	fn precedence(&self) -> Precedence {
		Precedence::UserFile
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), source = self.name, "config file not found, skipping");
			return Ok(ConfigLayer::default());
		}

		debug!(path = %self.path.display(), source = self.name, "loading config file");

		let content = std::fs::read_to_string(&self.path)?;
		let layer: ConfigLayer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!(source = self.name, "parsed config layer");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Recognized variables: `JOURNAL_DATA_DIR`, `JOURNAL_REMOTE_URL`,
/// `JOURNAL_AUTH_TOKEN`, `JOURNAL_REQUEST_TIMEOUT_SECS`,
/// `JOURNAL_MAX_RETRY_ATTEMPTS`, `JOURNAL_REMOTE_TIMEOUT_MS`,
/// `JOURNAL_FLUSH_ON_START` and `JOURNAL_OFFLINE`. Empty values are ignored.
pub struct EnvSource {
	vars: Option<Vec<(String, String)>>,
}

impl EnvSource {
	/// Reads the process environment at load time.
	pub fn process() -> Self {
		Self { vars: None }
	}

	/// Reads a fixed set of variables instead of the process environment.
	pub fn from_vars<I, K, V>(vars: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self {
			vars: Some(
				vars
					.into_iter()
					.map(|(k, v)| (k.into(), v.into()))
					.collect(),
			),
		}
	}
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
	T::Err: std::fmt::Display,
{
	value
		.parse()
		.map_err(|e: T::Err| ConfigError::Env(format!("{key}: {e}")))
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading environment variables");
		let vars = match &self.vars {
			Some(vars) => vars.clone(),
			None => std::env::vars().collect(),
		};

		let mut layer = ConfigLayer::default();

		for (key, value) in vars {
			if !key.starts_with("JOURNAL_") {
				continue;
			}

			let value = value.trim().to_string();
			if value.is_empty() {
				continue;
			}

			trace!(key = %key, "processing env var");

			match key.as_str() {
				"JOURNAL_DATA_DIR" => layer.data_dir = Some(PathBuf::from(value)),
				"JOURNAL_REMOTE_URL" => {
					layer
						.remote
						.get_or_insert_with(RemoteLayer::default)
						.base_url = Some(value);
				}
				"JOURNAL_AUTH_TOKEN" => {
					layer
						.remote
						.get_or_insert_with(RemoteLayer::default)
						.auth_token = Some(value);
				}
				"JOURNAL_REQUEST_TIMEOUT_SECS" => {
					layer
						.remote
						.get_or_insert_with(RemoteLayer::default)
						.request_timeout_secs = Some(parse_env(&key, &value)?);
				}
				"JOURNAL_MAX_RETRY_ATTEMPTS" => {
					layer
						.remote
						.get_or_insert_with(RemoteLayer::default)
						.max_retry_attempts = Some(parse_env(&key, &value)?);
				}
				"JOURNAL_REMOTE_TIMEOUT_MS" => {
					layer
						.sync
						.get_or_insert_with(SyncLayer::default)
						.remote_timeout_ms = Some(parse_env(&key, &value)?);
				}
				"JOURNAL_FLUSH_ON_START" => {
					layer
						.sync
						.get_or_insert_with(SyncLayer::default)
						.flush_on_start = Some(parse_env(&key, &value)?);
				}
				"JOURNAL_OFFLINE" => {
					layer
						.sync
						.get_or_insert_with(SyncLayer::default)
						.offline = Some(parse_env(&key, &value)?);
				}
				_ => {}
			}
		}

		Ok(layer)
	}
}

/// CLI argument overrides.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
	pub data_dir: Option<PathBuf>,
	pub remote_url: Option<String>,
	/// Queue writes for the configured remote without contacting it.
	pub offline: bool,
}

/// CLI override source.
pub struct CliSource {
	overrides: CliOverrides,
}

impl CliSource {
	pub fn new(overrides: CliOverrides) -> Self {
		Self { overrides }
	}
}

impl ConfigSource for CliSource {
	fn name(&self) -> &'static str {
		"cli"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Cli
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading CLI overrides");
		let mut layer = ConfigLayer {
			data_dir: self.overrides.data_dir.clone(),
			..Default::default()
		};

		if let Some(ref url) = self.overrides.remote_url {
			layer
				.remote
				.get_or_insert_with(RemoteLayer::default)
				.base_url = Some(url.clone());
		}

		if self.overrides.offline {
			layer
				.sync
				.get_or_insert_with(SyncLayer::default)
				.offline = Some(true);
		}

		Ok(layer)
	}
}
