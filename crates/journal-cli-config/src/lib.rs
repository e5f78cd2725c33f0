// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration management for the trade journal CLI.
//!
//! This crate provides:
//! - XDG Base Directory compliant path resolution
//! - Layered configuration from defaults, a TOML file, `JOURNAL_*`
//!   environment variables and CLI flags
//! - Configuration validation

pub mod error;
pub mod layer;
pub mod paths;
pub mod registry;
pub mod runtime;
pub mod sources;
pub mod validation;

use std::path::PathBuf;

pub use error::ConfigError;
pub use layer::ConfigLayer;
pub use paths::PathsConfig;
pub use registry::ConfigRegistry;
pub use runtime::{JournalConfig, RemoteConfig, SyncSection};
pub use sources::{CliOverrides, ConfigSource, Precedence};

/// Load configuration from all sources with CLI overrides applied last.
///
/// `config_file` replaces the XDG user config file when given.
pub fn load_config_with_cli(
	cli: CliOverrides,
	config_file: Option<PathBuf>,
) -> Result<JournalConfig, ConfigError> {
	let paths = paths::resolve_xdg_paths()?;

	let file = match config_file {
		Some(path) => sources::FileSource::custom(path),
		None => sources::FileSource::user(&paths),
	};

	let mut registry = ConfigRegistry::new();
	registry.register(Box::new(sources::DefaultsSource));
	registry.register(Box::new(file));
	registry.register(Box::new(sources::EnvSource::process()));
	registry.register(Box::new(sources::CliSource::new(cli)));

	registry.load(paths)
}
