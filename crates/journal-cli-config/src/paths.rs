// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! XDG Base Directory compliant path resolution.

use std::path::PathBuf;

use crate::ConfigError;

/// Resolved XDG paths for the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsConfig {
	/// User config file: ~/.config/journal/config.toml
	pub user_config_file: PathBuf,
	/// Default data directory: ~/.local/share/journal/
	pub data_dir: PathBuf,
}

impl PathsConfig {
	pub fn config_dir(&self) -> PathBuf {
		self
			.user_config_file
			.parent()
			.map(|p| p.to_path_buf())
			.unwrap_or_else(|| self.user_config_file.clone())
	}
}

/// Resolve XDG paths according to the Base Directory Specification.
///
/// Uses XDG_CONFIG_HOME and XDG_DATA_HOME when set, otherwise ~/.config and
/// ~/.local/share.
pub fn resolve_xdg_paths() -> Result<PathsConfig, ConfigError> {
	let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;

	let config_home = std::env::var_os("XDG_CONFIG_HOME")
		.map(PathBuf::from)
		.unwrap_or_else(|| home.join(".config"));

	let data_home = std::env::var_os("XDG_DATA_HOME")
		.map(PathBuf::from)
		.unwrap_or_else(|| home.join(".local/share"));

	tracing::debug!(
		config_home = %config_home.display(),
		data_home = %data_home.display(),
		"resolved XDG paths"
	);

	Ok(PathsConfig {
		user_config_file: config_home.join("journal/config.toml"),
		data_dir: data_home.join("journal"),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_resolve_xdg_paths_points_at_journal() {
		let paths = resolve_xdg_paths().unwrap();
		assert!(paths.user_config_file.ends_with("journal/config.toml"));
		assert!(paths.data_dir.ends_with("journal"));
		assert!(paths.config_dir().ends_with("journal"));
	}
}
