// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Config file locations.

use std::path::PathBuf;

use crate::ConfigError;

/// Resolved config file paths.
#[derive(Debug, Clone)]
pub struct PathsConfig {
	/// User config file: ~/.config/ephemera/config.toml
	pub user_config_file: PathBuf,
	/// System config file: /etc/ephemera/config.toml
	pub system_config_file: PathBuf,
}

impl Default for PathsConfig {
	fn default() -> Self {
		Self {
			user_config_file: PathBuf::from("~/.config/ephemera/config.toml"),
			system_config_file: PathBuf::from("/etc/ephemera/config.toml"),
		}
	}
}

/// Resolve paths using `XDG_CONFIG_HOME`, falling back to `~/.config`.
pub fn resolve_paths() -> Result<PathsConfig, ConfigError> {
	let config_home = match std::env::var_os("XDG_CONFIG_HOME") {
		Some(dir) => PathBuf::from(dir),
		None => dirs::home_dir()
			.ok_or(ConfigError::HomeDirNotFound)?
			.join(".config"),
	};

	tracing::debug!(config_home = %config_home.display(), "resolved config home");

	Ok(PathsConfig {
		user_config_file: config_home.join("ephemera/config.toml"),
		system_config_file: PathBuf::from("/etc/ephemera/config.toml"),
	})
}
