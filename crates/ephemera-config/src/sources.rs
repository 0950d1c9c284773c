// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: files, environment, CLI, defaults.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, trace};

use crate::env::load_secret_with;
use crate::layer::*;
use crate::paths::PathsConfig;
use crate::ConfigError;

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	SystemFile = 20,
	UserFile = 30,
	ExplicitFile = 40,
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

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		// Defaults are applied when the runtime config is built.
		Ok(ConfigLayer::default())
	}
}

/// File-based configuration source (TOML).
pub struct FileSource {
	path: PathBuf,
	precedence: Precedence,
	name: &'static str,
	required: bool,
}

impl FileSource {
	/// System config: /etc/ephemera/config.toml
	pub fn system(paths: &PathsConfig) -> Self {
		Self {
			path: paths.system_config_file.clone(),
			precedence: Precedence::SystemFile,
			name: "system-config",
			required: false,
		}
	}

	/// User config: ~/.config/ephemera/config.toml
	pub fn user(paths: &PathsConfig) -> Self {
		Self {
			path: paths.user_config_file.clone(),
			precedence: Precedence::UserFile,
			name: "user-config",
			required: false,
		}
	}

	/// File named with `--config`; it must exist.
	pub fn explicit(path: PathBuf) -> Self {
		Self {
			path,
			precedence: Precedence::ExplicitFile,
			name: "explicit-config",
			required: true,
		}
	}

	pub fn is_required(&self) -> bool {
		self.required
	}
}

impl ConfigSource for FileSource {
	fn name(&self) -> &'static str {
		self.name
	}
	fn precedence(&self) -> Precedence {
		self.precedence
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		if !self.path.exists() {
			if self.required {
				return Err(ConfigError::invalid_value(
					"config",
					format!("{} does not exist", self.path.display()),
				));
			}
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
/// Reads the conventional Vault and MySQL variables plus `EPHEMERA_*`
/// overrides. The token supports `VAULT_TOKEN_FILE`.
pub struct EnvSource {
	vars: Option<HashMap<String, String>>,
}

impl EnvSource {
	/// Read from the process environment.
	pub fn process() -> Self {
		Self { vars: None }
	}

	/// Read from a fixed set of variables instead of the process environment.
	pub fn from_vars(vars: HashMap<String, String>) -> Self {
		Self { vars: Some(vars) }
	}

	fn get(&self, key: &str) -> Option<String> {
		let value = match &self.vars {
			Some(vars) => vars.get(key).cloned(),
			None => std::env::var(key).ok(),
		}?;
		let value = value.trim().to_string();
		(!value.is_empty()).then_some(value)
	}
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
		let mut layer = ConfigLayer::default();

		if let Some(token) = load_secret_with("VAULT_TOKEN", |k| self.get(k))? {
			trace!("loaded Vault token from environment");
			vault(&mut layer).token = Some(token);
		}
		if let Some(address) = self.get("VAULT_ADDR") {
			vault(&mut layer).address = Some(address);
		}
		if let Some(role) = self.get("EPHEMERA_VAULT_ROLE") {
			vault(&mut layer).role = Some(role);
		}
		if let Some(mount) = self.get("EPHEMERA_VAULT_MOUNT") {
			vault(&mut layer).mount = Some(mount);
		}
		if let Some(flag) = self.get("EPHEMERA_VAULT_ALLOW_INSECURE") {
			vault(&mut layer).allow_insecure = Some(flag == "1" || flag.eq_ignore_ascii_case("true"));
		}

		if let Some(host) = self.get("MYSQL_HOST") {
			database(&mut layer).host = Some(host);
		}
		if let Some(port) = self.get("MYSQL_PORT") {
			let port = port
				.parse()
				.map_err(|_| ConfigError::Env(format!("MYSQL_PORT is not a valid port: {port}")))?;
			database(&mut layer).port = Some(port);
		}
		if let Some(db) = self.get("MYSQL_DATABASE") {
			database(&mut layer).database = Some(db);
		}

		if let Some(secs) = self.get("EPHEMERA_WARNING_BUFFER_SECS") {
			let secs = secs.parse().map_err(|_| {
				ConfigError::Env(format!("EPHEMERA_WARNING_BUFFER_SECS is not a number: {secs}"))
			})?;
			layer
				.lease
				.get_or_insert_with(LeaseLayer::default)
				.warning_buffer_secs = Some(secs);
		}

		if let Some(level) = self.get("EPHEMERA_LOG_LEVEL") {
			layer
				.logging
				.get_or_insert_with(LoggingLayer::default)
				.level = Some(level);
		}
		if let Some(format) = self.get("EPHEMERA_LOG_FORMAT") {
			layer
				.logging
				.get_or_insert_with(LoggingLayer::default)
				.format = Some(format);
		}

		Ok(layer)
	}
}

fn vault(layer: &mut ConfigLayer) -> &mut VaultLayer {
	layer.vault.get_or_insert_with(VaultLayer::default)
}

fn database(layer: &mut ConfigLayer) -> &mut DatabaseLayer {
	layer.database.get_or_insert_with(DatabaseLayer::default)
}

/// CLI argument overrides.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
	pub config_file: Option<PathBuf>,
	pub vault_address: Option<String>,
	pub role: Option<String>,
	pub allow_insecure: bool,
	pub db_host: Option<String>,
	pub db_port: Option<u16>,
	pub database: Option<String>,
	pub warning_buffer_secs: Option<u64>,
	pub log_level: Option<String>,
	pub log_format: Option<String>,
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
		let o = &self.overrides;
		let mut layer = ConfigLayer::default();

		if let Some(ref address) = o.vault_address {
			vault(&mut layer).address = Some(address.clone());
		}
		if let Some(ref role) = o.role {
			vault(&mut layer).role = Some(role.clone());
		}
		// The flag can only turn the relaxation on, never force it off.
		if o.allow_insecure {
			vault(&mut layer).allow_insecure = Some(true);
		}

		if let Some(ref host) = o.db_host {
			database(&mut layer).host = Some(host.clone());
		}
		if let Some(port) = o.db_port {
			database(&mut layer).port = Some(port);
		}
		if let Some(ref db) = o.database {
			database(&mut layer).database = Some(db.clone());
		}

		if let Some(secs) = o.warning_buffer_secs {
			layer
				.lease
				.get_or_insert_with(LeaseLayer::default)
				.warning_buffer_secs = Some(secs);
		}

		if let Some(ref level) = o.log_level {
			layer
				.logging
				.get_or_insert_with(LoggingLayer::default)
				.level = Some(level.clone());
		}
		if let Some(ref format) = o.log_format {
			layer
				.logging
				.get_or_insert_with(LoggingLayer::default)
				.format = Some(format.clone());
		}

		Ok(layer)
	}
}
