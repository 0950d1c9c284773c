// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runtime configuration types with resolved defaults.

use std::time::Duration;

use ephemera_common_secret::SecretString;
use serde::Serialize;

use crate::layer::*;
use crate::paths::PathsConfig;

pub const DEFAULT_VAULT_ADDRESS: &str = "http://127.0.0.1:8200";
pub const DEFAULT_VAULT_ROLE: &str = "my-admin-role";
pub const DEFAULT_VAULT_MOUNT: &str = "database";
pub const DEFAULT_DATABASE_HOST: &str = "127.0.0.1";
pub const DEFAULT_DATABASE_PORT: u16 = 3306;
pub const DEFAULT_WARNING_BUFFER_SECS: u64 = 10;
pub const DEFAULT_MONITOR_SHUTDOWN_GRACE_MS: u64 = 2_000;

/// The final, validated configuration.
#[derive(Debug, Clone, Serialize)]
pub struct EphemeraConfig {
	pub vault: VaultConfig,
	pub database: DatabaseConfig,
	pub lease: LeaseConfig,
	pub logging: LoggingConfig,

	#[serde(skip)]
	pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct VaultConfig {
	pub address: String,
	/// Absent here is not a load error; the session refuses to start without it.
	pub token: Option<SecretString>,
	pub role: String,
	pub mount: String,
	pub allow_insecure: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseConfig {
	pub host: String,
	pub port: u16,
	pub database: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaseConfig {
	pub warning_buffer: Duration,
	/// How long teardown waits for the monitor task before abandoning it.
	pub monitor_shutdown_grace: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingConfig {
	pub level: LogLevel,
	pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Error,
	Warn,
	#[default]
	Info,
	Debug,
	Trace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	#[default]
	Pretty,
	Json,
	Compact,
}

impl Default for VaultConfig {
	fn default() -> Self {
		Self {
			address: DEFAULT_VAULT_ADDRESS.to_string(),
			token: None,
			role: DEFAULT_VAULT_ROLE.to_string(),
			mount: DEFAULT_VAULT_MOUNT.to_string(),
			allow_insecure: false,
		}
	}
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			host: DEFAULT_DATABASE_HOST.to_string(),
			port: DEFAULT_DATABASE_PORT,
			database: None,
		}
	}
}

impl Default for LeaseConfig {
	fn default() -> Self {
		Self {
			warning_buffer: Duration::from_secs(DEFAULT_WARNING_BUFFER_SECS),
			monitor_shutdown_grace: Duration::from_millis(DEFAULT_MONITOR_SHUTDOWN_GRACE_MS),
		}
	}
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: LogLevel::Info,
			format: LogFormat::Pretty,
		}
	}
}

impl EphemeraConfig {
	/// Build runtime config from a merged layer and paths.
	pub fn from_layer(layer: ConfigLayer, paths: PathsConfig) -> Self {
		Self {
			vault: build_vault_config(layer.vault),
			database: build_database_config(layer.database),
			lease: build_lease_config(layer.lease),
			logging: build_logging_config(layer.logging),
			paths,
		}
	}
}

fn build_vault_config(layer: Option<VaultLayer>) -> VaultConfig {
	let layer = layer.unwrap_or_default();
	let defaults = VaultConfig::default();
	VaultConfig {
		address: layer.address.unwrap_or(defaults.address),
		token: layer.token,
		role: layer.role.unwrap_or(defaults.role),
		mount: layer.mount.unwrap_or(defaults.mount),
		allow_insecure: layer.allow_insecure.unwrap_or(defaults.allow_insecure),
	}
}

fn build_database_config(layer: Option<DatabaseLayer>) -> DatabaseConfig {
	let layer = layer.unwrap_or_default();
	DatabaseConfig {
		host: layer
			.host
			.unwrap_or_else(|| DEFAULT_DATABASE_HOST.to_string()),
		port: layer.port.unwrap_or(DEFAULT_DATABASE_PORT),
		database: layer.database.filter(|db| !db.is_empty()),
	}
}

fn build_lease_config(layer: Option<LeaseLayer>) -> LeaseConfig {
	let layer = layer.unwrap_or_default();
	LeaseConfig {
		warning_buffer: Duration::from_secs(
			layer
				.warning_buffer_secs
				.unwrap_or(DEFAULT_WARNING_BUFFER_SECS),
		),
		monitor_shutdown_grace: Duration::from_millis(
			layer
				.monitor_shutdown_grace_ms
				.unwrap_or(DEFAULT_MONITOR_SHUTDOWN_GRACE_MS),
		),
	}
}

fn build_logging_config(layer: Option<LoggingLayer>) -> LoggingConfig {
	let layer = layer.unwrap_or_default();
	LoggingConfig {
		level: parse_log_level(layer.level.as_deref()),
		format: parse_log_format(layer.format.as_deref()),
	}
}

fn parse_log_level(s: Option<&str>) -> LogLevel {
	match s {
		Some("error") => LogLevel::Error,
		Some("warn") => LogLevel::Warn,
		Some("info") => LogLevel::Info,
		Some("debug") => LogLevel::Debug,
		Some("trace") => LogLevel::Trace,
		_ => LogLevel::Info,
	}
}

fn parse_log_format(s: Option<&str>) -> LogFormat {
	match s {
		Some("json") => LogFormat::Json,
		Some("compact") => LogFormat::Compact,
		Some("pretty") => LogFormat::Pretty,
		_ => LogFormat::Pretty,
	}
}
