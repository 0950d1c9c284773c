// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Source registry: orders sources by precedence and folds their layers.

use tracing::{debug, info};

use crate::layer::ConfigLayer;
use crate::paths::PathsConfig;
use crate::runtime::EphemeraConfig;
use crate::sources::ConfigSource;
use crate::validation::validate_config;
use crate::ConfigError;

pub struct ConfigRegistry {
	sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigRegistry {
	pub fn new() -> Self {
		Self {
			sources: Vec::new(),
		}
	}

	pub fn register(&mut self, source: Box<dyn ConfigSource>) {
		debug!(source = source.name(), precedence = ?source.precedence(), "registering config source");
		self.sources.push(source);
	}

	/// Load every source, merge lowest precedence first, then validate.
	///
	/// Optional sources that are absent yield empty layers; any other
	/// failure (unparseable file, malformed env value) aborts the load.
	pub fn load(&self, paths: PathsConfig) -> Result<EphemeraConfig, ConfigError> {
		let mut sorted: Vec<_> = self.sources.iter().collect();
		sorted.sort_by_key(|s| s.precedence());

		debug!(source_count = sorted.len(), "loading configuration");

		let mut merged = ConfigLayer::default();
		for source in sorted {
			let layer = source.load()?;
			debug!(source = source.name(), "merging config layer");
			merged.merge(layer);
		}

		let config = EphemeraConfig::from_layer(merged, paths);
		validate_config(&config)?;

		info!(
			vault_address = %config.vault.address,
			role = %config.vault.role,
			db_host = %config.database.host,
			db_port = config.database.port,
			warning_buffer_secs = config.lease.warning_buffer.as_secs(),
			"configuration loaded"
		);

		Ok(config)
	}

	pub fn source_count(&self) -> usize {
		self.sources.len()
	}
}

impl Default for ConfigRegistry {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::layer::DatabaseLayer;
	use crate::sources::{DefaultsSource, Precedence};

	struct FixedSource {
		name: &'static str,
		precedence: Precedence,
		host: &'static str,
	}

	impl ConfigSource for FixedSource {
		fn name(&self) -> &'static str {
			self.name
		}
		fn precedence(&self) -> Precedence {
			self.precedence
		}
		fn load(&self) -> Result<ConfigLayer, ConfigError> {
			Ok(ConfigLayer {
				database: Some(DatabaseLayer {
					host: Some(self.host.to_string()),
					..Default::default()
				}),
				..Default::default()
			})
		}
	}

	struct BrokenSource;

	impl ConfigSource for BrokenSource {
		fn name(&self) -> &'static str {
			"broken"
		}
		fn precedence(&self) -> Precedence {
			Precedence::Environment
		}
		fn load(&self) -> Result<ConfigLayer, ConfigError> {
			Err(ConfigError::Env("MYSQL_PORT is not a valid port: x".into()))
		}
	}

	#[test]
	fn defaults_only_loads() {
		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(DefaultsSource));
		assert_eq!(registry.source_count(), 1);

		let config = registry.load(PathsConfig::default()).unwrap();
		assert_eq!(config.database.host, "127.0.0.1");
	}

	#[test]
	fn higher_precedence_wins_regardless_of_registration_order() {
		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(FixedSource {
			name: "cli",
			precedence: Precedence::Cli,
			host: "cli-host",
		}));
		registry.register(Box::new(FixedSource {
			name: "user",
			precedence: Precedence::UserFile,
			host: "user-host",
		}));

		let config = registry.load(PathsConfig::default()).unwrap();
		assert_eq!(config.database.host, "cli-host");
	}

	#[test]
	fn source_failure_aborts_load() {
		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(DefaultsSource));
		registry.register(Box::new(BrokenSource));
		assert!(matches!(
			registry.load(PathsConfig::default()),
			Err(ConfigError::Env(_))
		));
	}
}
