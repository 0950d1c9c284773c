// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the ephemera lease session.
//!
//! Layers, lowest precedence first: built-in defaults, the system file
//! (`/etc/ephemera/config.toml`), the user file
//! (`$XDG_CONFIG_HOME/ephemera/config.toml`), an explicit `--config` file,
//! environment variables, and CLI flags.

pub mod env;
pub mod error;
pub mod layer;
pub mod paths;
pub mod registry;
pub mod runtime;
pub mod sources;
pub mod validation;

pub use env::{load_secret_env, SecretEnvError};
pub use error::ConfigError;
pub use layer::ConfigLayer;
pub use paths::PathsConfig;
pub use registry::ConfigRegistry;
pub use runtime::{
	DatabaseConfig, EphemeraConfig, LeaseConfig, LogFormat, LogLevel, LoggingConfig, VaultConfig,
};
pub use sources::{CliOverrides, ConfigSource, EnvSource, Precedence};

/// Load configuration from every source, with CLI flags on top.
pub fn load_config_with_cli(cli: CliOverrides) -> Result<EphemeraConfig, ConfigError> {
	let paths = paths::resolve_paths()?;
	load_config_from(paths, sources::EnvSource::process(), cli)
}

/// Load configuration from explicit paths and an explicit environment.
pub fn load_config_from(
	paths: PathsConfig,
	env: EnvSource,
	cli: CliOverrides,
) -> Result<EphemeraConfig, ConfigError> {
	let mut registry = ConfigRegistry::new();

	registry.register(Box::new(sources::DefaultsSource));
	registry.register(Box::new(sources::FileSource::system(&paths)));
	registry.register(Box::new(sources::FileSource::user(&paths)));
	if let Some(ref path) = cli.config_file {
		registry.register(Box::new(sources::FileSource::explicit(path.clone())));
	}
	registry.register(Box::new(env));
	registry.register(Box::new(sources::CliSource::new(cli)));

	registry.load(paths)
}
