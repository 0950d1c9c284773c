// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration validation rules.

use std::time::Duration;

use tracing::warn;

use crate::runtime::EphemeraConfig;
use crate::ConfigError;

/// Upper bound for the warning buffer; anything longer is a typo.
pub const MAX_WARNING_BUFFER: Duration = Duration::from_secs(86_400);

/// Validate the merged configuration.
///
/// A missing Vault token is not rejected here. The session bootstrap
/// checks for it so that `--help`-style paths work without one.
pub fn validate_config(config: &EphemeraConfig) -> Result<(), ConfigError> {
	validate_vault(config)?;
	validate_database(config)?;
	validate_lease(config)?;
	Ok(())
}

fn validate_vault(config: &EphemeraConfig) -> Result<(), ConfigError> {
	let vault = &config.vault;
	if vault.address.trim().is_empty() {
		return Err(ConfigError::invalid_value(
			"vault.address",
			"address cannot be empty",
		));
	}
	if vault.role.trim().is_empty() {
		return Err(ConfigError::invalid_value("vault.role", "role cannot be empty"));
	}
	if vault.mount.trim().is_empty() {
		return Err(ConfigError::invalid_value("vault.mount", "mount cannot be empty"));
	}
	if vault.address.starts_with("http://") && !vault.allow_insecure && !is_local(&vault.address) {
		warn!(
			address = %vault.address,
			"Vault address is not HTTPS; the client will refuse it unless allow_insecure is set"
		);
	}
	Ok(())
}

fn is_local(address: &str) -> bool {
	["http://127.", "http://localhost", "http://[::1]"]
		.iter()
		.any(|prefix| address.starts_with(prefix))
}

fn validate_database(config: &EphemeraConfig) -> Result<(), ConfigError> {
	if config.database.host.trim().is_empty() {
		return Err(ConfigError::invalid_value(
			"database.host",
			"host cannot be empty",
		));
	}
	if config.database.port == 0 {
		return Err(ConfigError::invalid_value(
			"database.port",
			"port must be between 1 and 65535",
		));
	}
	Ok(())
}

fn validate_lease(config: &EphemeraConfig) -> Result<(), ConfigError> {
	if config.lease.warning_buffer > MAX_WARNING_BUFFER {
		return Err(ConfigError::invalid_value(
			"lease.warning_buffer_secs",
			format!(
				"{}s exceeds the maximum of {}s",
				config.lease.warning_buffer.as_secs(),
				MAX_WARNING_BUFFER.as_secs()
			),
		));
	}
	if config.lease.warning_buffer.is_zero() {
		warn!("warning buffer is zero; the lease will be revoked at its exact expiry");
	}
	Ok(())
}
