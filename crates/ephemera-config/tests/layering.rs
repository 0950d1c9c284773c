// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use ephemera_config::{load_config_from, CliOverrides, ConfigError, EnvSource, PathsConfig};
use tempfile::TempDir;

fn paths_in(dir: &TempDir) -> PathsConfig {
	PathsConfig {
		user_config_file: dir.path().join("user.toml"),
		system_config_file: dir.path().join("system.toml"),
	}
}

fn env(pairs: &[(&str, &str)]) -> EnvSource {
	EnvSource::from_vars(
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect::<HashMap<_, _>>(),
	)
}

#[test]
fn user_file_overrides_system_file() {
	let dir = TempDir::new().unwrap();
	let paths = paths_in(&dir);
	fs::write(
		&paths.system_config_file,
		"[database]\nhost = \"system-db\"\nport = 3307\n",
	)
	.unwrap();
	fs::write(&paths.user_config_file, "[database]\nhost = \"user-db\"\n").unwrap();

	let config = load_config_from(paths, env(&[]), CliOverrides::default()).unwrap();
	assert_eq!(config.database.host, "user-db");
	assert_eq!(config.database.port, 3307);
}

#[test]
fn env_and_cli_stack_on_top_of_files() {
	let dir = TempDir::new().unwrap();
	let paths = paths_in(&dir);
	fs::write(
		&paths.user_config_file,
		"[vault]\naddress = \"https://file-vault:8200\"\nrole = \"file-role\"\n\n[lease]\nwarning_buffer_secs = 30\n",
	)
	.unwrap();

	let config = load_config_from(
		paths,
		env(&[
			("VAULT_ADDR", "https://env-vault:8200"),
			("VAULT_TOKEN", "hvs.env"),
			("EPHEMERA_VAULT_ROLE", "env-role"),
		]),
		CliOverrides {
			role: Some("cli-role".into()),
			..Default::default()
		},
	)
	.unwrap();

	assert_eq!(config.vault.address, "https://env-vault:8200");
	assert_eq!(config.vault.role, "cli-role");
	assert_eq!(config.vault.token.as_ref().unwrap().expose(), "hvs.env");
	assert_eq!(config.lease.warning_buffer, Duration::from_secs(30));
}

#[test]
fn explicit_config_file_sits_between_user_file_and_env() {
	let dir = TempDir::new().unwrap();
	let paths = paths_in(&dir);
	fs::write(&paths.user_config_file, "[database]\nport = 3307\n").unwrap();
	let explicit = dir.path().join("explicit.toml");
	fs::write(&explicit, "[database]\nport = 3308\ndatabase = \"inventory\"\n").unwrap();

	let config = load_config_from(
		paths,
		env(&[]),
		CliOverrides {
			config_file: Some(explicit),
			..Default::default()
		},
	)
	.unwrap();
	assert_eq!(config.database.port, 3308);
	assert_eq!(config.database.database.as_deref(), Some("inventory"));
}

#[test]
fn malformed_file_is_reported() {
	let dir = TempDir::new().unwrap();
	let paths = paths_in(&dir);
	fs::write(&paths.user_config_file, "[database\nhost = ").unwrap();

	let err = load_config_from(paths, env(&[]), CliOverrides::default()).unwrap_err();
	assert!(matches!(err, ConfigError::TomlParse { .. }));
}

#[test]
fn invalid_merged_value_fails_validation() {
	let dir = TempDir::new().unwrap();
	let err = load_config_from(
		paths_in(&dir),
		env(&[("MYSQL_PORT", "0")]),
		CliOverrides::default(),
	)
	.unwrap_err();
	assert!(matches!(err, ConfigError::InvalidValue { .. }));
}
