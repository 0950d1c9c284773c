// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod render;
mod repl;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ephemera_common_core::ConnectTarget;
use ephemera_config::{load_config_with_cli, CliOverrides, EphemeraConfig, LogFormat, LogLevel};
use ephemera_db::MySqlResource;
use ephemera_lease::{
	require_token, SessionCoordinator, SessionEnd, SessionError, SessionReport, SessionSettings,
};
use ephemera_vault::{ClientConfig, VaultClient};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::repl::{spawn_stdin_reader, SqlRepl};

/// Exit status when the foreground panicked; teardown still ran.
const EXIT_PANICKED: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "ephemera", version, about = "SQL shell on a short-lived Vault database credential", long_about = None)]
struct Args {
	/// Explicit config file, layered over the system and user files
	#[arg(long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Vault address (e.g. https://vault.internal:8200)
	#[arg(long)]
	vault_addr: Option<String>,

	/// Database secrets engine role to request credentials for
	#[arg(long)]
	role: Option<String>,

	/// MySQL host
	#[arg(long)]
	db_host: Option<String>,

	/// MySQL port
	#[arg(long)]
	db_port: Option<u16>,

	/// Initial database to select
	#[arg(long)]
	database: Option<String>,

	/// Seconds before lease expiry at which the session is ended
	#[arg(long, value_name = "SECS")]
	warning_buffer: Option<u64>,

	/// Log level (error, warn, info, debug, trace)
	#[arg(long)]
	log_level: Option<String>,

	/// Emit logs as JSON
	#[arg(long)]
	json_logs: bool,

	/// Allow a plain HTTP Vault address
	#[arg(long)]
	allow_insecure: bool,
}

impl From<&Args> for CliOverrides {
	fn from(args: &Args) -> Self {
		CliOverrides {
			config_file: args.config.clone(),
			vault_address: args.vault_addr.clone(),
			role: args.role.clone(),
			allow_insecure: args.allow_insecure,
			db_host: args.db_host.clone(),
			db_port: args.db_port,
			database: args.database.clone(),
			warning_buffer_secs: args.warning_buffer,
			log_level: args.log_level.clone(),
			log_format: if args.json_logs {
				Some("json".to_string())
			} else {
				None
			},
		}
	}
}

fn log_level_to_tracing(level: LogLevel) -> &'static str {
	match level {
		LogLevel::Error => "error",
		LogLevel::Warn => "warn",
		LogLevel::Info => "info",
		LogLevel::Debug => "debug",
		LogLevel::Trace => "trace",
	}
}

/// Logs go to stderr; stdout carries SQL output only.
fn init_tracing(logging: &ephemera_config::LoggingConfig) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		EnvFilter::new(format!("ephemera={}", log_level_to_tracing(logging.level)))
	});

	match logging.format {
		LogFormat::Json => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().json().with_writer(std::io::stderr))
				.init();
		}
		LogFormat::Compact => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().compact().with_writer(std::io::stderr))
				.init();
		}
		LogFormat::Pretty => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().with_writer(std::io::stderr))
				.init();
		}
	}
}

fn setup_ctrlc_handler(shutdown_tx: watch::Sender<bool>) -> Result<()> {
	ctrlc::set_handler(move || {
		info!("received Ctrl+C, ending session");
		let _ = shutdown_tx.send(true);
	})
	.context("failed to set Ctrl+C handler")
}

fn build_settings(config: &EphemeraConfig) -> SessionSettings {
	let mut target = ConnectTarget::new(config.database.host.clone(), config.database.port);
	if let Some(ref database) = config.database.database {
		target = target.with_database(database.clone());
	}
	SessionSettings::new(config.vault.role.clone(), target, config.lease.warning_buffer)
		.with_monitor_shutdown_grace(config.lease.monitor_shutdown_grace)
}

async fn run_session(
	config: &EphemeraConfig,
	shutdown_rx: watch::Receiver<bool>,
) -> Result<std::result::Result<SessionReport, SessionError>> {
	let token = match require_token(config.vault.token.as_ref()) {
		Ok(token) => token.clone(),
		Err(e) => return Ok(Err(e)),
	};

	let vault = match VaultClient::with_config(ClientConfig {
		address: config.vault.address.clone(),
		token,
		mount: config.vault.mount.clone(),
		allow_insecure: config.vault.allow_insecure,
	}) {
		Ok(vault) => vault,
		Err(e) => return Ok(Err(SessionError::Config(e.to_string()))),
	};

	let input = spawn_stdin_reader().context("failed to start stdin reader")?;
	let mut repl = SqlRepl::new(input, std::io::stdout(), shutdown_rx);

	let coordinator = SessionCoordinator::new(
		Arc::new(vault),
		Arc::new(MySqlResource::new()),
		build_settings(config),
	);
	Ok(coordinator.run(&mut repl).await)
}

fn exit_code_for(result: &std::result::Result<SessionReport, SessionError>) -> u8 {
	match result {
		Ok(report) if report.end == SessionEnd::Panicked => EXIT_PANICKED,
		Ok(_) => 0,
		Err(e) => u8::try_from(e.exit_code()).unwrap_or(EXIT_PANICKED),
	}
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
	let args = Args::parse();

	let config = match load_config_with_cli(CliOverrides::from(&args)) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("ephemera: {e}");
			return Ok(ExitCode::from(EXIT_CONFIG));
		}
	};

	init_tracing(&config.logging);
	info!(
		vault = %config.vault.address,
		role = %config.vault.role,
		host = %config.database.host,
		port = config.database.port,
		"starting ephemera"
	);

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	setup_ctrlc_handler(shutdown_tx)?;

	let result = run_session(&config, shutdown_rx).await?;
	match result {
		Ok(ref report) => info!(
			username = %report.username,
			end = %report.end,
			revoked_by = ?report.revoked_by,
			"session finished"
		),
		Err(ref e) => {
			error!(error = %e, "session failed");
			eprintln!("ephemera: {e}");
		}
	}
	info!("bye");

	Ok(ExitCode::from(exit_code_for(&result)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use ephemera_common_core::LeaseId;
	use ephemera_config::{load_config_from, EnvSource, PathsConfig};
	use ephemera_lease::{MonitorPhase, RevokeActor};
	use std::collections::HashMap;
	use std::time::Duration;

	fn report(end: SessionEnd) -> SessionReport {
		SessionReport {
			username: "v-root".into(),
			lease_id: LeaseId::new("database/creds/r/x"),
			end,
			revoked_by: Some(RevokeActor::Teardown),
			monitor: MonitorPhase::Cancelled,
		}
	}

	fn config_from(env: &[(&str, &str)], args: &[&str]) -> EphemeraConfig {
		let args = Args::parse_from(std::iter::once("ephemera").chain(args.iter().copied()));
		let vars: HashMap<String, String> = env
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		let dir = tempfile::tempdir().unwrap();
		let paths = PathsConfig {
			user_config_file: dir.path().join("user.toml"),
			system_config_file: dir.path().join("system.toml"),
		};
		load_config_from(paths, EnvSource::from_vars(vars), CliOverrides::from(&args)).unwrap()
	}

	#[test]
	fn exit_codes() {
		assert_eq!(exit_code_for(&Ok(report(SessionEnd::UserExit))), 0);
		assert_eq!(exit_code_for(&Ok(report(SessionEnd::ConnectionLost))), 0);
		assert_eq!(exit_code_for(&Ok(report(SessionEnd::Interrupted))), 0);
		assert_eq!(exit_code_for(&Ok(report(SessionEnd::Panicked))), 1);
		assert_eq!(exit_code_for(&Err(SessionError::Config("x".into()))), 2);
		assert_eq!(exit_code_for(&Err(SessionError::Auth("x".into()))), 3);
		assert_eq!(exit_code_for(&Err(SessionError::Connect("x".into()))), 5);
	}

	#[test]
	fn flags_override_environment() {
		let config = config_from(
			&[("MYSQL_HOST", "db.env"), ("MYSQL_PORT", "3307")],
			&["--db-host", "db.flag", "--warning-buffer", "25", "--json-logs"],
		);
		assert_eq!(config.database.host, "db.flag");
		assert_eq!(config.database.port, 3307);
		assert_eq!(config.lease.warning_buffer, Duration::from_secs(25));
		assert_eq!(config.logging.format, LogFormat::Json);
	}

	#[test]
	fn settings_carry_database_and_grace() {
		let config = config_from(
			&[("MYSQL_DATABASE", "shop")],
			&["--role", "readonly", "--db-port", "3310"],
		);
		let settings = build_settings(&config);
		assert_eq!(settings.role, "readonly");
		assert_eq!(settings.target.port, 3310);
		assert_eq!(settings.target.database.as_deref(), Some("shop"));
		assert_eq!(
			settings.monitor_shutdown_grace,
			config.lease.monitor_shutdown_grace
		);
	}

	#[tokio::test]
	async fn missing_token_is_a_config_error() {
		let config = config_from(&[], &[]);
		assert!(config.vault.token.is_none());
		let (_tx, rx) = watch::channel(false);
		let result = run_session(&config, rx).await.unwrap();
		assert!(matches!(result, Err(SessionError::Config(_))));
		assert_eq!(exit_code_for(&result), 2);
	}

	#[tokio::test]
	async fn plain_http_vault_without_flag_is_a_config_error() {
		let config = config_from(&[("VAULT_TOKEN", "hvs.t")], &["--vault-addr", "http://10.0.0.5:8200"]);
		let (_tx, rx) = watch::channel(false);
		let result = run_session(&config, rx).await.unwrap();
		assert!(matches!(result, Err(SessionError::Config(_))));
	}

	#[test]
	fn args_parse() {
		let args = Args::parse_from([
			"ephemera",
			"--config",
			"/tmp/e.toml",
			"--allow-insecure",
			"--log-level",
			"debug",
		]);
		let overrides = CliOverrides::from(&args);
		assert_eq!(overrides.config_file, Some(PathBuf::from("/tmp/e.toml")));
		assert!(overrides.allow_insecure);
		assert_eq!(overrides.log_level.as_deref(), Some("debug"));
		assert!(overrides.log_format.is_none());
	}
}
