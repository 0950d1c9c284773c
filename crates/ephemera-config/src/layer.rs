// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration layer for merging from multiple sources.

use ephemera_common_secret::SecretString;
use serde::Deserialize;

/// Partial configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigLayer {
	#[serde(default)]
	pub vault: Option<VaultLayer>,
	#[serde(default)]
	pub database: Option<DatabaseLayer>,
	#[serde(default)]
	pub lease: Option<LeaseLayer>,
	#[serde(default)]
	pub logging: Option<LoggingLayer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultLayer {
	#[serde(default)]
	pub address: Option<String>,
	#[serde(default)]
	pub token: Option<SecretString>,
	#[serde(default)]
	pub role: Option<String>,
	#[serde(default)]
	pub mount: Option<String>,
	#[serde(default)]
	pub allow_insecure: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseLayer {
	#[serde(default)]
	pub host: Option<String>,
	#[serde(default)]
	pub port: Option<u16>,
	#[serde(default)]
	pub database: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaseLayer {
	#[serde(default)]
	pub warning_buffer_secs: Option<u64>,
	#[serde(default)]
	pub monitor_shutdown_grace_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingLayer {
	#[serde(default)]
	pub level: Option<String>,
	#[serde(default)]
	pub format: Option<String>,
}

impl ConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ConfigLayer) {
		merge_option(&mut self.vault, other.vault, VaultLayer::merge);
		merge_option(&mut self.database, other.database, DatabaseLayer::merge);
		merge_option(&mut self.lease, other.lease, LeaseLayer::merge);
		merge_option(&mut self.logging, other.logging, LoggingLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

fn take_if_some<T>(target: &mut Option<T>, source: Option<T>) {
	if source.is_some() {
		*target = source;
	}
}

impl VaultLayer {
	fn merge(&mut self, other: VaultLayer) {
		take_if_some(&mut self.address, other.address);
		take_if_some(&mut self.token, other.token);
		take_if_some(&mut self.role, other.role);
		take_if_some(&mut self.mount, other.mount);
		take_if_some(&mut self.allow_insecure, other.allow_insecure);
	}
}

impl DatabaseLayer {
	fn merge(&mut self, other: DatabaseLayer) {
		take_if_some(&mut self.host, other.host);
		take_if_some(&mut self.port, other.port);
		take_if_some(&mut self.database, other.database);
	}
}

impl LeaseLayer {
	fn merge(&mut self, other: LeaseLayer) {
		take_if_some(&mut self.warning_buffer_secs, other.warning_buffer_secs);
		take_if_some(
			&mut self.monitor_shutdown_grace_ms,
			other.monitor_shutdown_grace_ms,
		);
	}
}

impl LoggingLayer {
	fn merge(&mut self, other: LoggingLayer) {
		take_if_some(&mut self.level, other.level);
		take_if_some(&mut self.format, other.format);
	}
}
