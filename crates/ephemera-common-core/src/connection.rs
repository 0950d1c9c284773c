// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Contract for the data store a dynamic credential unlocks.

use async_trait::async_trait;
use ephemera_common_secret::SecretString;

use crate::error::CommandError;

/// Where to connect: host, port and optional initial database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectTarget {
	pub host: String,
	pub port: u16,
	pub database: Option<String>,
}

impl ConnectTarget {
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Self {
			host: host.into(),
			port,
			database: None,
		}
	}

	pub fn with_database(mut self, database: impl Into<String>) -> Self {
		self.database = Some(database.into());
		self
	}
}

/// Outcome of one successfully executed command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandResult {
	/// The command produced a result set (possibly empty).
	Rows {
		columns: Vec<String>,
		rows: Vec<Vec<String>>,
	},
	/// The command changed data; it is not persisted until committed.
	Affected { count: u64 },
}

impl CommandResult {
	pub fn is_mutation(&self) -> bool {
		matches!(self, CommandResult::Affected { .. })
	}
}

/// A connection to the target data store opened with a dynamic credential.
///
/// Every method takes `&self`: the foreground session and the lease monitor
/// both hold the connection, and either may close it. Implementations must
/// make `close` idempotent and must let it interrupt an in-flight command.
#[async_trait]
pub trait ResourceConnection: Send + Sync {
	/// Open a connection. Returns `false` (logged) on authentication or
	/// transport failure. Calling this while already open is a caller error.
	async fn open(&self, target: &ConnectTarget, username: &str, password: &SecretString) -> bool;

	/// Run one command.
	async fn execute(&self, command: &str) -> Result<CommandResult, CommandError>;

	/// Persist pending changes. Failures are logged, not raised.
	async fn commit(&self);

	/// Discard pending changes. Failures are logged, not raised.
	async fn rollback(&self);

	/// Close the connection. A no-op when already closed.
	async fn close(&self);

	/// Whether the connection is actually alive right now.
	async fn is_connected(&self) -> bool;

	/// The dynamic user the connection was opened with, while open.
	fn bound_username(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mutation_is_tagged() {
		assert!(CommandResult::Affected { count: 3 }.is_mutation());
		assert!(!CommandResult::Rows {
			columns: vec!["id".into()],
			rows: vec![],
		}
		.is_mutation());
	}

	#[test]
	fn target_builder() {
		let target = ConnectTarget::new("10.0.0.5", 3306).with_database("inventory");
		assert_eq!(target.database.as_deref(), Some("inventory"));
		assert_eq!(target.port, 3306);
	}
}
