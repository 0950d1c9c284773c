// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-command transaction handling.

use ephemera_common_core::{CommandError, CommandResult, ResourceConnection};
use tracing::debug;

/// What happened to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
	/// Rows to show; nothing was committed.
	Rows {
		columns: Vec<String>,
		rows: Vec<Vec<String>>,
	},
	/// A mutation that was committed once.
	Committed { count: u64 },
	/// The command failed and the transaction was rolled back.
	RolledBack(CommandError),
}

/// Execute `command` and settle its transaction.
///
/// Row results are never committed, mutations are committed exactly once
/// and failures are rolled back. A committed mutation is not rolled back
/// afterwards.
pub async fn dispatch_command(connection: &dyn ResourceConnection, command: &str) -> Dispatched {
	match connection.execute(command).await {
		Ok(CommandResult::Rows { columns, rows }) => {
			debug!(rows = rows.len(), "query returned rows");
			Dispatched::Rows { columns, rows }
		}
		Ok(CommandResult::Affected { count }) => {
			connection.commit().await;
			debug!(count, "mutation committed");
			Dispatched::Committed { count }
		}
		Err(err) => {
			connection.rollback().await;
			debug!(error = %err, "command failed, rolled back");
			Dispatched::RolledBack(err)
		}
	}
}
