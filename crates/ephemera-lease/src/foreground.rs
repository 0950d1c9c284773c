// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The interactive half of a session.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ephemera_common_core::ResourceConnection;

/// Why the foreground session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
	/// The user asked to leave.
	UserExit,
	/// Input was exhausted.
	EndOfInput,
	/// The user pressed Ctrl+C.
	Interrupted,
	/// The connection went away, usually because the lease monitor closed it.
	ConnectionLost,
	/// The foreground panicked. Only ever recorded by the coordinator.
	Panicked,
}

impl fmt::Display for SessionEnd {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			SessionEnd::UserExit => "user exit",
			SessionEnd::EndOfInput => "end of input",
			SessionEnd::Interrupted => "interrupted",
			SessionEnd::ConnectionLost => "connection lost",
			SessionEnd::Panicked => "panicked",
		};
		f.write_str(s)
	}
}

/// Drives user interaction over the open connection until it decides to stop.
///
/// The coordinator tears the session down after `run` returns or panics, so
/// implementations never close the connection or touch the lease themselves.
#[async_trait]
pub trait ForegroundSession: Send {
	async fn run(&mut self, connection: Arc<dyn ResourceConnection>) -> SessionEnd;
}
