// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Line-oriented SQL shell running as the session's foreground.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use ephemera_common_core::ResourceConnection;
use ephemera_lease::{dispatch_command, ForegroundSession, SessionEnd};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::render::render_outcome;

const BANNER: &str = "Connected to database. Enter SQL, or 'exit'/'quit' to leave.";

/// Read stdin lines on a dedicated thread.
///
/// The channel closes on end of input. A blocked read never holds up runtime
/// shutdown because the thread is not owned by the runtime.
pub fn spawn_stdin_reader() -> io::Result<mpsc::Receiver<String>> {
	let (tx, rx) = mpsc::channel(1);
	std::thread::Builder::new()
		.name("ephemera-stdin".to_string())
		.spawn(move || {
			for line in io::stdin().lock().lines() {
				match line {
					Ok(line) => {
						if tx.blocking_send(line).is_err() {
							break;
						}
					}
					Err(e) => {
						warn!(error = %e, "failed to read stdin");
						break;
					}
				}
			}
		})?;
	Ok(rx)
}

/// `exit` or `quit`, any case.
pub fn is_exit_command(line: &str) -> bool {
	line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit")
}

/// Resolves once Ctrl+C has been seen. Never resolves if the sender is gone.
async fn interrupted(shutdown: &mut watch::Receiver<bool>) {
	loop {
		if *shutdown.borrow_and_update() {
			return;
		}
		if shutdown.changed().await.is_err() {
			std::future::pending::<()>().await;
		}
	}
}

/// Interactive SQL shell.
pub struct SqlRepl<W> {
	input: mpsc::Receiver<String>,
	output: W,
	shutdown: watch::Receiver<bool>,
}

impl<W: Write + Send> SqlRepl<W> {
	pub fn new(input: mpsc::Receiver<String>, output: W, shutdown: watch::Receiver<bool>) -> Self {
		Self {
			input,
			output,
			shutdown,
		}
	}

	pub fn into_output(self) -> W {
		self.output
	}

	fn say(&mut self, line: &str) -> io::Result<()> {
		writeln!(self.output, "{line}")?;
		self.output.flush()
	}

	fn emit(&mut self, lines: &[String]) -> io::Result<()> {
		for line in lines {
			writeln!(self.output, "{line}")?;
		}
		self.output.flush()
	}

	fn prompt(&mut self, username: &str) -> io::Result<()> {
		write!(self.output, "SQL ({username})> ")?;
		self.output.flush()
	}

	/// Print a farewell and report how the session ended.
	fn finish(&mut self, message: &str, end: SessionEnd) -> SessionEnd {
		if let Err(e) = self.say(message) {
			debug!(error = %e, "could not write final message");
		}
		end
	}
}

#[async_trait]
impl<W: Write + Send> ForegroundSession for SqlRepl<W> {
	async fn run(&mut self, connection: Arc<dyn ResourceConnection>) -> SessionEnd {
		if self.say(BANNER).is_err() {
			return SessionEnd::EndOfInput;
		}

		loop {
			if !connection.is_connected().await {
				warn!("connection lost");
				return self.finish("Connection lost, session ends.", SessionEnd::ConnectionLost);
			}

			let username = connection.bound_username().unwrap_or_default();
			if self.prompt(&username).is_err() {
				return SessionEnd::EndOfInput;
			}

			let line = tokio::select! {
				biased;
				_ = interrupted(&mut self.shutdown) => {
					return self.finish("\nInterrupted, exiting.", SessionEnd::Interrupted);
				}
				line = self.input.recv() => line,
			};
			let Some(line) = line else {
				return self.finish("\nEnd of input, exiting.", SessionEnd::EndOfInput);
			};

			let command = line.trim();
			if command.is_empty() {
				continue;
			}
			if is_exit_command(command) {
				return self.finish("Exiting.", SessionEnd::UserExit);
			}

			let started = Instant::now();
			let outcome = tokio::select! {
				biased;
				_ = interrupted(&mut self.shutdown) => {
					return self.finish("\nInterrupted, exiting.", SessionEnd::Interrupted);
				}
				outcome = dispatch_command(connection.as_ref(), command) => outcome,
			};
			info!(
				elapsed_ms = started.elapsed().as_millis() as u64,
				"command finished"
			);

			if self.emit(&render_outcome(&outcome)).is_err() {
				return SessionEnd::EndOfInput;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ephemera_common_core::{CommandError, CommandResult};
	use ephemera_lease::testing::MockConnection;
	use std::time::Duration;

	fn input(lines: &[&str]) -> mpsc::Receiver<String> {
		let (tx, rx) = mpsc::channel(lines.len().max(1));
		for line in lines {
			tx.try_send(line.to_string()).unwrap();
		}
		rx
	}

	async fn run_lines(
		connection: Arc<MockConnection>,
		lines: &[&str],
	) -> (SessionEnd, String) {
		let (_tx, shutdown) = watch::channel(false);
		let mut repl = SqlRepl::new(input(lines), Vec::new(), shutdown);
		let end = repl.run(connection).await;
		(end, String::from_utf8(repl.into_output()).unwrap())
	}

	#[test]
	fn exit_words_are_case_insensitive() {
		assert!(is_exit_command("exit"));
		assert!(is_exit_command("QUIT"));
		assert!(is_exit_command("Exit"));
		assert!(!is_exit_command("exit;"));
		assert!(!is_exit_command("SELECT 'exit'"));
	}

	#[tokio::test]
	async fn query_prints_table_and_exits() {
		let connection = Arc::new(MockConnection::opened("v-root-admin"));
		let (end, out) = run_lines(connection.clone(), &["SELECT 1", "exit"]).await;

		assert_eq!(end, SessionEnd::UserExit);
		assert!(out.starts_with(BANNER));
		assert!(out.contains("SQL (v-root-admin)> "));
		assert!(out.contains("result\n------\n1\n"));
		assert!(out.ends_with("Exiting.\n"));
		assert_eq!(connection.commit_count(), 0);
	}

	#[tokio::test]
	async fn mutation_commits_once() {
		let connection = Arc::new(MockConnection::opened("v-root-admin"));
		let (end, out) = run_lines(connection.clone(), &["INSERT INTO t VALUES (1)"]).await;

		assert_eq!(end, SessionEnd::EndOfInput);
		assert!(out.contains("OK: 1 row affected\ncommitted\n"));
		assert_eq!(connection.commit_count(), 1);
		assert_eq!(connection.rollback_count(), 0);
	}

	#[tokio::test]
	async fn failed_command_rolls_back_and_continues() {
		let connection = Arc::new(
			MockConnection::opened("v-root-admin").scripted(
				"DROP TABLE nope",
				Err(CommandError::Execution("Unknown table 'nope'".into())),
			),
		);
		let (end, out) = run_lines(connection.clone(), &["DROP TABLE nope", "SELECT 1", "quit"]).await;

		assert_eq!(end, SessionEnd::UserExit);
		assert!(out.contains("Unknown table 'nope'"));
		assert!(out.contains("rolled back\n"));
		assert_eq!(connection.rollback_count(), 1);
		assert_eq!(connection.execute_count(), 2);
	}

	#[tokio::test]
	async fn empty_result_set_is_reported() {
		let connection = Arc::new(MockConnection::opened("v-root-admin").scripted(
			"SELECT * FROM empty",
			Ok(CommandResult::Rows {
				columns: vec!["id".into()],
				rows: vec![],
			}),
		));
		let (_, out) = run_lines(connection.clone(), &["SELECT * FROM empty"]).await;

		assert!(out.contains("0 rows returned\n"));
		assert_eq!(connection.commit_count(), 0);
	}

	#[tokio::test]
	async fn blank_lines_are_skipped() {
		let connection = Arc::new(MockConnection::opened("v-root-admin"));
		let (end, _) = run_lines(connection.clone(), &["", "   ", "\t", "exit"]).await;

		assert_eq!(end, SessionEnd::UserExit);
		assert_eq!(connection.execute_count(), 0);
	}

	#[tokio::test]
	async fn closed_connection_ends_before_prompt() {
		let connection = Arc::new(MockConnection::new());
		let (end, out) = run_lines(connection.clone(), &["SELECT 1"]).await;

		assert_eq!(end, SessionEnd::ConnectionLost);
		assert!(out.contains("Connection lost"));
		assert!(!out.contains("SQL ("));
		assert_eq!(connection.execute_count(), 0);
	}

	#[tokio::test]
	async fn connection_closed_mid_session_ends_at_next_prompt() {
		let connection = Arc::new(MockConnection::opened("v-root-admin"));
		let (line_tx, line_rx) = mpsc::channel(4);
		let (_tx, shutdown) = watch::channel(false);
		let mut repl = SqlRepl::new(line_rx, Vec::new(), shutdown);

		line_tx.send("SELECT 1".to_string()).await.unwrap();
		let closer = {
			let connection = connection.clone();
			tokio::spawn(async move {
				tokio::time::sleep(Duration::from_millis(20)).await;
				connection.close().await;
				line_tx.send("SELECT 2".to_string()).await.unwrap();
				line_tx
			})
		};

		let end = repl.run(connection.clone()).await;
		let _line_tx = closer.await.unwrap();

		// The line read while the connection went away fails and rolls back;
		// the next liveness check ends the session.
		assert_eq!(end, SessionEnd::ConnectionLost);
		assert_eq!(connection.execute_count(), 2);
		assert_eq!(connection.rollback_count(), 1);
		let out = String::from_utf8(repl.into_output()).unwrap();
		assert!(out.ends_with("Connection lost, session ends.\n"));
	}

	#[tokio::test]
	async fn ctrl_c_before_input_interrupts() {
		let connection = Arc::new(MockConnection::opened("v-root-admin"));
		let (tx, shutdown) = watch::channel(false);
		tx.send(true).unwrap();
		let mut repl = SqlRepl::new(input(&["SELECT 1"]), Vec::new(), shutdown);

		assert_eq!(repl.run(connection.clone()).await, SessionEnd::Interrupted);
		assert_eq!(connection.execute_count(), 0);
		let out = String::from_utf8(repl.into_output()).unwrap();
		assert!(out.contains("Interrupted"));
	}

	#[tokio::test(start_paused = true)]
	async fn ctrl_c_while_waiting_for_input() {
		let connection = Arc::new(MockConnection::opened("v-root-admin"));
		let (_line_tx, line_rx) = mpsc::channel::<String>(1);
		let (tx, shutdown) = watch::channel(false);
		let mut repl = SqlRepl::new(line_rx, Vec::new(), shutdown);

		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(3)).await;
			tx.send(true).unwrap();
			// Keep the sender alive until the repl has observed it.
			tokio::time::sleep(Duration::from_secs(60)).await;
		});

		assert_eq!(repl.run(connection).await, SessionEnd::Interrupted);
	}
}
