// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! MySQL implementation of `ResourceConnection`.

use std::sync::{Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use ephemera_common_core::{CommandError, CommandResult, ConnectTarget, ResourceConnection};
use ephemera_common_secret::SecretString;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Either, Executor, Row};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{ConnectionError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PING_TIMEOUT: Duration = Duration::from_secs(5);
const QUIT_TIMEOUT: Duration = Duration::from_secs(2);

/// How SQL `NULL` is shown in rendered rows.
pub const NULL_DISPLAY: &str = "NULL";

/// A single MySQL session opened with a leased credential.
///
/// Autocommit is disabled on open, so data changes are only persisted by
/// [`ResourceConnection::commit`]. `close` cancels any command in flight
/// before taking the connection, which lets the lease monitor shut the
/// session down while the foreground is blocked on the server.
pub struct MySqlResource {
	conn: Mutex<Option<MySqlConnection>>,
	cancel: StdMutex<CancellationToken>,
	username: StdMutex<Option<String>>,
}

impl MySqlResource {
	pub fn new() -> Self {
		Self {
			conn: Mutex::new(None),
			cancel: StdMutex::new(CancellationToken::new()),
			username: StdMutex::new(None),
		}
	}

	fn cancel_token(&self) -> CancellationToken {
		lock(&self.cancel).clone()
	}

	fn set_username(&self, username: Option<String>) {
		*lock(&self.username) = username;
	}

	async fn connect(
		&self,
		target: &ConnectTarget,
		username: &str,
		password: &SecretString,
	) -> Result<()> {
		let mut slot = self.conn.lock().await;
		if slot.is_some() {
			return Err(ConnectionError::AlreadyOpen);
		}

		let options = connect_options(target, username, password);
		let mut conn = tokio::time::timeout(CONNECT_TIMEOUT, options.connect())
			.await
			.map_err(|_| ConnectionError::Timeout(CONNECT_TIMEOUT))?
			.map_err(ConnectionError::from_connect)?;

		conn.execute("SET autocommit = 0").await?;

		*slot = Some(conn);
		*lock(&self.cancel) = CancellationToken::new();
		self.set_username(Some(username.to_string()));
		Ok(())
	}

	/// Run a transaction control statement, logging rather than raising.
	async fn control(&self, statement: &'static str) {
		let cancel = self.cancel_token();
		let mut slot = self.conn.lock().await;
		let Some(conn) = slot.as_mut() else {
			debug!(statement, "not connected, skipping");
			return;
		};

		let outcome = tokio::select! {
			biased;
			_ = cancel.cancelled() => None,
			result = conn.execute(statement) => Some(result),
		};

		match outcome {
			Some(Ok(_)) => debug!(statement, "transaction statement applied"),
			Some(Err(e)) => warn!(statement, error = %e, "transaction statement failed"),
			None => {
				slot.take();
				self.set_username(None);
				debug!(statement, "interrupted by close");
			}
		}
	}
}

impl Default for MySqlResource {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for MySqlResource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MySqlResource")
			.field("username", &*lock(&self.username))
			.finish_non_exhaustive()
	}
}

#[async_trait]
impl ResourceConnection for MySqlResource {
	#[instrument(skip(self, password), fields(host = %target.host, port = target.port))]
	async fn open(&self, target: &ConnectTarget, username: &str, password: &SecretString) -> bool {
		match self.connect(target, username, password).await {
			Ok(()) => {
				info!(
					username,
					target = %describe_target(target),
					"connected to database"
				);
				true
			}
			Err(e) if e.is_access_denied() => {
				warn!(username, error = %e, "database rejected credential");
				false
			}
			Err(e) => {
				warn!(error = %e, "could not connect to database");
				false
			}
		}
	}

	async fn execute(&self, command: &str) -> std::result::Result<CommandResult, CommandError> {
		let cancel = self.cancel_token();
		let mut slot = self.conn.lock().await;
		let Some(conn) = slot.as_mut() else {
			return Err(CommandError::NotConnected);
		};

		let outcome = tokio::select! {
			biased;
			_ = cancel.cancelled() => None,
			result = run_command(conn, command) => Some(result),
		};

		match outcome {
			Some(result) => result.map_err(|e| CommandError::Execution(e.to_string())),
			None => {
				// Mid-response on the wire; the socket cannot be reused.
				slot.take();
				self.set_username(None);
				Err(CommandError::Interrupted)
			}
		}
	}

	async fn commit(&self) {
		self.control("COMMIT").await;
	}

	async fn rollback(&self) {
		self.control("ROLLBACK").await;
	}

	async fn close(&self) {
		self.cancel_token().cancel();
		let conn = self.conn.lock().await.take();
		self.set_username(None);

		let Some(conn) = conn else {
			debug!("connection already closed");
			return;
		};

		match tokio::time::timeout(QUIT_TIMEOUT, conn.close()).await {
			Ok(Ok(())) => info!("database connection closed"),
			Ok(Err(e)) => debug!(error = %e, "error while closing connection"),
			Err(_) => debug!("close timed out, dropping socket"),
		}
	}

	async fn is_connected(&self) -> bool {
		// A command in flight holds the lock; the connection is in use.
		let Ok(mut slot) = self.conn.try_lock() else {
			return true;
		};
		let Some(conn) = slot.as_mut() else {
			return false;
		};

		match tokio::time::timeout(PING_TIMEOUT, conn.ping()).await {
			Ok(Ok(())) => true,
			Ok(Err(e)) => {
				debug!(error = %e, "ping failed");
				false
			}
			Err(_) => {
				debug!("ping timed out");
				false
			}
		}
	}

	fn bound_username(&self) -> Option<String> {
		lock(&self.username).clone()
	}
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn connect_options(
	target: &ConnectTarget,
	username: &str,
	password: &SecretString,
) -> MySqlConnectOptions {
	let options = MySqlConnectOptions::new()
		.host(&target.host)
		.port(target.port)
		.username(username)
		.password(password.expose())
		.disable_statement_logging();
	match target.database {
		Some(ref database) => options.database(database),
		None => options,
	}
}

/// `host:port` or `host:port/database`, for log lines.
pub fn describe_target(target: &ConnectTarget) -> String {
	match target.database {
		Some(ref db) => format!("{}:{}/{}", target.host, target.port, db),
		None => format!("{}:{}", target.host, target.port),
	}
}

/// Run one statement over the text protocol and shape the outcome.
///
/// A statement that returned rows is a row result. One that returned no
/// rows and changed nothing is described; if it has result columns it is
/// an empty row result, otherwise a zero-count mutation.
async fn run_command(
	conn: &mut MySqlConnection,
	command: &str,
) -> std::result::Result<CommandResult, sqlx::Error> {
	let mut rows: Vec<MySqlRow> = Vec::new();
	let mut affected: u64 = 0;
	{
		let mut stream = (&mut *conn).fetch_many(command);
		while let Some(item) = stream.try_next().await? {
			match item {
				Either::Left(done) => affected += done.rows_affected(),
				Either::Right(row) => rows.push(row),
			}
		}
	}

	if let Some(first) = rows.first() {
		let columns = first
			.columns()
			.iter()
			.map(|c| c.name().to_string())
			.collect();
		let rows = rows.iter().map(render_row).collect();
		return Ok(CommandResult::Rows { columns, rows });
	}

	if affected == 0 {
		let columns = describe_columns(conn, command).await;
		if !columns.is_empty() {
			return Ok(CommandResult::Rows {
				columns,
				rows: Vec::new(),
			});
		}
	}

	Ok(CommandResult::Affected { count: affected })
}

async fn describe_columns(conn: &mut MySqlConnection, command: &str) -> Vec<String> {
	match (&mut *conn).describe(command).await {
		Ok(described) => described
			.columns()
			.iter()
			.map(|c| c.name().to_string())
			.collect(),
		Err(e) => {
			debug!(error = %e, "statement could not be described");
			Vec::new()
		}
	}
}

fn render_row(row: &MySqlRow) -> Vec<String> {
	(0..row.len()).map(|idx| render_cell(row, idx)).collect()
}

fn render_cell(row: &MySqlRow, idx: usize) -> String {
	match row.try_get_unchecked::<Option<String>, _>(idx) {
		Ok(Some(text)) => text,
		Ok(None) => NULL_DISPLAY.to_string(),
		Err(_) => match row.try_get_unchecked::<Option<Vec<u8>>, _>(idx) {
			Ok(Some(bytes)) => render_bytes(&bytes),
			Ok(None) => NULL_DISPLAY.to_string(),
			Err(e) => {
				debug!(column = idx, error = %e, "undecodable value");
				"?".to_string()
			}
		},
	}
}

fn render_bytes(bytes: &[u8]) -> String {
	String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn describe_target_formats() {
		let target = ConnectTarget::new("192.168.1.20", 3306);
		assert_eq!(describe_target(&target), "192.168.1.20:3306");
		let target = target.with_database("inventory");
		assert_eq!(describe_target(&target), "192.168.1.20:3306/inventory");
	}

	#[test]
	fn render_bytes_is_lossy() {
		assert_eq!(render_bytes(b"plain"), "plain");
		assert_eq!(render_bytes(&[0x61, 0xff, 0x62]), "a\u{fffd}b");
	}

	#[tokio::test]
	async fn fresh_resource_is_not_connected() {
		let resource = MySqlResource::new();
		assert!(!resource.is_connected().await);
		assert!(resource.bound_username().is_none());
		assert_eq!(
			resource.execute("SELECT 1").await,
			Err(CommandError::NotConnected)
		);
	}

	#[tokio::test]
	async fn commit_and_rollback_without_connection_are_noops() {
		let resource = MySqlResource::new();
		resource.commit().await;
		resource.rollback().await;
		assert!(!resource.is_connected().await);
	}

	#[tokio::test]
	async fn close_is_idempotent() {
		let resource = MySqlResource::new();
		resource.close().await;
		resource.close().await;
		assert!(!resource.is_connected().await);
	}

	#[tokio::test]
	async fn open_against_closed_port_fails() {
		let resource = MySqlResource::new();
		let target = ConnectTarget::new("127.0.0.1", 1);
		let opened = resource
			.open(&target, "v-user", &SecretString::new("pw".to_string()))
			.await;
		assert!(!opened);
		assert!(resource.bound_username().is_none());
	}

	proptest! {
		#[test]
		fn utf8_bytes_render_verbatim(s in "\\PC*") {
			prop_assert_eq!(render_bytes(s.as_bytes()), s);
		}
	}
}
