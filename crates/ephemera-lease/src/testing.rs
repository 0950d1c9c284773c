// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Recording test doubles for the secrets service, the connection and the
//! foreground session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ephemera_common_core::{
	CommandError, CommandResult, ConnectTarget, Credential, LeaseId, ResourceConnection,
	RevokeWarning, SecretsClient, SecretsError,
};
use ephemera_common_secret::SecretString;

use crate::dispatch::{dispatch_command, Dispatched};
use crate::foreground::{ForegroundSession, SessionEnd};

pub const TEST_USERNAME: &str = "v-token-my-admin-role-test";
pub const TEST_LEASE_ID: &str = "database/creds/my-admin-role/Tq5n0x2Yk8c";

/// Something one of the doubles was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
	Opened(String),
	Executed(String),
	Committed,
	RolledBack,
	Closed,
	Revoked(LeaseId),
}

/// Shared, ordered record of calls across doubles.
#[derive(Debug, Default)]
pub struct EventLog {
	events: Mutex<Vec<Event>>,
}

impl EventLog {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	fn push(&self, event: Event) {
		self.events
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.push(event);
	}

	pub fn events(&self) -> Vec<Event> {
		self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
	}

	/// Index of the first event matching `pred`.
	pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
		self.events().iter().position(pred)
	}
}

/// Secrets service double that counts every call.
pub struct MockSecretsClient {
	accept_token: bool,
	issue: Result<Credential, SecretsError>,
	revoke_fails: bool,
	revoke_delay: Duration,
	authenticate_calls: AtomicUsize,
	issue_calls: AtomicUsize,
	revoke_calls: AtomicUsize,
	log: Option<Arc<EventLog>>,
}

impl MockSecretsClient {
	/// Issues a fixed credential with the given lease length.
	pub fn with_lease(duration_secs: u64) -> Self {
		Self::issuing(Credential::new(
			TEST_USERNAME,
			SecretString::new("A1a-test-password".to_string()),
			LeaseId::new(TEST_LEASE_ID),
			duration_secs,
		))
	}

	pub fn issuing(issue: Result<Credential, SecretsError>) -> Self {
		Self {
			accept_token: true,
			issue,
			revoke_fails: false,
			revoke_delay: Duration::ZERO,
			authenticate_calls: AtomicUsize::new(0),
			issue_calls: AtomicUsize::new(0),
			revoke_calls: AtomicUsize::new(0),
			log: None,
		}
	}

	pub fn rejecting_token(mut self) -> Self {
		self.accept_token = false;
		self
	}

	pub fn failing_revoke(mut self) -> Self {
		self.revoke_fails = true;
		self
	}

	/// Make each revoke take `delay` of (virtual) time.
	pub fn with_revoke_delay(mut self, delay: Duration) -> Self {
		self.revoke_delay = delay;
		self
	}

	pub fn with_log(mut self, log: Arc<EventLog>) -> Self {
		self.log = Some(log);
		self
	}

	/// The lease this double hands out.
	pub fn lease_id(&self) -> LeaseId {
		match self.issue {
			Ok(ref credential) => credential.lease_id().clone(),
			Err(_) => LeaseId::new(TEST_LEASE_ID),
		}
	}

	pub fn authenticate_count(&self) -> usize {
		self.authenticate_calls.load(Ordering::SeqCst)
	}

	pub fn issue_count(&self) -> usize {
		self.issue_calls.load(Ordering::SeqCst)
	}

	pub fn revoke_count(&self) -> usize {
		self.revoke_calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl SecretsClient for MockSecretsClient {
	async fn authenticate(&self) -> bool {
		self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
		self.accept_token
	}

	async fn issue_credential(&self, _role: &str) -> Result<Credential, SecretsError> {
		self.issue_calls.fetch_add(1, Ordering::SeqCst);
		self.issue.clone()
	}

	async fn revoke_lease(&self, lease_id: &LeaseId) -> Result<(), RevokeWarning> {
		self.revoke_calls.fetch_add(1, Ordering::SeqCst);
		if !self.revoke_delay.is_zero() {
			tokio::time::sleep(self.revoke_delay).await;
		}
		if let Some(ref log) = self.log {
			log.push(Event::Revoked(lease_id.clone()));
		}
		if self.revoke_fails {
			Err(RevokeWarning::new(lease_id.short(), "HTTP 400: lease not found"))
		} else {
			Ok(())
		}
	}
}

/// Connection double.
///
/// Commands starting with `SELECT`, `SHOW`, `DESCRIBE` or `EXPLAIN` return
/// one row; anything else affects one row. Individual commands can be
/// scripted with [`MockConnection::scripted`].
pub struct MockConnection {
	accept_open: bool,
	open: AtomicBool,
	username: Mutex<Option<String>>,
	scripted: HashMap<String, Result<CommandResult, CommandError>>,
	open_calls: AtomicUsize,
	execute_calls: AtomicUsize,
	commit_calls: AtomicUsize,
	rollback_calls: AtomicUsize,
	close_calls: AtomicUsize,
	effective_closes: AtomicUsize,
	log: Option<Arc<EventLog>>,
}

impl MockConnection {
	/// A closed connection that accepts any credential.
	pub fn new() -> Self {
		Self {
			accept_open: true,
			open: AtomicBool::new(false),
			username: Mutex::new(None),
			scripted: HashMap::new(),
			open_calls: AtomicUsize::new(0),
			execute_calls: AtomicUsize::new(0),
			commit_calls: AtomicUsize::new(0),
			rollback_calls: AtomicUsize::new(0),
			close_calls: AtomicUsize::new(0),
			effective_closes: AtomicUsize::new(0),
			log: None,
		}
	}

	/// A connection that is already open as `username`.
	pub fn opened(username: &str) -> Self {
		let connection = Self::new();
		connection.open.store(true, Ordering::SeqCst);
		connection.set_username(Some(username.to_string()));
		connection
	}

	pub fn refusing_open(mut self) -> Self {
		self.accept_open = false;
		self
	}

	pub fn scripted(
		mut self,
		command: &str,
		result: Result<CommandResult, CommandError>,
	) -> Self {
		self.scripted.insert(command.to_string(), result);
		self
	}

	pub fn with_log(mut self, log: Arc<EventLog>) -> Self {
		self.log = Some(log);
		self
	}

	pub fn is_open(&self) -> bool {
		self.open.load(Ordering::SeqCst)
	}

	pub fn open_count(&self) -> usize {
		self.open_calls.load(Ordering::SeqCst)
	}

	pub fn execute_count(&self) -> usize {
		self.execute_calls.load(Ordering::SeqCst)
	}

	pub fn commit_count(&self) -> usize {
		self.commit_calls.load(Ordering::SeqCst)
	}

	pub fn rollback_count(&self) -> usize {
		self.rollback_calls.load(Ordering::SeqCst)
	}

	/// Every call to `close`, including no-ops.
	pub fn close_calls(&self) -> usize {
		self.close_calls.load(Ordering::SeqCst)
	}

	/// Calls to `close` that actually closed an open connection.
	pub fn close_count(&self) -> usize {
		self.effective_closes.load(Ordering::SeqCst)
	}

	fn set_username(&self, username: Option<String>) {
		*self.username.lock().unwrap_or_else(|e| e.into_inner()) = username;
	}

	fn record(&self, event: Event) {
		if let Some(ref log) = self.log {
			log.push(event);
		}
	}

	fn default_result(command: &str) -> CommandResult {
		let head = command
			.split_whitespace()
			.next()
			.unwrap_or_default()
			.to_ascii_uppercase();
		match head.as_str() {
			"SELECT" | "SHOW" | "DESCRIBE" | "EXPLAIN" => CommandResult::Rows {
				columns: vec!["result".to_string()],
				rows: vec![vec!["1".to_string()]],
			},
			_ => CommandResult::Affected { count: 1 },
		}
	}
}

impl Default for MockConnection {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl ResourceConnection for MockConnection {
	async fn open(&self, _target: &ConnectTarget, username: &str, _password: &SecretString) -> bool {
		self.open_calls.fetch_add(1, Ordering::SeqCst);
		if !self.accept_open {
			return false;
		}
		self.open.store(true, Ordering::SeqCst);
		self.set_username(Some(username.to_string()));
		self.record(Event::Opened(username.to_string()));
		true
	}

	async fn execute(&self, command: &str) -> Result<CommandResult, CommandError> {
		self.execute_calls.fetch_add(1, Ordering::SeqCst);
		if !self.is_open() {
			return Err(CommandError::NotConnected);
		}
		self.record(Event::Executed(command.to_string()));
		match self.scripted.get(command) {
			Some(result) => result.clone(),
			None => Ok(Self::default_result(command)),
		}
	}

	async fn commit(&self) {
		self.commit_calls.fetch_add(1, Ordering::SeqCst);
		self.record(Event::Committed);
	}

	async fn rollback(&self) {
		self.rollback_calls.fetch_add(1, Ordering::SeqCst);
		self.record(Event::RolledBack);
	}

	async fn close(&self) {
		self.close_calls.fetch_add(1, Ordering::SeqCst);
		if self.open.swap(false, Ordering::SeqCst) {
			self.effective_closes.fetch_add(1, Ordering::SeqCst);
			self.record(Event::Closed);
		}
		self.set_username(None);
	}

	async fn is_connected(&self) -> bool {
		self.is_open()
	}

	fn bound_username(&self) -> Option<String> {
		self.username
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.clone()
	}
}

/// One scripted action of a [`ScriptedForeground`].
#[derive(Debug, Clone)]
pub enum Step {
	/// Run a command, ending the session first if the connection is gone.
	Command(String),
	Sleep(Duration),
	/// Poll liveness at the given interval until the connection drops.
	UntilDisconnected(Duration),
	End(SessionEnd),
	Panic,
}

/// A foreground session that plays back a fixed list of steps.
#[derive(Debug, Default)]
pub struct ScriptedForeground {
	steps: Vec<Step>,
	results: Vec<Dispatched>,
}

impl ScriptedForeground {
	pub fn new(steps: Vec<Step>) -> Self {
		Self {
			steps,
			results: Vec::new(),
		}
	}

	/// Outcome of every command that ran.
	pub fn results(&self) -> &[Dispatched] {
		&self.results
	}
}

#[async_trait]
impl ForegroundSession for ScriptedForeground {
	async fn run(&mut self, connection: Arc<dyn ResourceConnection>) -> SessionEnd {
		for step in std::mem::take(&mut self.steps) {
			match step {
				Step::Command(command) => {
					if !connection.is_connected().await {
						return SessionEnd::ConnectionLost;
					}
					let outcome = dispatch_command(connection.as_ref(), &command).await;
					self.results.push(outcome);
				}
				Step::Sleep(duration) => tokio::time::sleep(duration).await,
				Step::UntilDisconnected(poll) => loop {
					if !connection.is_connected().await {
						return SessionEnd::ConnectionLost;
					}
					tokio::time::sleep(poll).await;
				},
				Step::End(end) => return end,
				Step::Panic => panic!("scripted foreground panic"),
			}
		}
		SessionEnd::EndOfInput
	}
}
