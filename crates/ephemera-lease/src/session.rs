// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session orchestration: acquire, connect, monitor, run, tear down.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use ephemera_common_core::{ConnectTarget, LeaseId, ResourceConnection, SecretsClient};
use ephemera_common_secret::SecretString;
use futures::FutureExt;
use tracing::{error, info, instrument, warn};

use crate::error::{Result, SessionError};
use crate::foreground::{ForegroundSession, SessionEnd};
use crate::monitor::{compute_wake_delay, LeaseMonitor, MonitorHandle, MonitorPhase};
use crate::state::{LeaseState, RevokeActor, RevokeOutcome};

/// Default time teardown waits for the monitor task to stop.
pub const DEFAULT_MONITOR_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Everything a session needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct SessionSettings {
	pub role: String,
	pub target: ConnectTarget,
	pub warning_buffer: Duration,
	pub monitor_shutdown_grace: Duration,
}

impl SessionSettings {
	pub fn new(role: impl Into<String>, target: ConnectTarget, warning_buffer: Duration) -> Self {
		Self {
			role: role.into(),
			target,
			warning_buffer,
			monitor_shutdown_grace: DEFAULT_MONITOR_SHUTDOWN_GRACE,
		}
	}

	pub fn with_monitor_shutdown_grace(mut self, grace: Duration) -> Self {
		self.monitor_shutdown_grace = grace;
		self
	}
}

/// How a session that got as far as the foreground ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
	pub username: String,
	pub lease_id: LeaseId,
	pub end: SessionEnd,
	/// Which actor revoked the lease. `None` only if teardown was abandoned.
	pub revoked_by: Option<RevokeActor>,
	pub monitor: MonitorPhase,
}

/// Reject a missing or blank secrets-service token.
pub fn require_token(token: Option<&SecretString>) -> Result<&SecretString> {
	match token {
		Some(token) if !token.is_blank() => Ok(token),
		_ => Err(SessionError::Config(
			"no Vault token configured (set VAULT_TOKEN or VAULT_TOKEN_FILE)".into(),
		)),
	}
}

/// Runs one credential lease from issue to revoke.
pub struct SessionCoordinator {
	secrets: Arc<dyn SecretsClient>,
	connection: Arc<dyn ResourceConnection>,
	settings: SessionSettings,
}

impl SessionCoordinator {
	pub fn new(
		secrets: Arc<dyn SecretsClient>,
		connection: Arc<dyn ResourceConnection>,
		settings: SessionSettings,
	) -> Self {
		Self {
			secrets,
			connection,
			settings,
		}
	}

	pub fn settings(&self) -> &SessionSettings {
		&self.settings
	}

	/// Run a whole session with `foreground` as the interactive part.
	///
	/// Errors are only returned for failures before the foreground starts.
	/// Once it starts, the connection is closed and the lease revoked exactly
	/// once on every exit path, including a foreground panic.
	#[instrument(skip_all, fields(role = %self.settings.role))]
	pub async fn run<F>(&self, foreground: &mut F) -> Result<SessionReport>
	where
		F: ForegroundSession + ?Sized,
	{
		if !self.secrets.authenticate().await {
			return Err(SessionError::Auth(
				"the secrets service rejected the token".into(),
			));
		}

		let credential = self.secrets.issue_credential(&self.settings.role).await?;
		let lease_id = credential.lease_id().clone();
		let username = credential.username().to_string();
		let lease_duration = credential.lease_duration();

		let state = Arc::new(LeaseState::new());

		if !self
			.connection
			.open(&self.settings.target, &username, credential.password())
			.await
		{
			// The lease exists but nothing uses it; give it back now.
			state
				.revoke_once(self.secrets.as_ref(), &lease_id, RevokeActor::Teardown)
				.await;
			return Err(SessionError::Connect(format!(
				"{}:{} refused user {}",
				self.settings.target.host, self.settings.target.port, username
			)));
		}
		drop(credential);

		let wake_delay = compute_wake_delay(lease_duration, self.settings.warning_buffer);
		info!(
			username = %username,
			lease_id = %lease_id.short(),
			lease_duration_secs = lease_duration.as_secs(),
			wake_delay_secs = wake_delay.as_secs(),
			"session started"
		);

		let monitor = LeaseMonitor::new(
			self.secrets.clone(),
			self.connection.clone(),
			state.clone(),
			lease_id.clone(),
			wake_delay,
		)
		.spawn();

		let guard = TeardownGuard::new(Teardown {
			secrets: self.secrets.clone(),
			connection: self.connection.clone(),
			state,
			lease_id: lease_id.clone(),
			monitor,
			grace: self.settings.monitor_shutdown_grace,
		});

		let end = match AssertUnwindSafe(foreground.run(self.connection.clone()))
			.catch_unwind()
			.await
		{
			Ok(end) => end,
			Err(_) => {
				error!("foreground session panicked");
				SessionEnd::Panicked
			}
		};
		info!(end = %end, "foreground session ended");

		let (revoked_by, monitor) = guard.run().await;

		Ok(SessionReport {
			username,
			lease_id,
			end,
			revoked_by,
			monitor,
		})
	}
}

/// The release half of a session.
struct Teardown {
	secrets: Arc<dyn SecretsClient>,
	connection: Arc<dyn ResourceConnection>,
	state: Arc<LeaseState>,
	lease_id: LeaseId,
	monitor: MonitorHandle,
	grace: Duration,
}

impl Teardown {
	/// Close, revoke once, then stop the monitor.
	async fn run(self) -> (Option<RevokeActor>, MonitorPhase) {
		self.connection.close().await;

		let outcome = self
			.state
			.revoke_once(self.secrets.as_ref(), &self.lease_id, RevokeActor::Teardown)
			.await;
		if let RevokeOutcome::Failed(ref warning) = outcome {
			warn!(%warning, "lease may stay valid until it expires");
		}

		let phase = self.monitor.shutdown(self.grace).await;
		let revoked_by = self.state.revoked_by().await;
		info!(?revoked_by, monitor = ?phase, "session torn down");
		(revoked_by, phase)
	}
}

/// Holds a [`Teardown`] until it is run.
///
/// If the session future is dropped before teardown ran (for example the
/// caller timed it out), the teardown is spawned onto the runtime instead.
struct TeardownGuard {
	teardown: Option<Teardown>,
}

impl TeardownGuard {
	fn new(teardown: Teardown) -> Self {
		Self {
			teardown: Some(teardown),
		}
	}

	async fn run(mut self) -> (Option<RevokeActor>, MonitorPhase) {
		match self.teardown.take() {
			Some(teardown) => teardown.run().await,
			None => (None, MonitorPhase::Done),
		}
	}
}

impl Drop for TeardownGuard {
	fn drop(&mut self) {
		let Some(teardown) = self.teardown.take() else {
			return;
		};
		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				warn!("session dropped before teardown, finishing it in the background");
				handle.spawn(async move {
					teardown.run().await;
				});
			}
			Err(_) => {
				error!(
					lease_id = %teardown.lease_id.short(),
					"session dropped outside a runtime, lease left to expire"
				);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{MockConnection, MockSecretsClient, ScriptedForeground, Step};

	fn settings(buffer_secs: u64) -> SessionSettings {
		SessionSettings::new(
			"my-admin-role",
			ConnectTarget::new("127.0.0.1", 3306),
			Duration::from_secs(buffer_secs),
		)
	}

	#[test]
	fn require_token_rejects_missing_and_blank() {
		assert!(matches!(require_token(None), Err(SessionError::Config(_))));
		let blank = SecretString::new("  ".to_string());
		assert!(matches!(
			require_token(Some(&blank)),
			Err(SessionError::Config(_))
		));
		let token = SecretString::new("hvs.ok".to_string());
		assert!(require_token(Some(&token)).is_ok());
	}

	#[tokio::test(start_paused = true)]
	async fn clean_exit_tears_down_once() {
		let secrets = Arc::new(MockSecretsClient::with_lease(60));
		let connection = Arc::new(MockConnection::new());
		let coordinator = SessionCoordinator::new(secrets.clone(), connection.clone(), settings(10));

		let mut foreground = ScriptedForeground::new(vec![
			Step::Command("SELECT 1".into()),
			Step::End(SessionEnd::UserExit),
		]);
		let report = coordinator.run(&mut foreground).await.unwrap();

		assert_eq!(report.end, SessionEnd::UserExit);
		assert_eq!(report.revoked_by, Some(RevokeActor::Teardown));
		assert_eq!(report.monitor, MonitorPhase::Cancelled);
		assert_eq!(connection.close_count(), 1);
		assert_eq!(secrets.revoke_count(), 1);
		assert!(connection.bound_username().is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn dropped_session_still_tears_down() {
		let secrets = Arc::new(MockSecretsClient::with_lease(600));
		let connection = Arc::new(MockConnection::new());
		let coordinator = SessionCoordinator::new(secrets.clone(), connection.clone(), settings(10));

		let mut foreground = ScriptedForeground::new(vec![Step::Sleep(Duration::from_secs(300))]);
		let result =
			tokio::time::timeout(Duration::from_secs(5), coordinator.run(&mut foreground)).await;
		assert!(result.is_err());

		// Let the spawned teardown run.
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert_eq!(secrets.revoke_count(), 1);
		assert!(!connection.is_open());
	}
}
