// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background task that ends the session just before the lease expires.

use std::sync::Arc;
use std::time::Duration;

use ephemera_common_core::{LeaseId, ResourceConnection, SecretsClient};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::state::{LeaseState, RevokeActor, RevokeOutcome};

/// Where the monitor is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
	Scheduled,
	Sleeping,
	Firing,
	Done,
	/// Cancelled while sleeping; it never fired.
	Cancelled,
}

impl MonitorPhase {
	pub fn is_terminal(self) -> bool {
		matches!(self, MonitorPhase::Done | MonitorPhase::Cancelled)
	}
}

/// Time to sleep before acting: `lease_duration - warning_buffer`.
///
/// A buffer at or beyond the lease duration clamps to zero, so the monitor
/// fires immediately.
pub fn compute_wake_delay(lease_duration: Duration, warning_buffer: Duration) -> Duration {
	if warning_buffer >= lease_duration {
		warn!(
			lease_duration_secs = lease_duration.as_secs(),
			warning_buffer_secs = warning_buffer.as_secs(),
			"warning buffer is not shorter than the lease, monitor will fire immediately"
		);
		return Duration::ZERO;
	}
	lease_duration - warning_buffer
}

/// A not-yet-started lease monitor.
pub struct LeaseMonitor {
	secrets: Arc<dyn SecretsClient>,
	connection: Arc<dyn ResourceConnection>,
	state: Arc<LeaseState>,
	lease_id: LeaseId,
	wake_delay: Duration,
}

impl LeaseMonitor {
	pub fn new(
		secrets: Arc<dyn SecretsClient>,
		connection: Arc<dyn ResourceConnection>,
		state: Arc<LeaseState>,
		lease_id: LeaseId,
		wake_delay: Duration,
	) -> Self {
		Self {
			secrets,
			connection,
			state,
			lease_id,
			wake_delay,
		}
	}

	pub fn wake_delay(&self) -> Duration {
		self.wake_delay
	}

	/// Start the monitor on the current runtime.
	pub fn spawn(self) -> MonitorHandle {
		let cancel = CancellationToken::new();
		let (phase_tx, phase_rx) = watch::channel(MonitorPhase::Scheduled);
		let join = tokio::spawn(self.run(cancel.clone(), phase_tx));
		MonitorHandle {
			cancel,
			phase: phase_rx,
			join: Some(join),
		}
	}

	#[instrument(skip_all, fields(lease_id = %self.lease_id.short(), wake_delay_secs = self.wake_delay.as_secs()))]
	async fn run(
		self,
		cancel: CancellationToken,
		phase: watch::Sender<MonitorPhase>,
	) -> MonitorPhase {
		phase.send_replace(MonitorPhase::Sleeping);
		debug!("lease monitor sleeping");

		tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				debug!("lease monitor cancelled before firing");
				phase.send_replace(MonitorPhase::Cancelled);
				return MonitorPhase::Cancelled;
			}
			_ = tokio::time::sleep(self.wake_delay) => {}
		}

		phase.send_replace(MonitorPhase::Firing);
		warn!("lease is about to expire, closing connection and revoking");

		// Close first so nothing keeps using a credential about to die.
		if self.connection.is_connected().await {
			info!("closing database connection ahead of lease expiry");
		}
		self.connection.close().await;

		let outcome = self
			.state
			.revoke_once(self.secrets.as_ref(), &self.lease_id, RevokeActor::Monitor)
			.await;
		if outcome == RevokeOutcome::AlreadyRevoked {
			debug!("session already torn down");
		}

		phase.send_replace(MonitorPhase::Done);
		MonitorPhase::Done
	}
}

/// Handle to a running monitor. Dropping it cancels the pending sleep.
pub struct MonitorHandle {
	cancel: CancellationToken,
	phase: watch::Receiver<MonitorPhase>,
	join: Option<JoinHandle<MonitorPhase>>,
}

impl MonitorHandle {
	pub fn phase(&self) -> MonitorPhase {
		*self.phase.borrow()
	}

	/// Subscribe to phase changes.
	pub fn phase_watch(&self) -> watch::Receiver<MonitorPhase> {
		self.phase.clone()
	}

	/// Request cancellation. Has no effect once the monitor is firing.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Wait for the monitor to finish on its own.
	pub async fn wait(mut self) -> MonitorPhase {
		match self.join.take() {
			Some(join) => join.await.unwrap_or_else(|e| {
				warn!(error = %e, "lease monitor task failed");
				MonitorPhase::Done
			}),
			None => self.phase(),
		}
	}

	/// Cancel and wait up to `grace` for the task to stop.
	///
	/// If the grace period runs out the task is left to finish detached and
	/// the last observed phase is returned.
	pub async fn shutdown(mut self, grace: Duration) -> MonitorPhase {
		self.cancel.cancel();
		let Some(mut join) = self.join.take() else {
			return self.phase();
		};

		match tokio::time::timeout(grace, &mut join).await {
			Ok(Ok(phase)) => phase,
			Ok(Err(e)) => {
				warn!(error = %e, "lease monitor task failed");
				self.phase()
			}
			Err(_) => {
				warn!(
					grace_ms = grace.as_millis() as u64,
					phase = ?self.phase(),
					"lease monitor did not stop in time, abandoning it"
				);
				self.phase()
			}
		}
	}
}

impl Drop for MonitorHandle {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

impl std::fmt::Debug for MonitorHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MonitorHandle")
			.field("phase", &self.phase())
			.field("cancelled", &self.cancel.is_cancelled())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{MockConnection, MockSecretsClient};
	use proptest::prelude::*;
	use tokio::time::Instant;

	fn monitor(
		secrets: &Arc<MockSecretsClient>,
		connection: &Arc<MockConnection>,
		state: &Arc<LeaseState>,
		wake_delay: Duration,
	) -> LeaseMonitor {
		LeaseMonitor::new(
			secrets.clone(),
			connection.clone(),
			state.clone(),
			secrets.lease_id(),
			wake_delay,
		)
	}

	#[test]
	fn wake_delay_subtracts_buffer() {
		assert_eq!(
			compute_wake_delay(Duration::from_secs(40), Duration::from_secs(10)),
			Duration::from_secs(30)
		);
	}

	#[test]
	fn wake_delay_clamps_to_zero() {
		assert_eq!(
			compute_wake_delay(Duration::from_secs(5), Duration::from_secs(30)),
			Duration::ZERO
		);
		assert_eq!(
			compute_wake_delay(Duration::from_secs(10), Duration::from_secs(10)),
			Duration::ZERO
		);
	}

	#[tokio::test(start_paused = true)]
	async fn fires_after_wake_delay() {
		let secrets = Arc::new(MockSecretsClient::with_lease(40));
		let connection = Arc::new(MockConnection::opened("v-user"));
		let state = Arc::new(LeaseState::new());

		let start = Instant::now();
		let handle = monitor(&secrets, &connection, &state, Duration::from_secs(30)).spawn();
		assert_eq!(handle.wait().await, MonitorPhase::Done);

		assert_eq!(start.elapsed(), Duration::from_secs(30));
		assert_eq!(connection.close_count(), 1);
		assert_eq!(secrets.revoke_count(), 1);
		assert_eq!(state.revoked_by().await, Some(RevokeActor::Monitor));
	}

	#[tokio::test(start_paused = true)]
	async fn cancel_while_sleeping_never_fires() {
		let secrets = Arc::new(MockSecretsClient::with_lease(3600));
		let connection = Arc::new(MockConnection::opened("v-user"));
		let state = Arc::new(LeaseState::new());

		let handle = monitor(&secrets, &connection, &state, Duration::from_secs(3590)).spawn();
		let start = Instant::now();
		let phase = handle.shutdown(Duration::from_secs(2)).await;

		assert_eq!(phase, MonitorPhase::Cancelled);
		assert!(start.elapsed() < Duration::from_secs(1));
		assert_eq!(secrets.revoke_count(), 0);
		assert_eq!(connection.close_count(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn dropping_handle_cancels() {
		let secrets = Arc::new(MockSecretsClient::with_lease(60));
		let connection = Arc::new(MockConnection::opened("v-user"));
		let state = Arc::new(LeaseState::new());

		let handle = monitor(&secrets, &connection, &state, Duration::from_secs(50)).spawn();
		let mut phase = handle.phase_watch();
		drop(handle);

		phase
			.wait_for(|p| p.is_terminal())
			.await
			.expect("monitor dropped its phase sender");
		assert_eq!(*phase.borrow(), MonitorPhase::Cancelled);
		tokio::time::sleep(Duration::from_secs(120)).await;
		assert_eq!(secrets.revoke_count(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn firing_observes_earlier_revoke() {
		let secrets = Arc::new(MockSecretsClient::with_lease(20));
		let connection = Arc::new(MockConnection::opened("v-user"));
		let state = Arc::new(LeaseState::new());
		state
			.revoke_once(secrets.as_ref(), &secrets.lease_id(), RevokeActor::Teardown)
			.await;

		let handle = monitor(&secrets, &connection, &state, Duration::from_secs(10)).spawn();
		assert_eq!(handle.wait().await, MonitorPhase::Done);
		assert_eq!(secrets.revoke_count(), 1);
		assert_eq!(state.revoked_by().await, Some(RevokeActor::Teardown));
	}

	proptest! {
		#[test]
		fn wake_delay_never_exceeds_lease(lease in 1u64..100_000, buffer in 0u64..200_000) {
			let delay = compute_wake_delay(Duration::from_secs(lease), Duration::from_secs(buffer));
			prop_assert!(delay <= Duration::from_secs(lease));
			prop_assert_eq!(delay, Duration::from_secs(lease.saturating_sub(buffer)));
		}
	}
}
