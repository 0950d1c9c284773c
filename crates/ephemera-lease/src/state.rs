// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The shared revoked flag and the single path to `revoke_lease`.

use std::fmt;

use ephemera_common_core::{LeaseId, RevokeWarning, SecretsClient};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Who performed the revoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeActor {
	Monitor,
	Teardown,
}

impl fmt::Display for RevokeActor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RevokeActor::Monitor => f.write_str("monitor"),
			RevokeActor::Teardown => f.write_str("teardown"),
		}
	}
}

/// Result of a [`LeaseState::revoke_once`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeOutcome {
	/// This call revoked the lease.
	Revoked,
	/// This call attempted the revoke and it failed. The lease still counts
	/// as revoked and will not be attempted again.
	Failed(RevokeWarning),
	/// Another caller already made the attempt.
	AlreadyRevoked,
}

impl RevokeOutcome {
	/// Whether this call was the one that talked to the secrets service.
	pub fn attempted(&self) -> bool {
		!matches!(self, RevokeOutcome::AlreadyRevoked)
	}
}

#[derive(Debug, Default)]
struct Inner {
	revoked: bool,
	revoked_by: Option<RevokeActor>,
}

/// Per-session lease flag shared by the monitor and the teardown path.
///
/// The lock is held across the revoke request, so a second caller waits
/// for the first to finish and then observes `revoked == true`.
#[derive(Debug, Default)]
pub struct LeaseState {
	inner: Mutex<Inner>,
}

impl LeaseState {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn is_revoked(&self) -> bool {
		self.inner.lock().await.revoked
	}

	pub async fn revoked_by(&self) -> Option<RevokeActor> {
		self.inner.lock().await.revoked_by
	}

	/// Revoke `lease_id` unless someone already tried.
	///
	/// The flag flips to revoked whatever the service answers; a failed
	/// revoke is logged and never retried.
	pub async fn revoke_once(
		&self,
		secrets: &dyn SecretsClient,
		lease_id: &LeaseId,
		actor: RevokeActor,
	) -> RevokeOutcome {
		let mut inner = self.inner.lock().await;
		if inner.revoked {
			debug!(%actor, lease_id = %lease_id.short(), "lease already revoked");
			return RevokeOutcome::AlreadyRevoked;
		}

		let result = secrets.revoke_lease(lease_id).await;
		inner.revoked = true;
		inner.revoked_by = Some(actor);

		match result {
			Ok(()) => {
				info!(%actor, lease_id = %lease_id.short(), "lease revoked");
				RevokeOutcome::Revoked
			}
			Err(warning) => {
				warn!(%actor, %warning, "lease revoke failed, not retrying");
				RevokeOutcome::Failed(warning)
			}
		}
	}
}
