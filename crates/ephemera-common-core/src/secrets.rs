// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Contract for the secrets service that issues dynamic credentials.

use async_trait::async_trait;

use crate::credential::{Credential, LeaseId};
use crate::error::{RevokeWarning, SecretsError};

/// A secrets service able to issue and revoke leased database credentials.
#[async_trait]
pub trait SecretsClient: Send + Sync {
	/// Check the configured address/token pair against the service.
	///
	/// An invalid token yields `false`, never an error.
	async fn authenticate(&self) -> bool;

	/// Request a fresh credential bound to `role`.
	async fn issue_credential(&self, role: &str) -> Result<Credential, SecretsError>;

	/// Ask the service to invalidate a lease before its natural expiry.
	///
	/// Best effort and never retried. Callers outside the lease crate should
	/// go through `LeaseState::revoke_once` rather than calling this directly.
	async fn revoke_lease(&self, lease_id: &LeaseId) -> Result<(), RevokeWarning>;
}
