// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors from issuing a dynamic credential.
#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum SecretsError {
	#[error("secrets client is not authenticated")]
	NotAuthenticated,

	#[error("malformed response from secrets service: {0}")]
	MalformedResponse(String),

	#[error("access denied: {0}")]
	AccessDenied(String),

	#[error("secrets service error: {0}")]
	ServiceError(String),
}

/// A lease revocation that did not go through.
///
/// The usual cause is a lease that already expired or was revoked by someone
/// else, so this is reported and never escalated.
#[derive(Clone, Error, Debug, PartialEq, Eq)]
#[error("revoke of lease {lease_id} failed: {reason}")]
pub struct RevokeWarning {
	pub lease_id: String,
	pub reason: String,
}

impl RevokeWarning {
	pub fn new(lease_id: impl Into<String>, reason: impl Into<String>) -> Self {
		Self {
			lease_id: lease_id.into(),
			reason: reason.into(),
		}
	}
}

/// Errors from running a single command against the data store.
///
/// None of these end the session on their own; the caller rolls back and
/// returns to the prompt.
#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum CommandError {
	#[error("not connected")]
	NotConnected,

	#[error("command failed: {0}")]
	Execution(String),

	#[error("command interrupted: connection was closed")]
	Interrupted,
}
