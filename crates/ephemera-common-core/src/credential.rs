// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Dynamic credentials and the lease that bounds them.

use std::fmt;
use std::time::Duration;

use ephemera_common_secret::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::SecretsError;

/// Number of lease id characters shown in log output.
const LEASE_ID_PREFIX_LEN: usize = 8;

/// Opaque identifier of a lease held by the secrets service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(String);

impl LeaseId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Leading characters of the id followed by an ellipsis, for logs.
	pub fn short(&self) -> String {
		match self.0.char_indices().nth(LEASE_ID_PREFIX_LEN) {
			Some((idx, _)) => format!("{}...", &self.0[..idx]),
			None => self.0.clone(),
		}
	}
}

impl fmt::Display for LeaseId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// A username/password pair issued for the lifetime of one lease.
///
/// Built once from a secrets-service response and never mutated. The
/// password stays wrapped so it cannot end up in a log line.
#[derive(Clone, Debug)]
pub struct Credential {
	username: String,
	password: SecretString,
	lease_id: LeaseId,
	lease_duration: Duration,
}

impl Credential {
	/// Build a credential, rejecting any field the lifecycle depends on.
	pub fn new(
		username: impl Into<String>,
		password: SecretString,
		lease_id: LeaseId,
		lease_duration_secs: u64,
	) -> Result<Self, SecretsError> {
		let username = username.into();
		if username.is_empty() {
			return Err(SecretsError::MalformedResponse("empty username".into()));
		}
		if password.expose().is_empty() {
			return Err(SecretsError::MalformedResponse("empty password".into()));
		}
		if lease_id.is_empty() {
			return Err(SecretsError::MalformedResponse("empty lease_id".into()));
		}
		if lease_duration_secs == 0 {
			return Err(SecretsError::MalformedResponse(
				"lease_duration must be greater than zero".into(),
			));
		}

		Ok(Self {
			username,
			password,
			lease_id,
			lease_duration: Duration::from_secs(lease_duration_secs),
		})
	}

	pub fn username(&self) -> &str {
		&self.username
	}

	pub fn password(&self) -> &SecretString {
		&self.password
	}

	pub fn lease_id(&self) -> &LeaseId {
		&self.lease_id
	}

	pub fn lease_duration(&self) -> Duration {
		self.lease_duration
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn lease() -> LeaseId {
		LeaseId::new("database/creds/my-admin-role/3fQpZ1kWm8")
	}

	#[test]
	fn credential_requires_positive_duration() {
		let err = Credential::new("v-root-abc", "pw".into(), lease(), 0).unwrap_err();
		assert!(matches!(err, SecretsError::MalformedResponse(_)));
	}

	#[test]
	fn credential_rejects_missing_fields() {
		assert!(Credential::new("", "pw".into(), lease(), 60).is_err());
		assert!(Credential::new("user", "".into(), lease(), 60).is_err());
		assert!(Credential::new("user", "pw".into(), LeaseId::new(""), 60).is_err());
	}

	#[test]
	fn credential_debug_hides_password() {
		let cred = Credential::new("v-root-abc", "hunter2-dyn".into(), lease(), 60).unwrap();
		let debug = format!("{cred:?}");
		assert!(debug.contains("v-root-abc"));
		assert!(!debug.contains("hunter2-dyn"));
		assert_eq!(cred.lease_duration(), Duration::from_secs(60));
	}

	#[test]
	fn short_lease_id_truncates() {
		assert_eq!(lease().short(), "database...");
		assert_eq!(LeaseId::new("abc").short(), "abc");
		assert_eq!(LeaseId::new("12345678").short(), "12345678");
	}

	#[test]
	fn lease_id_serializes_as_plain_string() {
		let json = serde_json::to_string(&LeaseId::new("x/y")).unwrap();
		assert_eq!(json, r#""x/y""#);
	}
}
