// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ephemera_common_core::SecretsError;
use thiserror::Error;

/// Failures that stop a session before the foreground starts.
#[derive(Debug, Error)]
pub enum SessionError {
	#[error("configuration error: {0}")]
	Config(String),

	#[error("authentication with the secrets service failed: {0}")]
	Auth(String),

	#[error("could not obtain a credential: {0}")]
	Credential(#[from] SecretsError),

	#[error("could not connect to the data store: {0}")]
	Connect(String),
}

impl SessionError {
	/// Process exit status for this failure.
	pub fn exit_code(&self) -> i32 {
		match self {
			SessionError::Config(_) => 2,
			SessionError::Auth(_) => 3,
			SessionError::Credential(_) => 4,
			SessionError::Connect(_) => 5,
		}
	}
}

pub type Result<T> = std::result::Result<T, SessionError>;
