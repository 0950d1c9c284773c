// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for building the Vault client.

use thiserror::Error;

/// Errors raised before any request is made.
///
/// Failures of individual requests are reported through the shared
/// `SecretsError` and `RevokeWarning` types instead.
#[derive(Debug, Error)]
pub enum VaultError {
	/// Invalid address, missing token or similar.
	#[error("configuration error: {0}")]
	Configuration(String),

	/// The underlying HTTP client could not be built.
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),
}

pub type VaultResult<T> = Result<T, VaultError>;
