// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HashiCorp Vault adapter for the `SecretsClient` contract.
//!
//! Credentials come from a database secrets engine
//! (`GET /v1/{mount}/creds/{role}`) and are revoked through
//! `PUT /v1/sys/leases/revoke`. The token is sent as `X-Vault-Token` and
//! never appears in `Debug` output or logs.
//!
//! ```ignore
//! use ephemera_vault::{ClientConfig, VaultClient};
//!
//! let client = VaultClient::with_config(ClientConfig {
//!     address: "https://vault.internal:8200".into(),
//!     token: token.clone(),
//!     mount: "database".into(),
//!     allow_insecure: false,
//! })?;
//! if client.authenticate().await {
//!     let credential = client.issue_credential("readonly").await?;
//! }
//! ```

mod client;
mod error;

pub use client::{ClientConfig, VaultClient, DEFAULT_MOUNT};
pub use error::{VaultError, VaultResult};
