// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Vault client implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ephemera_common_core::{Credential, LeaseId, RevokeWarning, SecretsClient, SecretsError};
use ephemera_common_secret::SecretString;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{VaultError, VaultResult};

/// Default mount point of the database secrets engine.
pub const DEFAULT_MOUNT: &str = "database";

const TOKEN_HEADER: &str = "X-Vault-Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_MAX_LEN: usize = 200;

/// Configuration for the Vault client.
pub struct ClientConfig {
	/// Base address, e.g. `https://vault.internal:8200`.
	pub address: String,
	pub token: SecretString,
	/// Mount point of the database secrets engine.
	pub mount: String,
	/// Whether to allow plain HTTP to non-loopback hosts. Default: false
	pub allow_insecure: bool,
}

/// Response from `{mount}/creds/{role}`.
#[derive(Debug, Deserialize)]
struct CredsResponse {
	lease_id: Option<String>,
	lease_duration: Option<u64>,
	#[allow(dead_code)]
	#[serde(default)]
	renewable: bool,
	data: Option<CredsData>,
}

#[derive(Deserialize)]
struct CredsData {
	username: Option<String>,
	password: Option<SecretString>,
}

impl std::fmt::Debug for CredsData {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CredsData")
			.field("username", &self.username)
			.field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
			.finish()
	}
}

/// Vault's error envelope.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
	#[serde(default)]
	errors: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RevokeRequest<'a> {
	lease_id: &'a str,
}

/// Client for Vault's token and database secrets endpoints.
pub struct VaultClient {
	http_client: reqwest::Client,
	address: String,
	token: SecretString,
	mount: String,
	authenticated: AtomicBool,
}

impl VaultClient {
	/// Create a client from explicit configuration.
	///
	/// # Security
	///
	/// Plain HTTP addresses are refused unless they point at a loopback host
	/// or `allow_insecure` is set.
	pub fn with_config(config: ClientConfig) -> VaultResult<Self> {
		let address = config.address.trim_end_matches('/').to_string();
		if address.is_empty() {
			return Err(VaultError::Configuration("Vault address is empty".into()));
		}
		if !config.allow_insecure && !address.starts_with("https://") && !is_loopback(&address) {
			return Err(VaultError::Configuration(
				"Vault address must use HTTPS (set allow_insecure=true for plain HTTP)".into(),
			));
		}
		if config.token.is_blank() {
			return Err(VaultError::Configuration("Vault token is empty".into()));
		}

		let mount = config.mount.trim_matches('/').to_string();
		let mount = if mount.is_empty() {
			DEFAULT_MOUNT.to_string()
		} else {
			mount
		};

		let http_client = reqwest::Client::builder()
			.timeout(REQUEST_TIMEOUT)
			.redirect(reqwest::redirect::Policy::none())
			.build()?;

		Ok(Self {
			http_client,
			address,
			token: config.token,
			mount,
			authenticated: AtomicBool::new(false),
		})
	}

	pub fn address(&self) -> &str {
		&self.address
	}

	pub fn mount(&self) -> &str {
		&self.mount
	}

	/// Whether the last [`SecretsClient::authenticate`] call succeeded.
	pub fn is_authenticated(&self) -> bool {
		self.authenticated.load(Ordering::Acquire)
	}

	fn url(&self, path: &str) -> String {
		format!("{}/v1/{}", self.address, path)
	}

	/// Pull the first human readable error out of a failed response.
	async fn error_detail(response: reqwest::Response) -> String {
		let body = response.text().await.unwrap_or_default();
		match serde_json::from_str::<ErrorResponse>(&body) {
			Ok(parsed) if !parsed.errors.is_empty() => {
				sanitize_body_for_error(&parsed.errors.join("; "), ERROR_BODY_MAX_LEN)
			}
			_ => sanitize_body_for_error(&body, ERROR_BODY_MAX_LEN),
		}
	}
}

#[async_trait]
impl SecretsClient for VaultClient {
	#[instrument(skip(self), fields(address = %self.address))]
	async fn authenticate(&self) -> bool {
		let response = self
			.http_client
			.get(self.url("auth/token/lookup-self"))
			.header(TOKEN_HEADER, self.token.expose())
			.send()
			.await;

		let accepted = match response {
			Ok(response) if response.status().is_success() => {
				debug!("Vault token accepted");
				true
			}
			Ok(response) => {
				let status = response.status();
				let detail = Self::error_detail(response).await;
				warn!(status = %status, detail = %detail, "Vault rejected token");
				false
			}
			Err(e) => {
				warn!(error = %e, "Vault unreachable during authentication");
				false
			}
		};
		self.authenticated.store(accepted, Ordering::Release);
		accepted
	}

	#[instrument(skip(self), fields(mount = %self.mount))]
	async fn issue_credential(&self, role: &str) -> Result<Credential, SecretsError> {
		if !self.is_authenticated() {
			return Err(SecretsError::NotAuthenticated);
		}

		let url = self.url(&format!("{}/creds/{}", self.mount, role));
		debug!(url = %url, "requesting dynamic credential");

		let response = self
			.http_client
			.get(&url)
			.header(TOKEN_HEADER, self.token.expose())
			.send()
			.await
			.map_err(|e| SecretsError::ServiceError(format!("request failed: {e}")))?;

		let status = response.status();
		if status == StatusCode::FORBIDDEN {
			let detail = Self::error_detail(response).await;
			return Err(SecretsError::AccessDenied(if detail.is_empty() {
				"permission denied".to_string()
			} else {
				detail
			}));
		}
		if !status.is_success() {
			let detail = Self::error_detail(response).await;
			return Err(SecretsError::ServiceError(format!("HTTP {status}: {detail}")));
		}

		let body: CredsResponse = response
			.json()
			.await
			.map_err(|e| SecretsError::MalformedResponse(e.to_string()))?;

		let data = body
			.data
			.ok_or_else(|| SecretsError::MalformedResponse("missing data".into()))?;
		let username = data
			.username
			.ok_or_else(|| SecretsError::MalformedResponse("missing data.username".into()))?;
		let password = data
			.password
			.ok_or_else(|| SecretsError::MalformedResponse("missing data.password".into()))?;
		let lease_id = body
			.lease_id
			.map(LeaseId::new)
			.ok_or_else(|| SecretsError::MalformedResponse("missing lease_id".into()))?;
		let lease_duration = body
			.lease_duration
			.ok_or_else(|| SecretsError::MalformedResponse("missing lease_duration".into()))?;

		let credential = Credential::new(username, password, lease_id, lease_duration)?;

		info!(
			username = %credential.username(),
			lease_id = %credential.lease_id().short(),
			lease_duration_secs = lease_duration,
			"issued dynamic credential"
		);

		Ok(credential)
	}

	#[instrument(skip(self), fields(lease_id = %lease_id.short()))]
	async fn revoke_lease(&self, lease_id: &LeaseId) -> Result<(), RevokeWarning> {
		if lease_id.is_empty() {
			warn!("no lease id to revoke");
			return Err(RevokeWarning::new("", "empty lease id"));
		}

		let response = self
			.http_client
			.put(self.url("sys/leases/revoke"))
			.header(TOKEN_HEADER, self.token.expose())
			.json(&RevokeRequest {
				lease_id: lease_id.as_str(),
			})
			.send()
			.await
			.map_err(|e| RevokeWarning::new(lease_id.short(), format!("request failed: {e}")))?;

		let status = response.status();
		if status.is_success() {
			info!("lease revoked");
			Ok(())
		} else {
			let detail = Self::error_detail(response).await;
			Err(RevokeWarning::new(
				lease_id.short(),
				format!("HTTP {status}: {detail}"),
			))
		}
	}
}

impl std::fmt::Debug for VaultClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("VaultClient")
			.field("address", &self.address)
			.field("mount", &self.mount)
			.field("authenticated", &self.is_authenticated())
			.finish_non_exhaustive()
	}
}

/// `http://localhost`, `http://127.x.x.x` or `http://[::1]`, with any port.
fn is_loopback(address: &str) -> bool {
	let Some(rest) = address.strip_prefix("http://") else {
		return false;
	};
	let authority = rest.split('/').next().unwrap_or_default();
	let host = match authority.strip_prefix('[') {
		Some(v6) => v6.split(']').next().unwrap_or_default(),
		None => authority.split(':').next().unwrap_or_default(),
	};
	host.eq_ignore_ascii_case("localhost")
		|| host
			.parse::<std::net::IpAddr>()
			.map(|ip| ip.is_loopback())
			.unwrap_or(false)
}

fn sanitize_body_for_error(body: &str, max_len: usize) -> String {
	let sanitized: String = body
		.chars()
		.filter(|c| !c.is_control() || *c == ' ')
		.take(max_len)
		.collect();
	if body.chars().count() > max_len {
		format!("{sanitized}...")
	} else {
		sanitized
	}
}
