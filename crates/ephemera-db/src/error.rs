// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use sqlx::mysql::MySqlDatabaseError;

/// MySQL server error number for a rejected user/password pair.
pub const ER_ACCESS_DENIED: u16 = 1045;

/// Why a connection could not be opened.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
	#[error("access denied: {0}")]
	AccessDenied(String),

	#[error("timed out after {0:?}")]
	Timeout(Duration),

	#[error("connection is already open")]
	AlreadyOpen,

	#[error("database error: {0}")]
	Sqlx(#[from] sqlx::Error),
}

impl ConnectionError {
	/// Classify a driver error raised while connecting.
	pub fn from_connect(err: sqlx::Error) -> Self {
		if let sqlx::Error::Database(ref db) = err {
			if let Some(mysql) = db.try_downcast_ref::<MySqlDatabaseError>() {
				if mysql.number() == ER_ACCESS_DENIED {
					return Self::AccessDenied(mysql.message().to_string());
				}
			}
		}
		Self::Sqlx(err)
	}

	pub fn is_access_denied(&self) -> bool {
		matches!(self, Self::AccessDenied(_))
	}
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
