// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! MySQL adapter for the `ResourceConnection` contract.

pub mod error;
pub mod mysql;

pub use error::{ConnectionError, Result, ER_ACCESS_DENIED};
pub use mysql::{describe_target, MySqlResource, NULL_DISPLAY};
