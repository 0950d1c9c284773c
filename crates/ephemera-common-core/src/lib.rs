// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

pub mod connection;
pub mod credential;
pub mod error;
pub mod secrets;

pub use connection::*;
pub use credential::*;
pub use error::*;
pub use secrets::*;
