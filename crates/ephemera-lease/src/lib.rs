// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lease lifecycle for dynamic database credentials.
//!
//! A [`SessionCoordinator`] obtains a credential, opens a connection with it,
//! starts a [`LeaseMonitor`] that fires shortly before the lease expires, and
//! hands the connection to a [`ForegroundSession`]. Whichever of the two
//! finishes first closes the connection and revokes the lease through
//! [`LeaseState::revoke_once`]; the other finds the lease already revoked.

pub mod dispatch;
pub mod error;
pub mod foreground;
pub mod monitor;
pub mod session;
pub mod state;
pub mod testing;

pub use dispatch::{dispatch_command, Dispatched};
pub use error::{Result, SessionError};
pub use foreground::{ForegroundSession, SessionEnd};
pub use monitor::{compute_wake_delay, LeaseMonitor, MonitorHandle, MonitorPhase};
pub use session::{
	require_token, SessionCoordinator, SessionReport, SessionSettings,
	DEFAULT_MONITOR_SHUTDOWN_GRACE,
};
pub use state::{LeaseState, RevokeActor, RevokeOutcome};
