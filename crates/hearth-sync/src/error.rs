//! Synchronization error taxonomy.
//!
//! Transport failures are retried only by the next scheduled pass. An auth
//! failure triggers one fresh login; when that fails too, session-gated
//! operations are skipped while public credential-keyed ones still run.
//! Shape failures mean "no value", never a propagated error. Identity
//! resolution failures block only the scoped operations of one device.

use reqwest::StatusCode;
use thiserror::Error;

/// Error type for remote-platform synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network-level failure talking to the remote platform
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Login rejected or session could not be established
    #[error("authentication with the remote platform failed (status {status})")]
    Auth { status: StatusCode },

    /// Remote platform answered an operation with a non-success status
    #[error("{operation} failed with status {status}")]
    Status {
        operation: &'static str,
        status: StatusCode,
    },

    /// Response body did not carry the expected structure
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),

    /// Device has no remote access credential
    #[error("device {device} has no remote access credential")]
    MissingCredential { device: String },

    /// Device credential could not be mapped to a remote identity
    #[error("no remote identity found for the given access credential")]
    IdentityResolution,
}

impl SyncError {
    /// Whether the failure is an authentication problem.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}
