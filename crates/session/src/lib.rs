//! Session lifecycle for the Blackfynn client.
//!
//! [`SessionManager`] owns the one session of a client instance: it
//! exchanges credentials for a token through an [`Authenticator`], renews the
//! token in a background task before it expires, and refuses to rotate the
//! token while [`OperationTracker`] reports calls in flight.

mod manager;
mod tracker;
mod types;

pub use manager::SessionManager;
pub use tracker::{OperationGuard, OperationId, OperationTracker};
pub use types::{Authenticator, AuthFuture, Credentials, DEFAULT_RENEWAL_MARGIN, Session, SessionConfig};

/// Errors produced by the session layer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("session manager shut down")]
    Shutdown,
}
