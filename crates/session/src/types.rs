use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Instant;

use crate::SessionError;

/// Fraction of the server-granted lifetime after which a session is renewed.
pub const DEFAULT_RENEWAL_MARGIN: f64 = 0.75;

/// What a successful authentication returns.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub organization_id: String,
    /// Lifetime granted by the server.
    pub expires_in: Duration,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"***REDACTED***")
            .field("organization_id", &self.organization_id)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Future returned by [`Authenticator::authenticate`].
pub type AuthFuture<'a> = Pin<Box<dyn Future<Output = Result<Credentials, SessionError>> + Send + 'a>>;

/// Exchanges stored credentials for a fresh session token.
///
/// The HTTP client implements this on top of `/account/api/session`;
/// tests substitute counting mocks.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self) -> AuthFuture<'_>;
}

/// The current session of a client instance.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub organization_id: String,
    /// Point after which the session must be renewed before use.
    pub expires_at: Instant,
    /// Cleared as soon as a renewal begins.
    pub valid: bool,
}

impl Session {
    /// Builds a session whose renewal deadline is `now + expires_in * margin`.
    pub fn from_credentials(credentials: Credentials, margin: f64, now: Instant) -> Self {
        let lifetime = credentials.expires_in.mul_f64(margin);
        Self {
            token: credentials.token,
            organization_id: credentials.organization_id,
            expires_at: now + lifetime,
            valid: true,
        }
    }

    /// `true` if the session is valid and its deadline has not passed.
    pub fn is_current(&self, now: Instant) -> bool {
        self.valid && now < self.expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"***REDACTED***")
            .field("organization_id", &self.organization_id)
            .field("expires_at", &self.expires_at)
            .field("valid", &self.valid)
            .finish()
    }
}

/// Tuning for [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Fraction of `expires_in` after which the session is renewed.
    pub renewal_margin: f64,
    /// How long a renewal waits for in-flight operations before rotating
    /// anyway. `None` waits indefinitely.
    pub drain_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            renewal_margin: DEFAULT_RENEWAL_MARGIN,
            drain_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(secs: u64) -> Credentials {
        Credentials {
            token: "secret-token".into(),
            organization_id: "N:organization:1".into(),
            expires_in: Duration::from_secs(secs),
        }
    }

    #[test]
    fn expiry_applies_margin() {
        let now = Instant::now();
        let session = Session::from_credentials(creds(3600), DEFAULT_RENEWAL_MARGIN, now);
        assert_eq!(session.expires_at, now + Duration::from_secs(2700));
        assert!(session.valid);
    }

    #[test]
    fn current_until_deadline() {
        let now = Instant::now();
        let session = Session::from_credentials(creds(100), 0.5, now);
        assert!(session.is_current(now));
        assert!(session.is_current(now + Duration::from_secs(49)));
        assert!(!session.is_current(now + Duration::from_secs(50)));
    }

    #[test]
    fn invalid_session_is_not_current() {
        let now = Instant::now();
        let mut session = Session::from_credentials(creds(100), 0.75, now);
        session.valid = false;
        assert!(!session.is_current(now));
    }

    #[test]
    fn debug_redacts_token() {
        let now = Instant::now();
        let session = Session::from_credentials(creds(100), 0.75, now);
        let out = format!("{session:?} {:?}", creds(1));
        assert!(!out.contains("secret-token"));
        assert!(out.contains("REDACTED"));
    }

    #[test]
    fn config_defaults() {
        let config = SessionConfig::default();
        assert!((config.renewal_margin - 0.75).abs() < f64::EPSILON);
        assert!(config.drain_timeout.is_none());
    }
}
