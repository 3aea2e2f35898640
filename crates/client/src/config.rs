use std::fmt;
use std::time::Duration;

use blackfynn_protocol::constants::{DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE};
use blackfynn_session::{DEFAULT_RENEWAL_MARGIN, SessionConfig};
use blackfynn_transfer::DEFAULT_CHUNK_SIZE;

use crate::error::{Error, Result};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings for one [`Client`](crate::Client) instance.
#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub api_secret: String,
    /// API root without a trailing slash.
    pub base_url: String,
    /// `pageSize` sent when listing packages.
    pub page_size: u32,
    /// Chunk size used when the upload service does not negotiate one.
    pub chunk_size: u64,
    /// Fraction of the granted session lifetime after which it is renewed.
    pub renewal_margin: f64,
    /// How long a renewal waits for in-flight calls. `None` waits forever.
    pub drain_timeout: Option<Duration>,
    /// Limit on each API request, connection included.
    pub timeout: Duration,
    /// Limit on a pre-signed file download. `None` lets it run as long as
    /// the transfer makes progress.
    pub download_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            renewal_margin: DEFAULT_RENEWAL_MARGIN,
            drain_timeout: None,
            timeout: DEFAULT_TIMEOUT,
            download_timeout: None,
            user_agent: concat!("blackfynn-rs/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_renewal_margin(mut self, margin: f64) -> Self {
        self.renewal_margin = margin;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Checks the settings before any request is made.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("API key is empty".into()));
        }
        if self.api_secret.trim().is_empty() {
            return Err(Error::Config("API secret is empty".into()));
        }
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid base URL {:?}: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "base URL must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.page_size == 0 {
            return Err(Error::Config("page size must be greater than zero".into()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk size must be greater than zero".into()));
        }
        if !(self.renewal_margin > 0.0 && self.renewal_margin <= 1.0) {
            return Err(Error::Config(format!(
                "renewal margin must be in (0, 1], got {}",
                self.renewal_margin
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("request timeout must be non-zero".into()));
        }
        Ok(())
    }

    pub(crate) fn session_config(&self) -> SessionConfig {
        SessionConfig {
            renewal_margin: self.renewal_margin,
            drain_timeout: self.drain_timeout,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"***REDACTED***")
            .field("api_secret", &"***REDACTED***")
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("chunk_size", &self.chunk_size)
            .field("renewal_margin", &self.renewal_margin)
            .field("drain_timeout", &self.drain_timeout)
            .field("timeout", &self.timeout)
            .field("download_timeout", &self.download_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("key", "secret");
        assert_eq!(config.base_url, "https://api.blackfynn.io");
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.chunk_size, 5_000_000);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.drain_timeout.is_none());
        assert!(config.download_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn trailing_slash_trimmed() {
        let config = ClientConfig::new("k", "s").with_base_url("http://localhost:8080/");
        assert_eq!(config.base_url, "http://localhost:8080");
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(ClientConfig::new("", "s").validate().is_err());
        assert!(ClientConfig::new("k", " ").validate().is_err());
        assert!(
            ClientConfig::new("k", "s")
                .with_base_url("not a url")
                .validate()
                .is_err()
        );
        assert!(
            ClientConfig::new("k", "s")
                .with_base_url("ftp://example.com")
                .validate()
                .is_err()
        );
        assert!(ClientConfig::new("k", "s").with_page_size(0).validate().is_err());
        assert!(ClientConfig::new("k", "s").with_chunk_size(0).validate().is_err());
        assert!(
            ClientConfig::new("k", "s")
                .with_renewal_margin(1.5)
                .validate()
                .is_err()
        );
        assert!(
            ClientConfig::new("k", "s")
                .with_renewal_margin(0.0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn debug_redacts_credentials() {
        let config = ClientConfig::new("my-key", "my-secret");
        let out = format!("{config:?}");
        assert!(!out.contains("my-key"));
        assert!(!out.contains("my-secret"));
        assert!(out.contains("api.blackfynn.io"));
    }

    #[test]
    fn session_config_carries_margin() {
        let config = ClientConfig::new("k", "s")
            .with_renewal_margin(0.5)
            .with_drain_timeout(Some(Duration::from_secs(30)));
        let session = config.session_config();
        assert!((session.renewal_margin - 0.5).abs() < f64::EPSILON);
        assert_eq!(session.drain_timeout, Some(Duration::from_secs(30)));
    }
}
