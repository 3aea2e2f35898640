//! Credential exchange against `/account/api/session`.

use std::fmt;
use std::time::Duration;

use blackfynn_protocol::Endpoint;
use blackfynn_protocol::SessionResponse;
use blackfynn_protocol::messages::SessionRequest;
use blackfynn_session::{AuthFuture, Authenticator, Credentials, SessionError};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::client::error_body;
use crate::error::{Error, Result};

/// Exchanges an API key/secret pair for a session token.
pub struct ApiAuthenticator {
    http: reqwest::Client,
    url: String,
    api_key: String,
    api_secret: String,
    timeout: Option<Duration>,
}

impl ApiAuthenticator {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str, api_secret: &str) -> Self {
        Self {
            http,
            url: format!("{}{}", base_url, Endpoint::Session.path()),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            timeout: None,
        }
    }

    /// Bounds each session request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn exchange(&self) -> Result<Credentials> {
        let body = SessionRequest {
            token_id: self.api_key.clone(),
            secret: self.api_secret.clone(),
        };
        let mut request = self.http.post(&self.url).json(&body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let resp = request.send().await?;
        let status = resp.status();

        if status != StatusCode::OK {
            let body = error_body(resp).await?;
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        let parsed: SessionResponse = serde_json::from_slice(&bytes)?;
        let (token, organization_id, expires_in) = parsed.into_parts()?;
        debug!(organization = %organization_id, expires_in, "session granted");

        Ok(Credentials {
            token,
            organization_id,
            expires_in: Duration::from_secs(expires_in),
        })
    }
}

impl Authenticator for ApiAuthenticator {
    fn authenticate(&self) -> AuthFuture<'_> {
        Box::pin(async move {
            self.exchange().await.map_err(|e| {
                warn!(error = %e, "authentication rejected");
                SessionError::Auth(e.to_string())
            })
        })
    }
}

impl fmt::Debug for ApiAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiAuthenticator")
            .field("url", &self.url)
            .field("api_key", &"***REDACTED***")
            .field("api_secret", &"***REDACTED***")
            .finish()
    }
}
