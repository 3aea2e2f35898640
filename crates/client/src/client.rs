//! HTTP plumbing shared by every resource call.

use std::sync::Arc;

use blackfynn_protocol::constants::API_KEY_PARAM;
use blackfynn_protocol::{Endpoint, TokenPlacement};
use blackfynn_session::{OperationGuard, Session, SessionManager};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::auth::ApiAuthenticator;
use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Status a call must answer with to count as successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expect {
    Status(StatusCode),
    /// Any 2xx.
    Success,
}

impl Expect {
    fn accepts(self, status: StatusCode) -> bool {
        match self {
            Self::Status(expected) => status == expected,
            Self::Success => status.is_success(),
        }
    }
}

struct Inner {
    http: reqwest::Client,
    config: ClientConfig,
    session: SessionManager,
}

/// Blackfynn API client.
///
/// Cheap to clone; clones share one session and one connection pool.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Builds a client without contacting the server.
    ///
    /// The first call authenticates on demand. Use [`connect`](Self::connect)
    /// to authenticate eagerly and start background renewal.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        // Total limits are set per request; downloads get their own.
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        let authenticator = ApiAuthenticator::new(
            http.clone(),
            &config.base_url,
            &config.api_key,
            &config.api_secret,
        )
        .with_timeout(config.timeout);
        let session = SessionManager::new(Arc::new(authenticator), config.session_config());

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                config,
                session,
            }),
        })
    }

    /// Builds a client, authenticates, and starts the renewal task.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let client = Self::new(config)?;
        let session = client.authenticate().await?;
        client.inner.session.start();
        info!(
            base_url = %client.inner.config.base_url,
            organization = %session.organization_id,
            "connected"
        );
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    /// Forces a fresh session, waiting for in-flight calls first.
    pub async fn authenticate(&self) -> Result<Session> {
        Ok(self.inner.session.authenticate().await?)
    }

    /// Organization of the current session, if one is established.
    pub fn organization_id(&self) -> Option<String> {
        self.inner.session.current().map(|s| s.organization_id)
    }

    /// Stops background renewal. Later calls fail with `Shutdown`.
    pub fn shutdown(&self) {
        self.inner.session.shutdown();
    }

    /// Waits for a usable session and registers the call as in flight.
    pub(crate) async fn acquire(&self, label: &str) -> Result<(Session, OperationGuard)> {
        Ok(self.inner.session.acquire(label).await?)
    }

    pub(crate) fn url(&self, endpoint: &Endpoint<'_>) -> String {
        format!("{}{}", self.inner.config.base_url, endpoint.path())
    }

    /// Starts a request to `endpoint` with the token attached where the
    /// endpoint expects it.
    pub(crate) fn request(
        &self,
        method: Method,
        endpoint: &Endpoint<'_>,
        token: &str,
    ) -> RequestBuilder {
        let builder = self
            .inner
            .http
            .request(method, self.url(endpoint))
            .timeout(self.inner.config.timeout);
        match endpoint.token_placement() {
            TokenPlacement::Query => builder.query(&[(API_KEY_PARAM, token)]),
            TokenPlacement::Bearer => builder.bearer_auth(token),
        }
    }

    /// Plain GET without a session token, for pre-signed URLs.
    fn download_request(&self, url: &str) -> RequestBuilder {
        let builder = self.inner.http.get(url);
        match self.inner.config.download_timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    pub(crate) async fn get_url(&self, url: &str) -> Result<Response> {
        let resp = self.download_request(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = error_body(resp).await?;
            warn!(status = status.as_u16(), "download rejected");
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

/// Passes `resp` through if its status is the expected one, otherwise turns
/// it into [`Error::HttpStatus`] carrying the raw body.
pub(crate) async fn check(endpoint: &Endpoint<'_>, resp: Response, expect: Expect) -> Result<Response> {
    let status = resp.status();
    if expect.accepts(status) {
        debug!(endpoint = endpoint.name(), status = status.as_u16(), "request succeeded");
        return Ok(resp);
    }
    let body = error_body(resp).await?;
    warn!(
        endpoint = endpoint.name(),
        status = status.as_u16(),
        "request rejected"
    );
    Err(Error::HttpStatus {
        status: status.as_u16(),
        body,
    })
}

/// Reads a rejected response's body as text, replacing invalid UTF-8.
pub(crate) async fn error_body(resp: Response) -> Result<String> {
    let bytes = resp.bytes().await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reads the body and parses it as JSON.
pub(crate) async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let body = resp.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn expect_exact_status() {
        let created = Expect::Status(StatusCode::CREATED);
        assert!(created.accepts(StatusCode::CREATED));
        assert!(!created.accepts(StatusCode::OK));
    }

    #[test]
    fn expect_any_success() {
        assert!(Expect::Success.accepts(StatusCode::OK));
        assert!(Expect::Success.accepts(StatusCode::CREATED));
        assert!(!Expect::Success.accepts(StatusCode::NOT_FOUND));
    }

    #[test]
    fn new_rejects_invalid_config() {
        let err = Client::new(ClientConfig::new("", "s")).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn token_placement_follows_endpoint() {
        let client = Client::new(ClientConfig::new("k", "s").with_base_url("http://127.0.0.1:1"))
            .unwrap();

        let req = client
            .request(Method::GET, &Endpoint::Datasets, "tok")
            .build()
            .unwrap();
        assert_eq!(req.url().as_str(), "http://127.0.0.1:1/datasets/?api_key=tok");
        assert!(req.headers().get("authorization").is_none());

        let endpoint = Endpoint::UploadPreview {
            organization_id: "N:organization:1",
        };
        let req = client.request(Method::POST, &endpoint, "tok").build().unwrap();
        assert!(req.url().query().is_none());
        assert_eq!(req.headers()["authorization"], "Bearer tok");
    }

    #[test]
    fn downloads_are_not_bound_by_the_api_timeout() {
        let config = ClientConfig::new("k", "s")
            .with_base_url("http://127.0.0.1:1")
            .with_timeout(Duration::from_secs(5));
        let client = Client::new(config.clone()).unwrap();

        let api = client
            .request(Method::GET, &Endpoint::Datasets, "tok")
            .build()
            .unwrap();
        assert_eq!(api.timeout(), Some(&Duration::from_secs(5)));

        let download = client.download_request("http://s3.local/f").build().unwrap();
        assert_eq!(download.timeout(), None);

        let bounded = Client::new(config.with_download_timeout(Some(Duration::from_secs(600))))
            .unwrap()
            .download_request("http://s3.local/f")
            .build()
            .unwrap();
        assert_eq!(bounded.timeout(), Some(&Duration::from_secs(600)));
    }

    #[test]
    fn organization_unknown_before_authentication() {
        let client = Client::new(ClientConfig::new("k", "s")).unwrap();
        assert!(client.organization_id().is_none());
    }
}
