//! Async client for the Blackfynn REST API.
//!
//! [`Client`] wraps one authenticated session and exposes datasets,
//! packages, file downloads and the chunked upload protocol. Every call is
//! registered with the session's operation tracker, so token renewal never
//! rotates a token out from under a request in flight.

mod auth;
mod client;
mod config;
mod error;
mod resources;
mod upload;

pub use auth::ApiAuthenticator;
pub use client::Client;
pub use config::{ClientConfig, DEFAULT_TIMEOUT};
pub use error::{Error, Result};
pub use upload::{
    EndpointFuture, UploadEndpoints, UploadEvent, UploadPhase, UploadReport, UploadRequest,
    Uploader,
};

pub use blackfynn_protocol::{CompleteEntry, Dataset, FileDownload, Package};
pub use blackfynn_session::{Session, SessionError};
