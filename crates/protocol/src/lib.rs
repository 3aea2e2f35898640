//! Wire protocol types for the Blackfynn REST API.
//!
//! Request/response bodies, the endpoint table, and the helpers that turn
//! loosely-shaped server responses into checked values.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{Endpoint, TokenPlacement};
pub use messages::{
    ChunkedUpload, CompleteEntry, PreviewFile, PreviewPackage, PreviewRequest, PreviewResponse,
    SessionResponse, UploadTransaction,
};
pub use types::{Dataset, DatasetContent, FileDownload, Package, PackageContent, UploadManifest};

/// A response body was well-formed JSON but lacked a field the protocol requires.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("missing field `{0}` in response")]
    MissingField(&'static str),

    #[error("unexpected response shape: {0}")]
    Shape(String),
}
