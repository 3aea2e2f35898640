use blackfynn_protocol::ProtocolError;
use blackfynn_session::SessionError;
use blackfynn_transfer::TransferError;

use crate::upload::UploadPhase;

/// Errors from the Blackfynn client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("upload failed while {phase}{}: {source}", import_suffix(.import_id))]
    Upload {
        phase: UploadPhase,
        import_id: Option<String>,
        source: Box<Error>,
    },
}

fn import_suffix(import_id: &Option<String>) -> String {
    import_id
        .as_deref()
        .map(|id| format!(" (import {id})"))
        .unwrap_or_default()
}

impl Error {
    /// HTTP status of a rejected request, looking through upload wrapping.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Upload { source, .. } => source.status(),
            _ => None,
        }
    }

    /// `true` if the failure came from authentication.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Session(SessionError::Auth(_)) => true,
            Self::Upload { source, .. } => source.is_auth(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_error_names_phase_and_import() {
        let err = Error::Upload {
            phase: UploadPhase::ChunkUploading(3),
            import_id: Some("imp-1".into()),
            source: Box::new(Error::HttpStatus {
                status: 500,
                body: "nope".into(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("chunk 3"), "{msg}");
        assert!(msg.contains("imp-1"), "{msg}");
        assert!(msg.contains("nope"), "{msg}");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn auth_detected_through_wrapping() {
        let err = Error::Upload {
            phase: UploadPhase::PreviewRequested,
            import_id: None,
            source: Box::new(Error::Session(SessionError::Auth("bad".into()))),
        };
        assert!(err.is_auth());
        assert!(!err.to_string().contains("import"));
    }
}
