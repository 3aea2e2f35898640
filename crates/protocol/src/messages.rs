use serde::{Deserialize, Deserializer, Serialize};

use crate::ProtocolError;
use crate::types::{Package, UploadManifest};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Exchanges an API key/secret pair for a session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub token_id: String,
    pub secret: String,
}

/// Creates a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDatasetRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Dataset description body, used for both GET and PUT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Readme {
    #[serde(default)]
    pub readme: String,
}

/// Creates a package; only collections are created by this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePackageRequest {
    pub name: String,
    pub dataset: String,
    pub package_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Registers a file with the upload service before any bytes are sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub files: Vec<PreviewFile>,
}

/// One file entry in a preview request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewFile {
    pub upload_id: u32,
    pub file_name: String,
    pub size: u64,
    pub processing: bool,
}

impl PreviewRequest {
    /// Preview for a single file.
    pub fn single(file_name: &str, size: u64) -> Self {
        Self {
            files: vec![PreviewFile {
                upload_id: 1,
                file_name: file_name.to_string(),
                size,
                processing: false,
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Body of a successful `/account/api/session` call.
///
/// Fields are optional on the wire so that a malformed body surfaces as a
/// [`ProtocolError`] rather than an opaque JSON error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionResponse {
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl SessionResponse {
    /// Returns `(token, organization, expires_in_secs)`.
    ///
    /// A missing organization is reported as an empty string; token and
    /// expiry are mandatory.
    pub fn into_parts(self) -> Result<(String, String, u64), ProtocolError> {
        let token = self
            .session_token
            .filter(|t| !t.is_empty())
            .ok_or(ProtocolError::MissingField("session_token"))?;
        let expires_in = self
            .expires_in
            .ok_or(ProtocolError::MissingField("expires_in"))?;
        if expires_in == 0 {
            return Err(ProtocolError::Shape("session expires_in must be positive".into()));
        }
        Ok((token, self.organization.unwrap_or_default(), expires_in))
    }
}

/// One page of `/datasets/{id}/packages`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackagesPage {
    #[serde(default)]
    pub packages: Option<Vec<Package>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Chunking parameters negotiated by the preview call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkedUpload {
    pub chunk_size: u64,
    pub total_chunks: u64,
}

/// A file as echoed back by the preview call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewedFile {
    #[serde(default)]
    pub upload_id: Option<u32>,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub multipart_upload_id: Option<String>,
    #[serde(default)]
    pub chunked_upload: Option<ChunkedUpload>,
}

/// A package the service will create once the upload completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPackage {
    #[serde(default)]
    pub files: Vec<PreviewedFile>,
    #[serde(default)]
    pub import_id: Option<String>,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub package_type: Option<String>,
    #[serde(default)]
    pub warnings: Vec<serde_json::Value>,
}

/// Body of a successful preview call.
///
/// `packages` is documented as a list but some deployments return a single
/// object; both are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewResponse {
    #[serde(default, deserialize_with = "one_or_many")]
    pub packages: Vec<PreviewPackage>,
}

/// State carried from the preview phase through chunk transfer and completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTransaction {
    pub import_id: String,
    pub multipart_id: String,
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub dataset_id: String,
    pub collection_id: Option<String>,
}

impl PreviewResponse {
    /// Extracts the transaction for the first previewed file.
    ///
    /// `fallback` supplies the chunk layout when the server omits
    /// `chunkedUpload`.
    pub fn into_transaction(
        self,
        dataset_id: &str,
        collection_id: Option<&str>,
        fallback: Option<ChunkedUpload>,
    ) -> Result<UploadTransaction, ProtocolError> {
        let package = self
            .packages
            .into_iter()
            .next()
            .ok_or(ProtocolError::MissingField("packages"))?;
        let import_id = package
            .import_id
            .ok_or(ProtocolError::MissingField("importId"))?;
        let file = package
            .files
            .into_iter()
            .next()
            .ok_or(ProtocolError::MissingField("files"))?;
        let multipart_id = file
            .multipart_upload_id
            .ok_or(ProtocolError::MissingField("multipartUploadId"))?;
        let chunked = file
            .chunked_upload
            .or(fallback)
            .ok_or(ProtocolError::MissingField("chunkedUpload"))?;
        if chunked.chunk_size == 0 {
            return Err(ProtocolError::Shape("chunkSize is zero".into()));
        }

        Ok(UploadTransaction {
            import_id,
            multipart_id,
            chunk_size: chunked.chunk_size,
            total_chunks: chunked.total_chunks,
            dataset_id: dataset_id.to_string(),
            collection_id: collection_id.map(str::to_string),
        })
    }
}

/// One element of the completion response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteEntry {
    #[serde(default)]
    pub manifest: Option<UploadManifest>,
    #[serde(default)]
    pub package: Option<Package>,
}

/// Parses a completion body, accepting either a list or a single entry.
pub fn parse_complete(body: &[u8]) -> Result<Vec<CompleteEntry>, serde_json::Error> {
    let parsed: OneOrMany<CompleteEntry> = serde_json::from_slice(body)?;
    Ok(parsed.into_vec())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(v) => v,
            Self::One(t) => vec![t],
        }
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    OneOrMany::deserialize(deserializer).map(OneOrMany::into_vec)
}
