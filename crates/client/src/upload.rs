//! Three-phase chunked upload: preview, chunk transfer, completion.
//!
//! One file per upload. Chunks are sent strictly in order and the first
//! rejected chunk ends the transaction; nothing is retried and the partial
//! upload is left for the server to expire.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use blackfynn_protocol::{
    ChunkedUpload, CompleteEntry, Endpoint, PreviewRequest, PreviewResponse, UploadTransaction,
    messages::parse_complete,
};
use blackfynn_transfer::{Chunk, ChunkPlan, ChunkReader, remote_file_name};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::client::{Client, Expect, check, decode};
use crate::error::{Error, Result};

/// Where an upload is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Idle,
    PreviewRequested,
    PreviewAccepted,
    /// Sending chunk `k` (zero-based).
    ChunkUploading(u64),
    AllChunksSent,
    CompleteRequested,
    Done,
    Failed,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("preparing"),
            Self::PreviewRequested => f.write_str("requesting preview"),
            Self::PreviewAccepted => f.write_str("planning chunks"),
            Self::ChunkUploading(k) => write!(f, "sending chunk {k}"),
            Self::AllChunksSent => f.write_str("finishing transfer"),
            Self::CompleteRequested => f.write_str("completing"),
            Self::Done => f.write_str("done"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Progress reported while an upload runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Phase(UploadPhase),
    ChunkSent {
        index: u64,
        total_chunks: u64,
        bytes_sent: u64,
        total_bytes: u64,
    },
}

/// What to upload and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub dataset_id: String,
    /// Target collection; the dataset root when `None`.
    pub collection_id: Option<String>,
    /// Remote name; the local file name when `None`.
    pub file_name: Option<String>,
    /// Defaults to the session's organization.
    pub organization_id: Option<String>,
}

impl UploadRequest {
    pub fn new(path: impl Into<PathBuf>, dataset_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            dataset_id: dataset_id.into(),
            collection_id: None,
            file_name: None,
            organization_id: None,
        }
    }

    pub fn with_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = Some(collection_id.into());
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReport {
    pub import_id: String,
    pub file_name: String,
    pub chunks_sent: u64,
    pub bytes_sent: u64,
    pub entries: Vec<CompleteEntry>,
}

/// Future returned by [`UploadEndpoints`] methods.
pub type EndpointFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The three remote calls an upload makes.
///
/// [`Client`] implements this over HTTP for one session token; tests
/// substitute recording mocks.
pub trait UploadEndpoints: Send + Sync {
    fn preview<'a>(
        &'a self,
        organization_id: &'a str,
        dataset_id: &'a str,
        collection_id: Option<&'a str>,
        request: &'a PreviewRequest,
    ) -> EndpointFuture<'a, PreviewResponse>;

    fn upload_chunk<'a>(
        &'a self,
        organization_id: &'a str,
        transaction: &'a UploadTransaction,
        file_name: &'a str,
        chunk: Chunk,
    ) -> EndpointFuture<'a, ()>;

    fn complete<'a>(
        &'a self,
        organization_id: &'a str,
        transaction: &'a UploadTransaction,
    ) -> EndpointFuture<'a, Vec<CompleteEntry>>;
}

/// Drives one upload through its phases.
pub struct Uploader<'a> {
    endpoints: &'a dyn UploadEndpoints,
    default_chunk_size: u64,
    events: Option<mpsc::Sender<UploadEvent>>,
    phase: UploadPhase,
}

impl<'a> Uploader<'a> {
    /// `default_chunk_size` is used only if the preview response carries no
    /// chunking parameters.
    pub fn new(endpoints: &'a dyn UploadEndpoints, default_chunk_size: u64) -> Self {
        Self {
            endpoints,
            default_chunk_size,
            events: None,
            phase: UploadPhase::Idle,
        }
    }

    pub fn with_events(mut self, events: mpsc::Sender<UploadEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    /// Runs the upload to completion or to the first failure.
    ///
    /// Failures are wrapped in [`Error::Upload`] naming the phase they
    /// happened in and, once known, the import id.
    pub async fn run(&mut self, organization_id: &str, request: &UploadRequest) -> Result<UploadReport> {
        let mut import_id = None;
        match self.drive(organization_id, request, &mut import_id).await {
            Ok(report) => Ok(report),
            Err(source) => {
                let phase = self.phase;
                error!(
                    phase = %phase,
                    import = import_id.as_deref().unwrap_or("-"),
                    path = %request.path.display(),
                    error = %source,
                    "upload failed"
                );
                self.enter(UploadPhase::Failed).await;
                Err(Error::Upload {
                    phase,
                    import_id,
                    source: Box::new(source),
                })
            }
        }
    }

    async fn drive(
        &mut self,
        organization_id: &str,
        request: &UploadRequest,
        import_id: &mut Option<String>,
    ) -> Result<UploadReport> {
        let endpoints = self.endpoints;
        let file_name = remote_file_name(&request.path, request.file_name.as_deref())?;
        let path = request.path.clone();
        let (file, size) = tokio::task::spawn_blocking(move || -> std::io::Result<_> {
            let file = std::fs::File::open(&path)?;
            let size = file.metadata()?.len();
            Ok((file, size))
        })
        .await
        .map_err(std::io::Error::other)??;
        let collection_id = request.collection_id.as_deref();

        self.enter(UploadPhase::PreviewRequested).await;
        let preview = PreviewRequest::single(&file_name, size);
        let response = endpoints
            .preview(organization_id, &request.dataset_id, collection_id, &preview)
            .await?;

        let fallback = ChunkPlan::new(size, self.default_chunk_size)?;
        let transaction = response.into_transaction(
            &request.dataset_id,
            collection_id,
            Some(ChunkedUpload {
                chunk_size: fallback.chunk_size(),
                total_chunks: fallback.total_chunks(),
            }),
        )?;
        *import_id = Some(transaction.import_id.clone());

        let plan = ChunkPlan::negotiated(size, transaction.chunk_size, transaction.total_chunks)?;
        self.enter(UploadPhase::PreviewAccepted).await;
        info!(
            file = %file_name,
            size,
            chunk_size = plan.chunk_size(),
            total_chunks = plan.total_chunks(),
            import = %transaction.import_id,
            "upload preview accepted"
        );

        let total_chunks = plan.total_chunks();
        let mut reader = ChunkReader::new(file, plan);
        let mut bytes_sent = 0u64;
        while reader.next_index() < total_chunks {
            let index = reader.next_index();
            self.enter(UploadPhase::ChunkUploading(index)).await;
            let (returned, next) = tokio::task::spawn_blocking(move || {
                let mut reader = reader;
                let next = reader.next_chunk();
                (reader, next)
            })
            .await
            .map_err(std::io::Error::other)?;
            reader = returned;
            let Some(chunk) = next? else {
                break;
            };
            let len = chunk.len() as u64;
            endpoints
                .upload_chunk(organization_id, &transaction, &file_name, chunk)
                .await?;
            bytes_sent += len;
            debug!(chunk = index, total_chunks, bytes_sent, "chunk sent");
            self.emit(UploadEvent::ChunkSent {
                index,
                total_chunks,
                bytes_sent,
                total_bytes: size,
            })
            .await;
        }
        self.enter(UploadPhase::AllChunksSent).await;

        self.enter(UploadPhase::CompleteRequested).await;
        let entries = endpoints.complete(organization_id, &transaction).await?;
        self.enter(UploadPhase::Done).await;
        info!(
            file = %file_name,
            import = %transaction.import_id,
            packages = entries.len(),
            "upload complete"
        );

        Ok(UploadReport {
            import_id: transaction.import_id,
            file_name,
            chunks_sent: total_chunks,
            bytes_sent,
            entries,
        })
    }

    async fn enter(&mut self, phase: UploadPhase) {
        self.phase = phase;
        self.emit(UploadEvent::Phase(phase)).await;
    }

    async fn emit(&self, event: UploadEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

/// [`UploadEndpoints`] over HTTP, bound to one session token.
struct SessionEndpoints<'a> {
    client: &'a Client,
    token: &'a str,
}

impl UploadEndpoints for SessionEndpoints<'_> {
    fn preview<'a>(
        &'a self,
        organization_id: &'a str,
        dataset_id: &'a str,
        collection_id: Option<&'a str>,
        request: &'a PreviewRequest,
    ) -> EndpointFuture<'a, PreviewResponse> {
        Box::pin(async move {
            let endpoint = Endpoint::UploadPreview { organization_id };
            let mut query = vec![("append", "false"), ("dataset_id", dataset_id)];
            if let Some(destination) = collection_id {
                query.push(("destinationId", destination));
            }
            let resp = self
                .client
                .request(Method::POST, &endpoint, self.token)
                .query(&query)
                .json(request)
                .send()
                .await?;
            decode(check(&endpoint, resp, Expect::Status(StatusCode::CREATED)).await?).await
        })
    }

    fn upload_chunk<'a>(
        &'a self,
        organization_id: &'a str,
        transaction: &'a UploadTransaction,
        file_name: &'a str,
        chunk: Chunk,
    ) -> EndpointFuture<'a, ()> {
        Box::pin(async move {
            let endpoint = Endpoint::UploadChunk {
                organization_id,
                import_id: &transaction.import_id,
            };
            let query = [
                ("filename", file_name.to_string()),
                ("multipartId", transaction.multipart_id.clone()),
                ("chunkNumber", chunk.index.to_string()),
                ("chunkSize", chunk.len().to_string()),
                ("chunkChecksum", chunk.checksum.clone()),
            ];
            let resp = self
                .client
                .request(Method::POST, &endpoint, self.token)
                .query(&query)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(chunk.data)
                .send()
                .await?;
            check(&endpoint, resp, Expect::Status(StatusCode::CREATED)).await?;
            Ok(())
        })
    }

    fn complete<'a>(
        &'a self,
        organization_id: &'a str,
        transaction: &'a UploadTransaction,
    ) -> EndpointFuture<'a, Vec<CompleteEntry>> {
        Box::pin(async move {
            let endpoint = Endpoint::UploadComplete {
                organization_id,
                import_id: &transaction.import_id,
            };
            let mut query = vec![("datasetId", transaction.dataset_id.as_str())];
            if let Some(destination) = transaction.collection_id.as_deref() {
                query.push(("destinationId", destination));
            }
            let resp = self
                .client
                .request(Method::POST, &endpoint, self.token)
                .query(&query)
                .send()
                .await?;
            let resp = check(&endpoint, resp, Expect::Status(StatusCode::OK)).await?;
            let body = resp.bytes().await?;
            Ok(parse_complete(&body)?)
        })
    }
}

impl Client {
    /// Uploads one file.
    ///
    /// The whole upload counts as a single in-flight operation, so a session
    /// renewal waits for it rather than rotating the token mid-transfer.
    pub async fn upload(
        &self,
        request: &UploadRequest,
        events: Option<mpsc::Sender<UploadEvent>>,
    ) -> Result<UploadReport> {
        let (session, _op) = self.acquire("upload").await?;
        let organization_id = request
            .organization_id
            .clone()
            .unwrap_or_else(|| session.organization_id.clone());
        let endpoints = SessionEndpoints {
            client: self,
            token: &session.token,
        };

        let mut uploader = Uploader::new(&endpoints, self.config().chunk_size);
        if let Some(tx) = events {
            uploader = uploader.with_events(tx);
        }
        uploader.run(&organization_id, request).await
    }

    /// Raw status document of an import, for checking on an upload that
    /// failed part-way.
    pub async fn upload_status(
        &self,
        import_id: &str,
        organization_id: Option<&str>,
    ) -> Result<serde_json::Value> {
        let (session, _op) = self.acquire("upload_status").await?;
        let organization_id = organization_id.unwrap_or(&session.organization_id);
        let endpoint = Endpoint::UploadStatus {
            organization_id,
            import_id,
        };
        let resp = self
            .request(Method::GET, &endpoint, &session.token)
            .send()
            .await?;
        decode(check(&endpoint, resp, Expect::Status(StatusCode::OK)).await?).await
    }
}
