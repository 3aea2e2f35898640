//! Chunked file reading for the Blackfynn upload protocol.
//!
//! Files are split into strictly sequential, non-overlapping chunks starting
//! at offset 0. Every chunk carries the SHA-256 hex digest of its own bytes.

mod chunked;
mod plan;
mod validation;

pub use chunked::{Chunk, ChunkReader, checksum_bytes};
pub use plan::ChunkPlan;
pub use validation::{remote_file_name, validate_remote_name};

/// Default chunk size in bytes.
///
/// The upload service negotiates the real size in its preview response;
/// this value is only used when reading without a negotiated plan.
pub const DEFAULT_CHUNK_SIZE: u64 = 5_000_000;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("chunk plan mismatch: {file_size} bytes in {chunk_size}-byte chunks is not {total_chunks} chunks")]
    PlanMismatch {
        file_size: u64,
        chunk_size: u64,
        total_chunks: u64,
    },

    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
}
