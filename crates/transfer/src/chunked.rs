use std::io::Read;

use sha2::{Digest, Sha256};

use crate::{ChunkPlan, TransferError};

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// One chunk of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based chunk number.
    pub index: u64,
    /// Byte offset within the file.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// SHA-256 hex digest of `data` alone.
    pub checksum: String,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Reads a file chunk by chunk according to a [`ChunkPlan`].
pub struct ChunkReader<R = std::fs::File> {
    source: R,
    plan: ChunkPlan,
    next_index: u64,
}

impl<R: Read> ChunkReader<R> {
    /// Wraps an already-open source positioned at offset 0.
    pub fn new(source: R, plan: ChunkPlan) -> Self {
        Self {
            source,
            plan,
            next_index: 0,
        }
    }

    /// Reads the next chunk. Returns `None` after the last planned chunk.
    ///
    /// A source shorter than planned fails with `UnexpectedEof`.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let Some(range) = self.plan.range(self.next_index) else {
            return Ok(None);
        };

        let mut buf = vec![0u8; (range.end - range.start) as usize];
        self.source.read_exact(&mut buf)?;

        let chunk = Chunk {
            index: self.next_index,
            offset: range.start,
            checksum: checksum_bytes(&buf),
            data: buf,
        };
        self.next_index += 1;
        Ok(Some(chunk))
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Index of the chunk the next call will return.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = Result<Chunk, TransferError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}
