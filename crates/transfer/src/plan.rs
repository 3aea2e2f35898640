use std::ops::Range;

use crate::TransferError;

/// How a file of `file_size` bytes is cut into `total_chunks` chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: u64,
    total_chunks: u64,
}

impl ChunkPlan {
    /// Plans `ceil(file_size / chunk_size)` chunks.
    pub fn new(file_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::ZeroChunkSize);
        }
        Ok(Self {
            file_size,
            chunk_size,
            total_chunks: file_size.div_ceil(chunk_size),
        })
    }

    /// Accepts the chunk count announced by the server if it covers the file.
    ///
    /// An empty file may be announced as a single empty chunk.
    pub fn negotiated(
        file_size: u64,
        chunk_size: u64,
        total_chunks: u64,
    ) -> Result<Self, TransferError> {
        let mut plan = Self::new(file_size, chunk_size)?;
        if total_chunks == plan.total_chunks || (file_size == 0 && total_chunks == 1) {
            plan.total_chunks = total_chunks;
            Ok(plan)
        } else {
            Err(TransferError::PlanMismatch {
                file_size,
                chunk_size,
                total_chunks,
            })
        }
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    /// Byte range of chunk `index`, or `None` past the last chunk.
    ///
    /// Every chunk is `chunk_size` long except the last, which holds
    /// whatever remains of the file.
    pub fn range(&self, index: u64) -> Option<Range<u64>> {
        if index >= self.total_chunks {
            return None;
        }
        let start = (index * self.chunk_size).min(self.file_size);
        let end = (start + self.chunk_size).min(self.file_size);
        Some(start..end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_multiple() {
        let plan = ChunkPlan::new(10_000_000, 5_000_000).unwrap();
        assert_eq!(plan.total_chunks(), 2);
        assert_eq!(plan.range(0), Some(0..5_000_000));
        assert_eq!(plan.range(1), Some(5_000_000..10_000_000));
        assert_eq!(plan.range(2), None);
    }

    #[test]
    fn last_chunk_holds_remainder() {
        let plan = ChunkPlan::new(7_000_000, 5_000_000).unwrap();
        assert_eq!(plan.total_chunks(), 2);
        assert_eq!(plan.range(0), Some(0..5_000_000));
        assert_eq!(plan.range(1), Some(5_000_000..7_000_000));
    }

    #[test]
    fn ceil_division_over_many_sizes() {
        for size in [1u64, 2, 3, 99, 100, 101, 1000, 4097] {
            for chunk in [1u64, 7, 100, 4096] {
                let plan = ChunkPlan::new(size, chunk).unwrap();
                let n = plan.total_chunks();
                assert_eq!(n, size.div_ceil(chunk));
                let len = |i| plan.range(i).map(|r| r.end - r.start).unwrap();
                assert_eq!(len(n - 1), size - chunk * (n - 1));
                let total: u64 = (0..n).map(len).sum();
                assert_eq!(total, size, "size={size} chunk={chunk}");
            }
        }
    }

    #[test]
    fn zero_chunk_size_rejected() {
        assert!(matches!(
            ChunkPlan::new(10, 0),
            Err(TransferError::ZeroChunkSize)
        ));
    }

    #[test]
    fn empty_file_has_no_chunks() {
        let plan = ChunkPlan::new(0, 100).unwrap();
        assert_eq!(plan.total_chunks(), 0);
        assert_eq!(plan.range(0), None);
    }

    #[test]
    fn negotiated_accepts_matching_count() {
        let plan = ChunkPlan::negotiated(7_000_000, 5_000_000, 2).unwrap();
        assert_eq!(plan.total_chunks(), 2);
    }

    #[test]
    fn negotiated_rejects_wrong_count() {
        let err = ChunkPlan::negotiated(7_000_000, 5_000_000, 3).unwrap_err();
        assert!(matches!(
            err,
            TransferError::PlanMismatch {
                total_chunks: 3,
                ..
            }
        ));
    }

    #[test]
    fn negotiated_empty_file_single_chunk() {
        let plan = ChunkPlan::negotiated(0, 5_000_000, 1).unwrap();
        assert_eq!(plan.total_chunks(), 1);
        assert_eq!(plan.range(0), Some(0..0));
    }
}
