//! Pure blob-to-chunk splitting: no I/O, no server round-trip.

use crate::blob::Blob;
use std::sync::Arc;

/// A single chunk's position in the blob, independent of any particular `Blob` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: u32,
    pub from: u64,
    pub to: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }
}

/// Split `blob` into `chunks` ranges of `chunk_size` bytes, the last absorbing the remainder.
pub fn slice(blob: &Arc<dyn Blob>, chunks: u32, chunk_size: u64) -> Vec<ChunkRange> {
    let size = blob.size();
    (0..chunks)
        .map(|index| {
            let from = index as u64 * chunk_size;
            let to = std::cmp::min(from + chunk_size, size);
            ChunkRange { index, from, to }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlob;

    #[test]
    fn splits_into_expected_ranges() {
        let blob: Arc<dyn Blob> = Arc::new(MemoryBlob::new(vec![0u8; 500]));
        let ranges = slice(&blob, 5, 100);
        assert_eq!(ranges.len(), 5);
        assert_eq!(ranges[0], ChunkRange { index: 0, from: 0, to: 100 });
        assert_eq!(ranges[4], ChunkRange { index: 4, from: 400, to: 500 });
    }

    #[test]
    fn last_chunk_absorbs_remainder() {
        let blob: Arc<dyn Blob> = Arc::new(MemoryBlob::new(vec![0u8; 450]));
        let ranges = slice(&blob, 5, 100);
        assert_eq!(ranges[4].len(), 50);
        for r in &ranges[..4] {
            assert_eq!(r.len(), 100);
        }
    }
}
