//! Byte-addressable source data for an upload.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

/// An immutable, byte-addressable handle to the data being uploaded. The dispatcher calls
/// `slice`/`read_range` once per chunk, so implementations should make repeated ranged reads
/// cheap (e.g. a lazily-seeking file handle, as in [`FileBlob`]).
#[async_trait]
pub trait Blob: Send + Sync {
    /// Total size of the blob in bytes.
    fn size(&self) -> u64;

    /// Read the byte range `[from, to)` into memory.
    async fn read_range(&self, from: u64, to: u64) -> io::Result<Bytes>;

    /// Return a view over `[from, to)`. The default implementation eagerly reads the range;
    /// override when a lazily-read view is cheaper (see [`FileBlob`]).
    async fn slice(&self, from: u64, to: u64) -> io::Result<Bytes> {
        self.read_range(from, to).await
    }
}

/// An in-memory blob, useful for tests and small payloads.
#[derive(Clone)]
pub struct MemoryBlob {
    data: Arc<Bytes>,
}

impl MemoryBlob {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Arc::new(data.into()),
        }
    }
}

#[async_trait]
impl Blob for MemoryBlob {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, from: u64, to: u64) -> io::Result<Bytes> {
        let (from, to) = (from as usize, to as usize);
        Ok(self.data.slice(from..to))
    }
}

/// A file-backed blob that seeks and reads ranges lazily.
#[derive(Clone)]
pub struct FileBlob {
    path: Arc<PathBuf>,
    size: u64,
}

impl FileBlob {
    pub async fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        Ok(Self {
            size: metadata.len(),
            path: Arc::new(path),
        })
    }
}

#[async_trait]
impl Blob for FileBlob {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, from: u64, to: u64) -> io::Result<Bytes> {
        let mut file = File::open(&*self.path).await?;
        file.seek(SeekFrom::Start(from)).await?;
        let mut buf = vec![0u8; (to - from) as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}
