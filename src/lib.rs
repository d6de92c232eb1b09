//! Resumable chunked file-upload engine.
//!
//! Splits a [`blob::Blob`] into fixed-size chunks, uploads them to a server-managed
//! session with bounded parallelism, and exposes an ordered [`events::UploadEvent`]
//! stream plus a small pause/resume/retry/abort control surface.
//!
//! ```no_run
//! # use resumable_upload_engine::*;
//! # use std::sync::Arc;
//! # async fn demo() {
//! let config = Arc::new(config::StaticUploadConfig::new(
//!     "https://example.com/upload/start",
//!     "https://example.com/upload/chunk/{index}",
//!     "https://example.com/upload/finish",
//! ));
//! let transport = Arc::new(transport_reqwest::ReqwestTransport::default());
//! let blob: Arc<dyn blob::Blob> = Arc::new(blob::MemoryBlob::new(vec![0u8; 1024]));
//!
//! let engine = engine::UploadEngine::<serde_json::Value>::spawn(
//!     transport, config, blob, "demo.bin".to_string(), None,
//! );
//! let mut events = Box::pin(engine.subscribe());
//! # }
//! ```

pub mod blob;
pub mod config;
pub mod control;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod finisher;
pub mod logging;
pub mod meta;
pub mod opener;
pub mod slicer;
pub mod transport;
pub mod transport_reqwest;

pub use blob::{Blob, FileBlob, MemoryBlob};
pub use config::{StaticUploadConfig, UploadChunksConfig};
pub use engine::UploadEngine;
pub use error::{TransportError, UploadError, UploadResult};
pub use events::UploadEvent;
pub use meta::FileMeta;
pub use transport::Transport;
pub use transport_reqwest::ReqwestTransport;
