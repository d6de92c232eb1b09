//! Caller-supplied configuration surface.

use crate::meta::FileMeta;
use std::collections::HashMap;

/// Describes the endpoints and headers an upload engine instance should use: a behavior trait
/// plus a concrete struct ([`StaticUploadConfig`]) for the common fixed-URL case.
pub trait UploadChunksConfig: Send + Sync {
    /// Headers attached to every request (auth, correlation ids, etc).
    fn headers(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Whether the engine should call `start()` automatically on construction.
    fn auto_start(&self) -> bool {
        true
    }

    fn chunk_start_url(&self) -> String;

    fn chunk_url(&self, file_meta: &FileMeta, index: u32) -> String;

    fn chunk_finish_url(&self, file_meta: &FileMeta) -> String;
}

/// A `Default`-friendly config built from fixed URL templates.
#[derive(Debug, Clone)]
pub struct StaticUploadConfig {
    pub start_url: String,
    /// `{index}` is replaced with the chunk index.
    pub chunk_url_template: String,
    pub finish_url: String,
    pub headers: HashMap<String, String>,
    pub auto_start: bool,
}

impl StaticUploadConfig {
    pub fn new(
        start_url: impl Into<String>,
        chunk_url_template: impl Into<String>,
        finish_url: impl Into<String>,
    ) -> Self {
        Self {
            start_url: start_url.into(),
            chunk_url_template: chunk_url_template.into(),
            finish_url: finish_url.into(),
            headers: HashMap::new(),
            auto_start: true,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }
}

impl UploadChunksConfig for StaticUploadConfig {
    fn headers(&self) -> HashMap<String, String> {
        self.headers.clone()
    }

    fn auto_start(&self) -> bool {
        self.auto_start
    }

    fn chunk_start_url(&self) -> String {
        self.start_url.clone()
    }

    fn chunk_url(&self, _file_meta: &FileMeta, index: u32) -> String {
        self.chunk_url_template.replace("{index}", &index.to_string())
    }

    fn chunk_finish_url(&self, _file_meta: &FileMeta) -> String {
        self.finish_url.clone()
    }
}
