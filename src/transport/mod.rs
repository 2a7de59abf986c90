//! Blob transport: the only link to the external object repository.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

mod wordpress;

pub use wordpress::WordPressTransport;

pub type TransportResult<T = ()> = Result<T, TransportError>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download of {url} returned status {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("upload rejected with status {status}: {body}")]
    UploadRejected { status: u16, body: String },
}

#[async_trait]
pub trait BlobTransport: Send + Sync {
    /// Fetch `url` into `dest`, creating parent directories as needed.
    async fn download(&self, url: &str, dest: &Path) -> TransportResult;

    /// Push a local file to the repository; returns its public URL.
    async fn upload(&self, path: &Path) -> TransportResult<String>;
}
