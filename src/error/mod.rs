use std::path::PathBuf;
use thiserror::Error;

/// Failures while resolving artwork.
#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("failed to read cached artwork at {path}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode artwork: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to download artwork from {url}: {message}")]
    Download { url: String, message: String },

    #[error("artwork index error: {0}")]
    Index(String),

    #[error("artwork worker failed: {0}")]
    Worker(String),
}

/// Failures talking to the OS notification or now-playing services.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("private API {key} rejected: {message}")]
    PrivateApi { key: String, message: String },

    #[error("native call failed: {0}")]
    Native(String),
}

/// Anything that can go wrong while handling a host event.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Artwork(#[from] ArtworkError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("now-playing updater is no longer running")]
    UpdaterClosed,
}

impl BridgeError {
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Artwork(_) => "artwork",
            BridgeError::Platform(_) => "platform",
            BridgeError::UpdaterClosed => "updater",
        }
    }
}
