use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

use super::{DownloadPriority, Image, ImageDownloader};
use crate::error::ArtworkError;

/// Fetches artwork over HTTP. High-priority requests start immediately;
/// low-priority ones share a small pool of slots.
pub struct HttpImageDownloader {
    client: reqwest::Client,
    background: Arc<Semaphore>,
}

impl HttpImageDownloader {
    pub fn new(timeout: Duration, background_downloads: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("npbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .with_context(|| "Failed to build HTTP client")?;

        Ok(Self {
            client,
            background: Arc::new(Semaphore::new(background_downloads.max(1))),
        })
    }
}

fn download_error(url: &str, e: impl std::fmt::Display) -> ArtworkError {
    ArtworkError::Download {
        url: url.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl ImageDownloader for HttpImageDownloader {
    async fn download(&self, url: &str, priority: DownloadPriority) -> Result<Image, ArtworkError> {
        let _permit = match priority {
            DownloadPriority::High => None,
            DownloadPriority::Low => Some(
                self.background
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| download_error(url, e))?,
            ),
        };

        debug!(%url, ?priority, "downloading artwork");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| download_error(url, e))?;
        let bytes = response.bytes().await.map_err(|e| download_error(url, e))?;

        tokio::task::spawn_blocking(move || Image::decode(&bytes))
            .await
            .map_err(|e| ArtworkError::Worker(e.to_string()))?
    }
}
