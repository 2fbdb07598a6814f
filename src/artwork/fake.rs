//! In-memory artwork backends for tests.

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use super::{ArtworkResolver, DownloadPriority, Image, ImageDownloader, LocalImageCache};
use crate::error::ArtworkError;
use crate::models::Song;

pub fn solid(width: u32, height: u32) -> Image {
    Image::from_dynamic(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba([0xff, 0x00, 0x00, 0xff]),
    )))
}

#[derive(Default)]
pub struct FakeImageCache {
    images: Mutex<HashMap<String, Image>>,
    lookups: Mutex<Vec<(String, u32)>>,
    stored: Mutex<Vec<String>>,
}

impl FakeImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, song_id: &str, image: Image) {
        self.images
            .lock()
            .unwrap()
            .insert(song_id.to_string(), image);
    }

    pub fn lookups(&self) -> Vec<(String, u32)> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalImageCache for FakeImageCache {
    async fn local_image(&self, song: &Song, width: u32) -> Result<Option<Image>, ArtworkError> {
        self.lookups.lock().unwrap().push((song.id.clone(), width));
        let image = self.images.lock().unwrap().get(&song.id).cloned();
        Ok(image.map(|image| image.fit_width(width)))
    }

    async fn store(&self, song: &Song, _image: &Image) -> Result<(), ArtworkError> {
        self.stored.lock().unwrap().push(song.id.clone());
        Ok(())
    }
}

/// URL lookup table, gated per song id.
#[derive(Default)]
pub struct FakeArtworkResolver {
    urls: Mutex<HashMap<String, String>>,
    lookups: Mutex<usize>,
    pub gates: Gates,
}

impl FakeArtworkResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, song_id: &str, url: &str) {
        self.urls
            .lock()
            .unwrap()
            .insert(song_id.to_string(), url.to_string());
    }

    pub fn lookup_count(&self) -> usize {
        *self.lookups.lock().unwrap()
    }
}

#[async_trait]
impl ArtworkResolver for FakeArtworkResolver {
    async fn artwork_url(&self, song: &Song) -> Result<Option<String>, ArtworkError> {
        *self.lookups.lock().unwrap() += 1;
        self.gates.pass(&song.id).await;
        Ok(self.urls.lock().unwrap().get(&song.id).cloned())
    }
}

/// A closed gate holds callers until the test opens it, which lets tests
/// pick the order concurrent lookups finish in.
#[derive(Default)]
pub struct Gates {
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Gates {
    fn gate(&self, key: &str) -> Arc<Semaphore> {
        self.gates
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(0)))
            .clone()
    }

    pub fn close(&self, key: &str) {
        self.gate(key);
    }

    pub fn open(&self, key: &str) {
        self.gate(key).add_permits(1024);
    }

    async fn pass(&self, key: &str) {
        let gate = self.gates.lock().unwrap().get(key).cloned();
        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }
    }
}

/// Downloader with scripted responses, gated per URL.
#[derive(Default)]
pub struct FakeDownloader {
    responses: Mutex<HashMap<String, Result<Image, String>>>,
    pub gates: Gates,
    calls: Mutex<Vec<(String, DownloadPriority)>>,
}

impl FakeDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: Result<Image, String>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn calls(&self) -> Vec<(String, DownloadPriority)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageDownloader for FakeDownloader {
    async fn download(&self, url: &str, priority: DownloadPriority) -> Result<Image, ArtworkError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), priority));

        self.gates.pass(url).await;

        let response = self.responses.lock().unwrap().get(url).cloned();
        match response {
            Some(Ok(image)) => Ok(image),
            Some(Err(message)) => Err(ArtworkError::Download {
                url: url.to_string(),
                message,
            }),
            None => Err(ArtworkError::Download {
                url: url.to_string(),
                message: "no scripted response".to_string(),
            }),
        }
    }
}
