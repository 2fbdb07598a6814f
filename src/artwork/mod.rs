use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage, imageops::FilterType};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ArtworkError;
use crate::models::Song;

mod cache;
mod download;
#[cfg(test)]
pub mod fake;

pub use cache::DiskImageCache;
pub use download::HttpImageDownloader;

/// A decoded artwork image. Cloning shares the pixel buffer.
#[derive(Clone)]
pub struct Image {
    inner: Arc<DynamicImage>,
}

impl Image {
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self {
            inner: Arc::new(image),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ArtworkError> {
        Ok(Self::from_dynamic(image::load_from_memory(bytes)?))
    }

    /// Generated album-art stand-in: a dark square with a lighter inset.
    pub fn placeholder(width: u32) -> Self {
        let size = width.max(1);
        let inset_start = size / 3;
        let inset_end = size - size / 3;
        let pixels = RgbaImage::from_fn(size, size, |x, y| {
            let inside = (inset_start..inset_end).contains(&x) && (inset_start..inset_end).contains(&y);
            if inside {
                Rgba([0x8e, 0x8e, 0x93, 0xff])
            } else {
                Rgba([0x3a, 0x3a, 0x3c, 0xff])
            }
        });
        Self::from_dynamic(DynamicImage::ImageRgba8(pixels))
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    /// Shrinks the image to `width`, keeping its aspect ratio. Images that
    /// are already narrow enough are returned as-is.
    pub fn fit_width(&self, width: u32) -> Self {
        let width = width.max(1);
        if self.width() <= width {
            return self.clone();
        }
        let height = ((self.height() as u64 * width as u64) / self.width() as u64).max(1) as u32;
        Self::from_dynamic(self.inner.resize_exact(width, height, FilterType::Lanczos3))
    }

    pub fn to_png(&self) -> Result<Vec<u8>, ArtworkError> {
        let mut cursor = Cursor::new(Vec::new());
        self.inner.write_to(&mut cursor, image::ImageFormat::Png)?;
        Ok(cursor.into_inner())
    }

    pub fn ptr_eq(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Image({}x{})", self.width(), self.height())
    }
}

/// Size in points, as the OS media center asks for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn square(side: f64) -> Self {
        Self {
            width: side,
            height: side,
        }
    }

    pub fn pixel_width(&self) -> u32 {
        if self.width.is_finite() && self.width >= 1.0 {
            self.width.round().min(u32::MAX as f64) as u32
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPriority {
    High,
    Low,
}

#[async_trait]
pub trait LocalImageCache: Send + Sync {
    /// Artwork already on disk for `song`, scaled to `width`.
    async fn local_image(&self, song: &Song, width: u32) -> Result<Option<Image>, ArtworkError>;

    async fn store(&self, song: &Song, image: &Image) -> Result<(), ArtworkError>;
}

#[async_trait]
pub trait ArtworkResolver: Send + Sync {
    async fn artwork_url(&self, song: &Song) -> Result<Option<String>, ArtworkError>;
}

#[async_trait]
pub trait ImageDownloader: Send + Sync {
    async fn download(&self, url: &str, priority: DownloadPriority) -> Result<Image, ArtworkError>;
}

/// Finds the best artwork for a song: local cache, then the remote
/// artwork URL, then the caller's default.
pub struct ImageResolver {
    cache: Arc<dyn LocalImageCache>,
    resolver: Arc<dyn ArtworkResolver>,
    downloader: Arc<dyn ImageDownloader>,
}

impl ImageResolver {
    pub fn new(
        cache: Arc<dyn LocalImageCache>,
        resolver: Arc<dyn ArtworkResolver>,
        downloader: Arc<dyn ImageDownloader>,
    ) -> Self {
        Self {
            cache,
            resolver,
            downloader,
        }
    }

    /// Resolves artwork for `item` at `width`.
    ///
    /// A missing remote URL yields `default`; a failed download is an error.
    pub async fn get_image(
        &self,
        item: Option<&Song>,
        width: u32,
        default: Option<Image>,
    ) -> Result<Option<Image>, ArtworkError> {
        let Some(song) = item else {
            return Ok(Some(default.unwrap_or_else(|| Image::placeholder(width))));
        };

        if let Some(image) = self.cache.local_image(song, width).await? {
            return Ok(Some(image));
        }

        let Some(url) = self.artwork_url(song).await? else {
            debug!(song = %song.id, "no artwork url");
            return Ok(default);
        };

        let image = self.downloader.download(&url, DownloadPriority::High).await?;
        if let Err(e) = self.cache.store(song, &image).await {
            warn!(song = %song.id, error = %e, "failed to cache downloaded artwork");
        }
        Ok(Some(image))
    }

    /// Local artwork only; never touches the network.
    pub async fn local_image(&self, song: &Song, width: u32) -> Result<Option<Image>, ArtworkError> {
        self.cache.local_image(song, width).await
    }

    /// Remote artwork URL, with blank entries treated as missing.
    pub async fn artwork_url(&self, song: &Song) -> Result<Option<String>, ArtworkError> {
        let url = self.resolver.artwork_url(song).await?;
        Ok(url.filter(|u| !u.trim().is_empty()))
    }
}

/// Now-playing artwork that renders on demand.
///
/// Holds only the song and the resolver, so any number of size requests
/// may run at once.
#[derive(Clone)]
pub struct LazyArtwork {
    bounds: Size,
    song: Song,
    resolver: Arc<ImageResolver>,
}

impl LazyArtwork {
    pub fn new(bounds: Size, song: Song, resolver: Arc<ImageResolver>) -> Self {
        Self {
            bounds,
            song,
            resolver,
        }
    }

    pub fn bounds(&self) -> Size {
        self.bounds
    }

    pub fn song_id(&self) -> &str {
        &self.song.id
    }

    pub async fn image_for(&self, requested: Size) -> Result<Image, ArtworkError> {
        let width = requested.pixel_width();
        let image = self
            .resolver
            .get_image(Some(&self.song), width, None)
            .await?;
        Ok(image.unwrap_or_else(|| Image::placeholder(width)))
    }
}
