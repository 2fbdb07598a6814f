use async_trait::async_trait;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

use super::{Image, LocalImageCache};
use crate::error::ArtworkError;
use crate::models::Song;

/// PNG files on disk, one per song id.
pub struct DiskImageCache {
    dir: PathBuf,
}

impl DiskImageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File for `song_id`. Lowercase ASCII letters, digits and `-` are kept;
    /// every other byte becomes `_xx`, so distinct ids never share a file,
    /// even on a case-insensitive filesystem.
    pub fn path_for(&self, song_id: &str) -> PathBuf {
        let mut name = String::with_capacity(song_id.len() + 4);
        for byte in song_id.bytes() {
            if byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-' {
                name.push(byte as char);
            } else {
                let _ = write!(name, "_{byte:02x}");
            }
        }
        name.push_str(".png");
        self.dir.join(name)
    }
}

fn read_scaled(path: &Path, width: u32) -> Result<Option<Image>, ArtworkError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ArtworkError::Cache {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    Ok(Some(Image::decode(&bytes)?.fit_width(width)))
}

/// Reads a file this cache wrote. An undecodable file is a miss and is
/// removed so the next download can replace it.
fn read_cached(path: &Path, width: u32) -> Result<Option<Image>, ArtworkError> {
    match read_scaled(path, width) {
        Err(ArtworkError::Decode(e)) => {
            warn!(path = %path.display(), error = %e, "discarding unreadable cached artwork");
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove cached artwork");
            }
            Ok(None)
        }
        other => other,
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ArtworkError> {
    let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
    let result = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, path));
    if let Err(source) = result {
        let _ = fs::remove_file(&tmp);
        return Err(ArtworkError::Cache {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

#[async_trait]
impl LocalImageCache for DiskImageCache {
    async fn local_image(&self, song: &Song, width: u32) -> Result<Option<Image>, ArtworkError> {
        let own = song.local_artwork.clone();
        let cached = self.path_for(&song.id);

        tokio::task::spawn_blocking(move || {
            if let Some(path) = own {
                match read_scaled(&path, width) {
                    Ok(Some(image)) => return Ok(Some(image)),
                    Ok(None) => {}
                    Err(ArtworkError::Decode(e)) => {
                        warn!(path = %path.display(), error = %e, "song artwork is not a readable image");
                    }
                    Err(e) => return Err(e),
                }
            }
            read_cached(&cached, width)
        })
        .await
        .map_err(|e| ArtworkError::Worker(e.to_string()))?
    }

    async fn store(&self, song: &Song, image: &Image) -> Result<(), ArtworkError> {
        let dir = self.dir.clone();
        let path = self.path_for(&song.id);
        let image = image.clone();

        tokio::task::spawn_blocking(move || {
            let png = image.to_png()?;
            fs::create_dir_all(&dir).map_err(|source| ArtworkError::Cache {
                path: dir.clone(),
                source,
            })?;
            write_atomic(&path, &png)
        })
        .await
        .map_err(|e| ArtworkError::Worker(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::fake::{FakeArtworkResolver, FakeDownloader, solid};
    use crate::artwork::ImageResolver;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_store_then_read_scaled() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskImageCache::new(dir.path().join("artwork"));
        let song = Song::new("album/42", "A", "B", "C");

        assert!(cache.local_image(&song, 50).await.unwrap().is_none());

        cache.store(&song, &solid(200, 100)).await.unwrap();
        assert!(cache.path_for(&song.id).ends_with("album_2f42.png"));

        let image = cache.local_image(&song, 50).await.unwrap().unwrap();
        assert_eq!((image.width(), image.height()), (50, 25));

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("artwork"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_similar_ids_do_not_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskImageCache::new(dir.path());
        let ids = ["album/42", "album_42", "album 42", "Album42", "album42"];

        let paths: std::collections::HashSet<_> = ids.iter().map(|id| cache.path_for(id)).collect();
        assert_eq!(paths.len(), ids.len());
        assert!(cache.path_for("42").ends_with("42.png"));

        cache
            .store(&Song::new("album/42", "A", "B", "C"), &solid(30, 30))
            .await
            .unwrap();
        let other = cache
            .local_image(&Song::new("album_42", "A", "B", "C"), 100)
            .await
            .unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_song_local_artwork_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskImageCache::new(dir.path());
        let mut song = Song::new("7", "A", "B", "C");

        cache.store(&song, &solid(30, 30)).await.unwrap();

        let folder_art = dir.path().join("folder.png");
        fs::write(&folder_art, solid(20, 10).to_png().unwrap()).unwrap();
        song.local_artwork = Some(folder_art);

        let image = cache.local_image(&song, 100).await.unwrap().unwrap();
        assert_eq!((image.width(), image.height()), (20, 10));
    }

    #[tokio::test]
    async fn test_corrupt_cache_file_is_a_miss_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskImageCache::new(dir.path());
        let song = Song::new("9", "A", "B", "C");
        let path = cache.path_for(&song.id);
        fs::write(&path, b"not a png").unwrap();

        assert!(cache.local_image(&song, 50).await.unwrap().is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unreadable_song_artwork_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskImageCache::new(dir.path());
        let mut song = Song::new("9", "A", "B", "C");
        cache.store(&song, &solid(30, 30)).await.unwrap();

        let folder_art = dir.path().join("folder.png");
        fs::write(&folder_art, b"truncated").unwrap();
        song.local_artwork = Some(folder_art.clone());

        let image = cache.local_image(&song, 100).await.unwrap().unwrap();
        assert_eq!(image.width(), 30);
        assert!(folder_art.exists());
    }

    #[tokio::test]
    async fn test_corrupt_cache_file_is_replaced_by_download() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(DiskImageCache::new(dir.path()));
        let urls = Arc::new(FakeArtworkResolver::new());
        let downloader = Arc::new(FakeDownloader::new());
        let song = Song::new("9", "A", "B", "C");
        fs::write(cache.path_for(&song.id), &b"\x89PNG\r\n\x1a\n"[..]).unwrap();
        urls.insert("9", "https://art.example/9.png");
        downloader.respond("https://art.example/9.png", Ok(solid(40, 20)));

        let resolver = ImageResolver::new(cache.clone(), urls, downloader.clone());
        let image = resolver
            .get_image(Some(&song), 100, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((image.width(), image.height()), (40, 20));
        assert_eq!(downloader.calls().len(), 1);

        let cached = cache.local_image(&song, 100).await.unwrap().unwrap();
        assert_eq!((cached.width(), cached.height()), (40, 20));
    }
}
