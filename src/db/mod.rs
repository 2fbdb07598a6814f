use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

use crate::artwork::ArtworkResolver;
use crate::error::ArtworkError;
use crate::models::Song;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtworkEntry {
    pub song_id: String,
    pub url: String,
    pub updated_at: DateTime<Utc>,
}

/// Remembers where each song's remote artwork lives.
pub struct ArtworkIndex {
    conn: Mutex<Connection>,
}

impl ArtworkIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().with_context(|| "Failed to open in-memory database")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Artwork index lock poisoned"))
    }

    fn init(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS artwork_urls (
                song_id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
            )
            .with_context(|| "Failed to initialize database schema")?;

        Ok(())
    }

    pub fn set_url(&self, song_id: &str, url: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO artwork_urls (song_id, url, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(song_id) DO UPDATE SET url = excluded.url, updated_at = excluded.updated_at",
                params![song_id, url, Utc::now().to_rfc3339()],
            )
            .with_context(|| "Failed to record artwork url")?;
        Ok(())
    }

    /// Records `url` unless it is already the stored one. Returns whether
    /// anything was written.
    pub fn record_url(&self, song_id: &str, url: &str) -> Result<bool> {
        let conn = self.conn()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT url FROM artwork_urls WHERE song_id = ?1",
                [song_id],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| "Failed to query artwork url")?;
        if stored.as_deref() == Some(url) {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO artwork_urls (song_id, url, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(song_id) DO UPDATE SET url = excluded.url, updated_at = excluded.updated_at",
            params![song_id, url, Utc::now().to_rfc3339()],
        )
        .with_context(|| "Failed to record artwork url")?;
        Ok(true)
    }

    pub fn get(&self, song_id: &str) -> Result<Option<ArtworkEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                "SELECT song_id, url, updated_at FROM artwork_urls WHERE song_id = ?1",
                [song_id],
                |row| {
                    Ok(ArtworkEntry {
                        song_id: row.get(0)?,
                        url: row.get(1)?,
                        updated_at: row
                            .get::<_, String>(2)?
                            .parse::<DateTime<Utc>>()
                            .unwrap_or_default(),
                    })
                },
            )
            .optional()
            .with_context(|| "Failed to query artwork url")?;
        Ok(entry)
    }

    pub fn remove(&self, song_id: &str) -> Result<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM artwork_urls WHERE song_id = ?1", [song_id])
            .with_context(|| "Failed to remove artwork url")?;
        Ok(removed > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM artwork_urls", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl ArtworkResolver for ArtworkIndex {
    /// A URL the host sends along with the song wins and is remembered;
    /// otherwise the last recorded URL is used.
    async fn artwork_url(&self, song: &Song) -> Result<Option<String>, ArtworkError> {
        let index_error = |e: anyhow::Error| ArtworkError::Index(format!("{e:#}"));

        if let Some(url) = song.artwork_url.as_deref().filter(|u| !u.trim().is_empty()) {
            self.record_url(&song.id, url).map_err(index_error)?;
            return Ok(Some(url.to_string()));
        }

        Ok(self.get(&song.id).map_err(index_error)?.map(|e| e.url))
    }
}
