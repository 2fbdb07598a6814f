use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::artwork::{DiskImageCache, HttpImageDownloader, ImageResolver};
use crate::bridge::map_playback_state;
use crate::config::Config;
use crate::daemon::Daemon;
use crate::db::ArtworkIndex;
use crate::ipc::BridgeClient;
use crate::models::{BridgeStatus, HostCommand, HostEvent, PlaybackState, Song};

pub struct App {
    pub config: Config,
    pub index: Arc<ArtworkIndex>,
    config_path: Option<PathBuf>,
}

impl App {
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        config.ensure_dirs()?;

        let index =
            ArtworkIndex::open(&config.db_path()).with_context(|| "Failed to open database")?;

        Ok(Self {
            config,
            index: Arc::new(index),
            config_path: config_path.map(Path::to_path_buf),
        })
    }

    fn client(&self) -> BridgeClient {
        BridgeClient::new(self.config.socket_path())
    }

    fn running_client(&self) -> Result<BridgeClient> {
        let client = self.client();
        if !client.is_daemon_running() {
            bail!("Daemon is not running. Start it with: npbridge daemon start");
        }
        Ok(client)
    }

    pub fn send(&self, event: HostEvent) -> Result<()> {
        self.running_client()?.send_event(event)
    }

    pub fn host_commands(&self) -> Result<()> {
        let commands = self.running_client()?.take_host_commands()?;
        if commands.is_empty() {
            println!("No pending commands.");
        }
        for command in commands {
            match command {
                HostCommand::NextTrack => println!("next-track"),
            }
        }
        Ok(())
    }

    pub fn status(&self) -> Result<()> {
        let client = self.client();

        if !client.is_daemon_running() {
            println!("Daemon is not running.");
            return Ok(());
        }

        let status = client.get_status()?;
        print_status(&status);

        Ok(())
    }

    pub fn artwork(
        &self,
        song_id: Option<&str>,
        url: Option<&str>,
        width: u32,
        output: &Path,
    ) -> Result<()> {
        let song = song_id.map(|id| {
            let song = Song::new(id, "", "", "");
            match url {
                Some(url) => song.with_artwork_url(url),
                None => song,
            }
        });

        let runtime = tokio::runtime::Runtime::new()
            .with_context(|| "Failed to start async runtime")?;
        let image = runtime.block_on(async {
            let downloader = HttpImageDownloader::new(
                self.config.artwork.download_timeout(),
                self.config.artwork.background_downloads,
            )?;
            let resolver = ImageResolver::new(
                Arc::new(DiskImageCache::new(self.config.artwork_dir())),
                self.index.clone(),
                Arc::new(downloader),
            );
            resolver
                .get_image(song.as_ref(), width, None)
                .await
                .with_context(|| "Failed to resolve artwork")
        })?;

        let Some(image) = image else {
            bail!("No artwork found for this song");
        };

        let png = image.to_png()?;
        fs::write(output, png)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!(
            "Wrote {}x{} artwork to {}",
            image.width(),
            image.height(),
            output.display()
        );

        Ok(())
    }

    pub fn artwork_url_set(&self, song_id: &str, url: &str) -> Result<()> {
        self.index.set_url(song_id, url)?;
        println!("Artwork URL saved for {song_id}");
        Ok(())
    }

    pub fn artwork_url_show(&self, song_id: &str) -> Result<()> {
        match self.index.get(song_id)? {
            Some(entry) => {
                println!("{}", entry.url);
                println!("Updated: {}", entry.updated_at.format("%Y-%m-%d %H:%M:%S"));
            }
            None => println!("No artwork URL for {song_id}"),
        }
        Ok(())
    }

    pub fn artwork_url_remove(&self, song_id: &str) -> Result<()> {
        if self.index.remove(song_id)? {
            println!("Removed artwork URL for {song_id}");
        } else {
            println!("No artwork URL for {song_id}");
        }
        Ok(())
    }

    pub fn show_config(&self) -> Result<()> {
        print!("{}", self.config.to_toml()?);
        Ok(())
    }

    pub fn daemon_start(&self) -> Result<()> {
        if Daemon::is_running(&self.config) {
            println!("Daemon is already running.");
            return Ok(());
        }

        Daemon::start_detached(&self.config, self.config_path.as_deref())?;
        println!("Daemon started.");

        Ok(())
    }

    pub fn daemon_stop(&self) -> Result<()> {
        if !Daemon::is_running(&self.config) {
            println!("Daemon is not running.");
            return Ok(());
        }

        Daemon::stop(&self.config)?;
        println!("Daemon stopped.");

        Ok(())
    }

    pub fn daemon_status(&self) -> Result<()> {
        if Daemon::is_running(&self.config) {
            println!("Daemon is running.");
        } else {
            println!("Daemon is not running.");
        }

        Ok(())
    }

    pub fn daemon_run(&self) -> Result<()> {
        let daemon = Daemon::new(self.config.clone())?;
        daemon.run()
    }
}

pub fn map_state(state: PlaybackState) {
    println!("{}", map_playback_state(state));
}

pub fn track_event(
    id: String,
    name: String,
    album: String,
    artist: String,
    artwork_url: Option<String>,
    local_artwork: Option<PathBuf>,
) -> HostEvent {
    let mut song = Song::new(id, name, album, artist);
    song.artwork_url = artwork_url;
    song.local_artwork = local_artwork;
    HostEvent::TrackChanged { song }
}

fn print_status(status: &BridgeStatus) {
    match &status.current_song {
        Some(song) => println!("{}: {} - {}", status.state, song.name, song.artist),
        None => println!("{}: no track", status.state),
    }

    let now_playing = &status.now_playing;
    println!(
        "Now playing center: {} ({:?})",
        now_playing.playback_state, now_playing.media_type
    );
    if let Some(elapsed) = now_playing.elapsed {
        println!("Elapsed: {}", format_duration(elapsed));
    }
    match &now_playing.artwork_song_id {
        Some(id) => println!("Artwork: {id}"),
        None => println!("Artwork: none"),
    }
    println!("Track generation: {}", status.generation);
    if status.pending_commands > 0 {
        println!("Pending host commands: {}", status.pending_commands);
    }
}

fn format_duration(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let mins = seconds / 60;
    let secs = seconds % 60;
    format!("{mins}:{secs:02}")
}
