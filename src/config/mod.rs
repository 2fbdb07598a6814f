use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub now_playing: NowPlayingConfig,
    #[serde(default)]
    pub artwork: ArtworkConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: home.join(".npbridge"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Bundle identifier of the player whose focus decides whether
    /// notifications are shown.
    pub bundle_id: String,
    /// Reported OS version when the platform cannot be asked.
    #[serde(default)]
    pub os_version: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bundle_id: "com.npbridge.host".to_string(),
            os_version: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub action_button_title: String,
    pub image_width: u32,
    pub private_appearance: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            action_button_title: "Skip".to_string(),
            image_width: 50,
            private_appearance: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NowPlayingConfig {
    /// The now-playing center is used only on versions above this one.
    pub min_os_version: String,
    pub artwork_bounds: f64,
    pub max_screen_size: u32,
    pub discard_stale_artwork: bool,
}

impl Default for NowPlayingConfig {
    fn default() -> Self {
        Self {
            min_os_version: "10.12.1".to_string(),
            artwork_bounds: 9999.0,
            max_screen_size: 2560,
            discard_stale_artwork: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtworkConfig {
    pub download_timeout_secs: u64,
    pub background_downloads: usize,
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: 15,
            background_downloads: 2,
        }
    }
}

impl ArtworkConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsConfig {
    pub playback_is_video: bool,
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("npbridge")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| "Failed to parse config file")?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).with_context(|| "Failed to serialize config")
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.storage.path
    }

    pub fn artwork_dir(&self) -> PathBuf {
        self.storage.path.join("artwork")
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage.path.join("artwork.db")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.storage.path.join("npbridge.sock")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.storage.path.join("npbridge.pid")
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.data_dir()).with_context(|| {
            format!(
                "Failed to create data directory: {}",
                self.data_dir().display()
            )
        })?;
        fs::create_dir_all(self.artwork_dir()).with_context(|| {
            format!(
                "Failed to create artwork directory: {}",
                self.artwork_dir().display()
            )
        })?;
        Ok(())
    }
}
