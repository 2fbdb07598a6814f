use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::artwork::{Image, LazyArtwork};

/// Playback state as reported by the host player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Buffering,
    Paused,
    #[default]
    Stopped,
    /// Any state a newer host reports that this bridge does not know about.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for PlaybackState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "playing" => Ok(PlaybackState::Playing),
            "buffering" => Ok(PlaybackState::Buffering),
            "paused" => Ok(PlaybackState::Paused),
            "stopped" => Ok(PlaybackState::Stopped),
            "unknown" => Ok(PlaybackState::Unknown),
            _ => Err(format!("Invalid playback state: {s}")),
        }
    }
}

/// Playback state understood by the OS now-playing center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NativePlaybackState {
    #[default]
    Unknown,
    Playing,
    Paused,
    Stopped,
}

impl std::fmt::Display for NativePlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativePlaybackState::Unknown => write!(f, "unknown"),
            NativePlaybackState::Playing => write!(f, "playing"),
            NativePlaybackState::Paused => write!(f, "paused"),
            NativePlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Audio,
    Video,
}

/// A track as the host describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub artist: String,
    /// Remote artwork location the host already knows about.
    #[serde(default)]
    pub artwork_url: Option<String>,
    /// Artwork file the host extracted locally (embedded tags, folder art).
    #[serde(default)]
    pub local_artwork: Option<PathBuf>,
}

impl Song {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        album: impl Into<String>,
        artist: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            album: album.into(),
            artist: artist.into(),
            artwork_url: None,
            local_artwork: None,
        }
    }

    pub fn with_artwork_url(mut self, url: impl Into<String>) -> Self {
        self.artwork_url = Some(url.into());
        self
    }
}

/// How the user interacted with a delivered notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationType {
    None,
    ContentsClicked,
    ActionButtonClicked,
    Replied,
    AdditionalActionClicked,
}

impl std::str::FromStr for ActivationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "none" => Ok(ActivationType::None),
            "contents" | "contents_clicked" => Ok(ActivationType::ContentsClicked),
            "action" | "action_button_clicked" => Ok(ActivationType::ActionButtonClicked),
            "replied" => Ok(ActivationType::Replied),
            "additional" | "additional_action_clicked" => {
                Ok(ActivationType::AdditionalActionClicked)
            }
            _ => Err(format!("Invalid activation type: {s}")),
        }
    }
}

/// A "now playing" banner, built per song change and handed to the OS.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub subtitle: String,
    pub informative_text: String,
    pub action_button_title: Option<String>,
    pub content_image: Option<Image>,
    /// Image shown in place of the app icon; only honoured through
    /// the private appearance keys.
    pub identity_image: Option<Image>,
    pub private_appearance: bool,
}

impl Notification {
    pub fn for_song(song: &Song, action_button_title: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: song.name.clone(),
            subtitle: song.album.clone(),
            informative_text: song.artist.clone(),
            action_button_title: Some(action_button_title.to_string()),
            content_image: None,
            identity_image: None,
            private_appearance: false,
        }
    }

    pub fn has_action_button(&self) -> bool {
        self.action_button_title.is_some()
    }
}

/// The record the OS shows on the lock screen and in media controls.
#[derive(Clone, Default)]
pub struct NowPlayingInfo {
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub media_type: MediaType,
    pub artwork: Option<LazyArtwork>,
    pub elapsed: Option<f64>,
    pub playback_state: NativePlaybackState,
}

impl std::fmt::Debug for NowPlayingInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NowPlayingInfo")
            .field("song_id", &self.song_id)
            .field("title", &self.title)
            .field("media_type", &self.media_type)
            .field("artwork", &self.artwork.as_ref().map(|a| a.song_id()))
            .field("elapsed", &self.elapsed)
            .field("playback_state", &self.playback_state)
            .finish()
    }
}

/// Serializable summary of [`NowPlayingInfo`] for status output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NowPlayingSummary {
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub media_type: MediaType,
    pub artwork_song_id: Option<String>,
    pub elapsed: Option<f64>,
    pub playback_state: NativePlaybackState,
}

impl From<&NowPlayingInfo> for NowPlayingSummary {
    fn from(info: &NowPlayingInfo) -> Self {
        Self {
            song_id: info.song_id.clone(),
            title: info.title.clone(),
            media_type: info.media_type,
            artwork_song_id: info.artwork.as_ref().map(|a| a.song_id().to_string()),
            elapsed: info.elapsed,
            playback_state: info.playback_state,
        }
    }
}

/// Events the host pushes into the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    PlaybackStateChanged { state: PlaybackState },
    TrackChanged { song: Song },
    PositionChanged { seconds: f64 },
    FocusChanged { frontmost: bool },
    VideoModeChanged { enabled: bool },
    NotificationActivated { activation: ActivationType },
}

/// Requests the bridge queues for the host to pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostCommand {
    NextTrack,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeStatus {
    pub state: PlaybackState,
    pub current_song: Option<Song>,
    pub generation: u64,
    pub now_playing: NowPlayingSummary,
    pub playback_is_video: bool,
    pub pending_commands: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecognized_state_deserializes_to_unknown() {
        let state: PlaybackState = serde_json::from_str("\"rewinding\"").unwrap();
        assert_eq!(state, PlaybackState::Unknown);

        let state: PlaybackState = serde_json::from_str("\"buffering\"").unwrap();
        assert_eq!(state, PlaybackState::Buffering);
    }

    #[test]
    fn test_host_event_wire_format() {
        let json = r#"{"type":"track_changed","song":{"id":"42","name":"A","album":"B","artist":"C"}}"#;
        let event: HostEvent = serde_json::from_str(json).unwrap();
        match event {
            HostEvent::TrackChanged { song } => {
                assert_eq!(song.name, "A");
                assert!(song.artwork_url.is_none());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_notification_for_song() {
        let song = Song::new("1", "A", "B", "C");
        let notification = Notification::for_song(&song, "Skip");
        assert_eq!(notification.title, "A");
        assert_eq!(notification.subtitle, "B");
        assert_eq!(notification.informative_text, "C");
        assert!(notification.has_action_button());
        assert_eq!(notification.action_button_title.as_deref(), Some("Skip"));
    }

    #[test]
    fn test_activation_type_parse() {
        assert_eq!(
            "action".parse::<ActivationType>().unwrap(),
            ActivationType::ActionButtonClicked
        );
        assert!("bogus".parse::<ActivationType>().is_err());
    }
}
