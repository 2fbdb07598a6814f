use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::{ActivationType, PlaybackState};

mod commands;
pub use commands::*;

#[derive(Parser)]
#[command(name = "npbridge")]
#[command(about = "Bridges a music player's playback to OS notifications and the now-playing center")]
#[command(version)]
pub struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, env = "NPBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Daemon management
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },

    /// Report a host playback event to the daemon
    Send {
        #[command(subcommand)]
        event: SendCommands,
    },

    /// Print and clear commands queued for the host (e.g. skip requests)
    #[command(name = "host-commands")]
    HostCommands,

    /// Show the bridge's current state
    Status,

    /// Show how a playback state maps onto the now-playing center
    #[command(name = "map-state")]
    MapState {
        /// playing, buffering, paused, or stopped
        state: PlaybackState,
    },

    /// Resolve artwork for a song and write it as PNG
    Artwork {
        /// Song identifier; omit for the placeholder image
        #[arg(long)]
        song_id: Option<String>,
        /// Remote artwork URL to use for the song
        #[arg(long)]
        url: Option<String>,
        /// Requested width in pixels
        #[arg(short, long, default_value_t = 600)]
        width: u32,
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Manage remembered artwork URLs
    #[command(name = "artwork-url")]
    ArtworkUrl {
        #[command(subcommand)]
        command: ArtworkUrlCommands,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
pub enum DaemonCommands {
    /// Start the daemon
    Start,
    /// Stop the daemon
    Stop,
    /// Show daemon status
    Status,
    /// Run daemon in foreground (internal use)
    Run,
}

#[derive(Subcommand)]
pub enum SendCommands {
    /// Playback state changed
    State {
        /// playing, buffering, paused, or stopped
        state: PlaybackState,
    },
    /// A new track started
    Track {
        /// Song identifier
        id: String,
        /// Track name
        name: String,
        /// Album name
        album: String,
        /// Artist name
        artist: String,
        /// Remote artwork URL
        #[arg(long)]
        artwork_url: Option<String>,
        /// Local artwork file
        #[arg(long)]
        local_artwork: Option<PathBuf>,
    },
    /// Playback position in seconds
    Position { seconds: f64 },
    /// Whether the host window is frontmost
    Focus {
        #[arg(action = clap::ArgAction::Set)]
        frontmost: bool,
    },
    /// Whether current playback is video
    Video {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// The user activated a delivered notification
    Activate {
        /// action, contents, additional, replied, or none
        activation: ActivationType,
    },
}

#[derive(Subcommand)]
pub enum ArtworkUrlCommands {
    /// Remember the artwork URL for a song
    Set {
        /// Song identifier
        song_id: String,
        /// Artwork URL
        url: String,
    },
    /// Show the remembered artwork URL for a song
    Show {
        /// Song identifier
        song_id: String,
    },
    /// Forget the artwork URL for a song
    Remove {
        /// Song identifier
        song_id: String,
    },
}
