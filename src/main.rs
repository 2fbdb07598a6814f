mod artwork;
mod bridge;
mod cli;
mod config;
mod daemon;
mod db;
mod error;
mod ipc;
mod models;
mod nowplaying;
mod platform;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{App, ArtworkUrlCommands, Cli, Commands, DaemonCommands, SendCommands};
use models::HostEvent;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Pure lookup; needs no config or storage
    if let Commands::MapState { state } = cli.command {
        cli::map_state(state);
        return Ok(());
    }

    let app = App::new(cli.config.as_deref())?;

    match cli.command {
        Commands::Daemon { command } => match command {
            DaemonCommands::Start => {
                app.daemon_start()?;
            }
            DaemonCommands::Stop => {
                app.daemon_stop()?;
            }
            DaemonCommands::Status => {
                app.daemon_status()?;
            }
            DaemonCommands::Run => {
                app.daemon_run()?;
            }
        },
        Commands::Send { event } => {
            let event = match event {
                SendCommands::State { state } => HostEvent::PlaybackStateChanged { state },
                SendCommands::Track {
                    id,
                    name,
                    album,
                    artist,
                    artwork_url,
                    local_artwork,
                } => cli::track_event(id, name, album, artist, artwork_url, local_artwork),
                SendCommands::Position { seconds } => HostEvent::PositionChanged { seconds },
                SendCommands::Focus { frontmost } => HostEvent::FocusChanged { frontmost },
                SendCommands::Video { enabled } => HostEvent::VideoModeChanged { enabled },
                SendCommands::Activate { activation } => {
                    HostEvent::NotificationActivated { activation }
                }
            };
            app.send(event)?;
        }
        Commands::HostCommands => {
            app.host_commands()?;
        }
        Commands::Status => {
            app.status()?;
        }
        Commands::MapState { .. } => {}
        Commands::Artwork {
            song_id,
            url,
            width,
            output,
        } => {
            app.artwork(song_id.as_deref(), url.as_deref(), width, &output)?;
        }
        Commands::ArtworkUrl { command } => match command {
            ArtworkUrlCommands::Set { song_id, url } => {
                app.artwork_url_set(&song_id, &url)?;
            }
            ArtworkUrlCommands::Show { song_id } => {
                app.artwork_url_show(&song_id)?;
            }
            ArtworkUrlCommands::Remove { song_id } => {
                app.artwork_url_remove(&song_id)?;
            }
        },
        Commands::Config => {
            app.show_config()?;
        }
    }

    Ok(())
}
