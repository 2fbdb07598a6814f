use anyhow::{Context, Result};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::artwork::{DiskImageCache, HttpImageDownloader, ImageResolver};
use crate::bridge::{BridgeOptions, TrackBridge};
use crate::config::Config;
use crate::db::ArtworkIndex;
use crate::ipc::{BridgeClient, BridgeCommand, BridgeResponse};
use crate::models::HostEvent;
use crate::platform::Platform;

const EVENT_QUEUE: usize = 256;

pub struct Daemon {
    config: Config,
}

/// Wires the bridge to its production backends. Must run inside the
/// runtime the bridge will live on.
fn build_bridge(config: &Config) -> Result<Arc<TrackBridge>> {
    config.ensure_dirs()?;
    let index = Arc::new(ArtworkIndex::open(&config.db_path())?);
    info!(urls = index.count()?, "Artwork index opened");
    let cache = Arc::new(DiskImageCache::new(config.artwork_dir()));
    let downloader = Arc::new(HttpImageDownloader::new(
        config.artwork.download_timeout(),
        config.artwork.background_downloads,
    )?);
    let resolver = Arc::new(ImageResolver::new(cache, index, downloader));
    let options = BridgeOptions::from_config(config)?;

    Ok(TrackBridge::new(
        Platform::native(config),
        resolver,
        options,
        config.settings.playback_is_video,
    ))
}

impl Daemon {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn run(&self) -> Result<()> {
        use interprocess::local_socket::prelude::*;
        use interprocess::local_socket::{GenericFilePath, ListenerOptions};

        self.config.ensure_dirs()?;
        let socket_path = self.config.socket_path();

        // Remove stale socket
        if socket_path.exists() {
            fs::remove_file(&socket_path)?;
        }

        let runtime = Runtime::new().with_context(|| "Failed to start async runtime")?;
        let bridge = {
            let _guard = runtime.enter();
            build_bridge(&self.config)?
        };
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let event_loop = runtime.spawn(Arc::clone(&bridge).run(events_rx));

        let pid_path = self.config.pid_path();
        fs::write(&pid_path, std::process::id().to_string())?;

        let name = socket_path.as_os_str().to_fs_name::<GenericFilePath>()?;
        let listener = ListenerOptions::new()
            .name(name)
            .create_sync()
            .with_context(|| "Failed to create socket listener")?;

        info!("Daemon started, listening on {}", socket_path.display());

        let running = AtomicBool::new(true);
        let server = Server {
            runtime: &runtime,
            bridge: &bridge,
            events: &events_tx,
            running: &running,
        };

        // Accept connections on main thread
        while running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok(conn) => {
                    if let Err(e) = server.handle_connection(conn) {
                        error!("Connection error: {e}");
                    }
                }
                Err(e) => {
                    if running.load(Ordering::SeqCst) {
                        error!("Accept error: {e}");
                    }
                }
            }
        }

        // Let queued events and detached work finish before tearing down
        drop(events_tx);
        if let Err(e) = runtime.block_on(event_loop) {
            warn!("Event loop ended abnormally: {e}");
        }

        let _ = fs::remove_file(&socket_path);
        let _ = fs::remove_file(&pid_path);

        info!("Daemon stopped");
        Ok(())
    }

    pub fn start_detached(config: &Config, config_path: Option<&Path>) -> Result<()> {
        use std::process::Command;

        let socket_path = config.socket_path();
        if socket_path.exists() {
            let client = BridgeClient::new(&socket_path);
            if client.is_daemon_running() {
                anyhow::bail!("Daemon is already running");
            }
            fs::remove_file(&socket_path)?;
        }

        let exe = std::env::current_exe()?;

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;

            let mut command = Command::new(&exe);
            if let Some(path) = config_path {
                command.arg("--config").arg(path);
            }
            command
                .arg("daemon")
                .arg("run")
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .process_group(0)
                .spawn()
                .with_context(|| "Failed to start daemon")?;
        }

        for _ in 0..50 {
            if socket_path.exists() {
                return Ok(());
            }
            thread::sleep(std::time::Duration::from_millis(100));
        }

        anyhow::bail!("Daemon failed to start")
    }

    pub fn stop(config: &Config) -> Result<()> {
        let client = BridgeClient::new(config.socket_path());
        if client.is_daemon_running() {
            client.shutdown()?;
            for _ in 0..50 {
                if !config.socket_path().exists() {
                    return Ok(());
                }
                thread::sleep(std::time::Duration::from_millis(100));
            }
        }
        Ok(())
    }

    pub fn is_running(config: &Config) -> bool {
        let client = BridgeClient::new(config.socket_path());
        client.is_daemon_running()
    }
}

struct Server<'a> {
    runtime: &'a Runtime,
    bridge: &'a Arc<TrackBridge>,
    events: &'a mpsc::Sender<HostEvent>,
    running: &'a AtomicBool,
}

impl Server<'_> {
    fn handle_connection(&self, conn: interprocess::local_socket::Stream) -> Result<()> {
        let mut reader = BufReader::new(&conn);
        let mut writer = &conn;

        let mut line = String::new();
        reader.read_line(&mut line)?;

        let response = match serde_json::from_str::<BridgeCommand>(&line) {
            Ok(command) => self.handle_command(command),
            Err(e) => BridgeResponse::Error(format!("Invalid command: {e}")),
        };

        let response_json = serde_json::to_string(&response)?;
        writeln!(writer, "{response_json}")?;
        writer.flush()?;

        Ok(())
    }

    fn handle_command(&self, command: BridgeCommand) -> BridgeResponse {
        match command {
            // Queued; the reply does not wait for the bridge to handle it
            BridgeCommand::Event(event) => match self.events.try_send(event) {
                Ok(()) => BridgeResponse::Ok,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    BridgeResponse::Error("Event queue is full".to_string())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    BridgeResponse::Error("Bridge is not running".to_string())
                }
            },
            BridgeCommand::GetStatus => match self.runtime.block_on(self.bridge.status()) {
                Ok(status) => BridgeResponse::Status(status),
                Err(e) => BridgeResponse::Error(e.to_string()),
            },
            BridgeCommand::TakeHostCommands => {
                BridgeResponse::HostCommands(self.bridge.take_host_commands())
            }
            BridgeCommand::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
                BridgeResponse::Ok
            }
        }
    }
}
