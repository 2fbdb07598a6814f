use anyhow::{Context, Result};
use interprocess::TryClone;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::models::{BridgeStatus, HostCommand, HostEvent};

/// One request per connection, sent as a single JSON line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BridgeCommand {
    Event(HostEvent),
    GetStatus,
    TakeHostCommands,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BridgeResponse {
    Ok,
    Status(BridgeStatus),
    HostCommands(Vec<HostCommand>),
    Error(String),
}

pub struct BridgeClient {
    socket_path: std::path::PathBuf,
}

impl BridgeClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub fn is_daemon_running(&self) -> bool {
        self.socket_path.exists() && self.send_command(BridgeCommand::GetStatus).is_ok()
    }

    pub fn send_command(&self, command: BridgeCommand) -> Result<BridgeResponse> {
        use interprocess::local_socket::GenericFilePath;
        use interprocess::local_socket::prelude::*;

        let path = self.socket_path.as_os_str();
        let name = path
            .to_fs_name::<GenericFilePath>()
            .with_context(|| "Invalid socket path")?;

        let conn = interprocess::local_socket::Stream::connect(name).with_context(|| {
            format!(
                "Failed to connect to daemon at {}",
                self.socket_path.display()
            )
        })?;

        let mut writer = conn;
        let mut reader = BufReader::new(writer.try_clone()?);

        let msg = serde_json::to_string(&command)?;
        writeln!(writer, "{msg}")?;
        writer.flush()?;

        let mut response_line = String::new();
        reader.read_line(&mut response_line)?;

        let response: BridgeResponse = serde_json::from_str(&response_line)
            .with_context(|| "Failed to parse daemon response")?;

        Ok(response)
    }

    pub fn send_event(&self, event: HostEvent) -> Result<()> {
        match self.send_command(BridgeCommand::Event(event))? {
            BridgeResponse::Ok => Ok(()),
            BridgeResponse::Error(e) => anyhow::bail!("{e}"),
            _ => anyhow::bail!("Unexpected response"),
        }
    }

    pub fn get_status(&self) -> Result<BridgeStatus> {
        match self.send_command(BridgeCommand::GetStatus)? {
            BridgeResponse::Status(status) => Ok(status),
            BridgeResponse::Error(e) => anyhow::bail!("{e}"),
            _ => anyhow::bail!("Unexpected response"),
        }
    }

    pub fn take_host_commands(&self) -> Result<Vec<HostCommand>> {
        match self.send_command(BridgeCommand::TakeHostCommands)? {
            BridgeResponse::HostCommands(commands) => Ok(commands),
            BridgeResponse::Error(e) => anyhow::bail!("{e}"),
            _ => anyhow::bail!("Unexpected response"),
        }
    }

    pub fn shutdown(&self) -> Result<BridgeResponse> {
        self.send_command(BridgeCommand::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlaybackState;

    #[test]
    fn test_command_wire_format() {
        let command = BridgeCommand::Event(HostEvent::PlaybackStateChanged {
            state: PlaybackState::Buffering,
        });
        let json = serde_json::to_string(&command).unwrap();
        assert_eq!(
            json,
            r#"{"Event":{"type":"playback_state_changed","state":"buffering"}}"#
        );

        let parsed: BridgeCommand = serde_json::from_str(r#""TakeHostCommands""#).unwrap();
        assert!(matches!(parsed, BridgeCommand::TakeHostCommands));
    }

    #[test]
    fn test_response_carries_host_commands() {
        let json =
            serde_json::to_string(&BridgeResponse::HostCommands(vec![HostCommand::NextTrack]))
                .unwrap();
        let parsed: BridgeResponse = serde_json::from_str(&json).unwrap();
        match parsed {
            BridgeResponse::HostCommands(commands) => {
                assert_eq!(commands, vec![HostCommand::NextTrack])
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_client_without_daemon_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let client = BridgeClient::new(dir.path().join("missing.sock"));
        assert!(!client.is_daemon_running());
        assert!(client.get_status().is_err());
    }
}
