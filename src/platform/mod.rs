use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::error::PlatformError;
use crate::models::{NativePlaybackState, Notification, NowPlayingInfo};

#[cfg(test)]
pub mod fake;
mod headless;
#[cfg(target_os = "macos")]
mod macos;

pub use headless::{HeadlessNotificationCenter, HeadlessNowPlayingCenter, HeadlessWorkspace};

/// The OS user notification center.
pub trait NotificationCenter: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<(), PlatformError>;

    fn remove_all_delivered(&self) -> Result<(), PlatformError>;
}

/// The OS now-playing record shown on the lock screen and in media controls.
pub trait NowPlayingCenter: Send + Sync {
    fn set_playback_state(&self, state: NativePlaybackState) -> Result<(), PlatformError>;

    fn publish(&self, info: &NowPlayingInfo) -> Result<(), PlatformError>;

    /// Moves the elapsed time of the record already published, leaving its
    /// artwork untouched.
    fn update_elapsed(&self, info: &NowPlayingInfo) -> Result<(), PlatformError> {
        self.publish(info)
    }
}

/// Window-server facts about the host application.
pub trait Workspace: Send + Sync {
    fn is_host_frontmost(&self) -> bool;

    fn hide_host(&self) -> Result<(), PlatformError>;

    fn os_version(&self) -> Option<OsVersion>;

    /// Hosts report focus changes for backends that cannot observe them.
    fn focus_changed(&self, _frontmost: bool) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl OsVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl std::fmt::Display for OsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::str::FromStr for OsVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let mut next = |required: bool| -> Result<u32, String> {
            match parts.next() {
                Some(p) => p
                    .parse()
                    .map_err(|_| format!("Invalid OS version: {s}")),
                None if required => Err(format!("Invalid OS version: {s}")),
                None => Ok(0),
            }
        };
        let version = OsVersion::new(next(true)?, next(false)?, next(false)?);
        if parts.next().is_some() {
            return Err(format!("Invalid OS version: {s}"));
        }
        Ok(version)
    }
}

/// Native services the bridge drives.
#[derive(Clone)]
pub struct Platform {
    pub notifications: Arc<dyn NotificationCenter>,
    pub now_playing: Arc<dyn NowPlayingCenter>,
    pub workspace: Arc<dyn Workspace>,
}

impl Platform {
    /// The backend for the current OS.
    pub fn native(config: &Config) -> Self {
        #[cfg(target_os = "macos")]
        {
            macos::platform(config)
        }
        #[cfg(not(target_os = "macos"))]
        {
            Self::headless(config)
        }
    }

    pub fn headless(config: &Config) -> Self {
        let os_version = config
            .host
            .os_version
            .as_deref()
            .and_then(|v| v.parse().ok());
        Self {
            notifications: Arc::new(HeadlessNotificationCenter::new()),
            now_playing: Arc::new(HeadlessNowPlayingCenter::new()),
            workspace: Arc::new(HeadlessWorkspace::new(os_version)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_version_parse_and_order() {
        let min: OsVersion = "10.12.1".parse().unwrap();
        assert_eq!(min, OsVersion::new(10, 12, 1));
        assert_eq!("11".parse::<OsVersion>().unwrap(), OsVersion::new(11, 0, 0));
        assert!("10.x".parse::<OsVersion>().is_err());
        assert!("1.2.3.4".parse::<OsVersion>().is_err());

        assert!(OsVersion::new(10, 12, 2) > min);
        assert!(OsVersion::new(10, 13, 0) > min);
        assert!(OsVersion::new(10, 12, 1) <= min);
        assert!(OsVersion::new(10, 9, 5) < min);
        assert_eq!(min.to_string(), "10.12.1");
    }
}
