use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

use super::{NotificationCenter, NowPlayingCenter, OsVersion, Workspace};
use crate::error::PlatformError;
use crate::models::{NativePlaybackState, Notification, NowPlayingInfo};

/// Notification center for systems without one: logs what would be shown.
#[derive(Default)]
pub struct HeadlessNotificationCenter {
    delivered: Mutex<Vec<Uuid>>,
}

impl HeadlessNotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationCenter for HeadlessNotificationCenter {
    fn deliver(&self, notification: &Notification) -> Result<(), PlatformError> {
        info!(
            title = %notification.title,
            subtitle = %notification.subtitle,
            text = %notification.informative_text,
            "notification"
        );
        self.delivered
            .lock()
            .map_err(|_| PlatformError::Native("notification list poisoned".to_string()))?
            .push(notification.id);
        Ok(())
    }

    fn remove_all_delivered(&self) -> Result<(), PlatformError> {
        self.delivered
            .lock()
            .map_err(|_| PlatformError::Native("notification list poisoned".to_string()))?
            .clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct HeadlessNowPlayingCenter;

impl HeadlessNowPlayingCenter {
    pub fn new() -> Self {
        Self
    }
}

impl NowPlayingCenter for HeadlessNowPlayingCenter {
    fn set_playback_state(&self, state: NativePlaybackState) -> Result<(), PlatformError> {
        info!(%state, "now playing state");
        Ok(())
    }

    fn publish(&self, info: &NowPlayingInfo) -> Result<(), PlatformError> {
        info!(
            title = info.title.as_deref().unwrap_or("-"),
            media_type = ?info.media_type,
            artwork = info.artwork.is_some(),
            "now playing info"
        );
        Ok(())
    }

    fn update_elapsed(&self, info: &NowPlayingInfo) -> Result<(), PlatformError> {
        debug!(elapsed = info.elapsed, "now playing elapsed");
        Ok(())
    }
}

/// Tracks host focus from the host's own reports.
pub struct HeadlessWorkspace {
    frontmost: AtomicBool,
    os_version: Option<OsVersion>,
}

impl HeadlessWorkspace {
    pub fn new(os_version: Option<OsVersion>) -> Self {
        Self {
            frontmost: AtomicBool::new(false),
            os_version,
        }
    }
}

impl Workspace for HeadlessWorkspace {
    fn is_host_frontmost(&self) -> bool {
        self.frontmost.load(Ordering::SeqCst)
    }

    fn hide_host(&self) -> Result<(), PlatformError> {
        self.frontmost.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn os_version(&self) -> Option<OsVersion> {
        self.os_version
    }

    fn focus_changed(&self, frontmost: bool) {
        self.frontmost.store(frontmost, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Song;

    #[test]
    fn test_focus_tracking() {
        let workspace = HeadlessWorkspace::new(None);
        assert!(!workspace.is_host_frontmost());
        workspace.focus_changed(true);
        assert!(workspace.is_host_frontmost());
        workspace.hide_host().unwrap();
        assert!(!workspace.is_host_frontmost());
    }

    #[test]
    fn test_delivered_list_is_cleared() {
        let center = HeadlessNotificationCenter::new();
        let song = Song::new("1", "A", "B", "C");
        center
            .deliver(&Notification::for_song(&song, "Skip"))
            .unwrap();
        assert_eq!(center.delivered.lock().unwrap().len(), 1);
        center.remove_all_delivered().unwrap();
        assert!(center.delivered.lock().unwrap().is_empty());
    }
}
