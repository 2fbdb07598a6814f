//! Recording platform backends for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{NotificationCenter, NowPlayingCenter, OsVersion, Platform, Workspace};
use crate::error::PlatformError;
use crate::models::{NativePlaybackState, Notification, NowPlayingInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CenterCall {
    Deliver(String),
    RemoveAll,
}

#[derive(Default)]
pub struct FakeNotificationCenter {
    calls: Mutex<Vec<CenterCall>>,
    visible: Mutex<Vec<Notification>>,
}

impl FakeNotificationCenter {
    pub fn calls(&self) -> Vec<CenterCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn visible(&self) -> Vec<Notification> {
        self.visible.lock().unwrap().clone()
    }

    pub fn delivered_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, CenterCall::Deliver(_)))
            .count()
    }
}

impl NotificationCenter for FakeNotificationCenter {
    fn deliver(&self, notification: &Notification) -> Result<(), PlatformError> {
        self.calls
            .lock()
            .unwrap()
            .push(CenterCall::Deliver(notification.title.clone()));
        self.visible.lock().unwrap().push(notification.clone());
        Ok(())
    }

    fn remove_all_delivered(&self) -> Result<(), PlatformError> {
        self.calls.lock().unwrap().push(CenterCall::RemoveAll);
        self.visible.lock().unwrap().clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeNowPlayingCenter {
    states: Mutex<Vec<NativePlaybackState>>,
    published: Mutex<Vec<NowPlayingInfo>>,
    elapsed: Mutex<Vec<f64>>,
    fail_state: AtomicBool,
}

impl FakeNowPlayingCenter {
    pub fn states(&self) -> Vec<NativePlaybackState> {
        self.states.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<NowPlayingInfo> {
        self.published.lock().unwrap().clone()
    }

    pub fn last_published(&self) -> Option<NowPlayingInfo> {
        self.published.lock().unwrap().last().cloned()
    }

    pub fn elapsed_updates(&self) -> Vec<f64> {
        self.elapsed.lock().unwrap().clone()
    }

    pub fn fail_state_updates(&self) {
        self.fail_state.store(true, Ordering::SeqCst);
    }
}

impl NowPlayingCenter for FakeNowPlayingCenter {
    fn set_playback_state(&self, state: NativePlaybackState) -> Result<(), PlatformError> {
        if self.fail_state.load(Ordering::SeqCst) {
            return Err(PlatformError::Native("setPlaybackState rejected".to_string()));
        }
        self.states.lock().unwrap().push(state);
        Ok(())
    }

    fn publish(&self, info: &NowPlayingInfo) -> Result<(), PlatformError> {
        self.published.lock().unwrap().push(info.clone());
        Ok(())
    }

    fn update_elapsed(&self, info: &NowPlayingInfo) -> Result<(), PlatformError> {
        self.elapsed
            .lock()
            .unwrap()
            .push(info.elapsed.unwrap_or_default());
        Ok(())
    }
}

pub struct FakeWorkspace {
    frontmost: AtomicBool,
    os_version: Option<OsVersion>,
    version_queries: AtomicUsize,
    hides: AtomicUsize,
}

impl FakeWorkspace {
    pub fn new(os_version: Option<OsVersion>) -> Self {
        Self {
            frontmost: AtomicBool::new(false),
            os_version,
            version_queries: AtomicUsize::new(0),
            hides: AtomicUsize::new(0),
        }
    }

    pub fn set_frontmost(&self, frontmost: bool) {
        self.frontmost.store(frontmost, Ordering::SeqCst);
    }

    pub fn version_queries(&self) -> usize {
        self.version_queries.load(Ordering::SeqCst)
    }

    pub fn hides(&self) -> usize {
        self.hides.load(Ordering::SeqCst)
    }
}

impl Workspace for FakeWorkspace {
    fn is_host_frontmost(&self) -> bool {
        self.frontmost.load(Ordering::SeqCst)
    }

    fn hide_host(&self) -> Result<(), PlatformError> {
        self.hides.fetch_add(1, Ordering::SeqCst);
        self.frontmost.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn os_version(&self) -> Option<OsVersion> {
        self.version_queries.fetch_add(1, Ordering::SeqCst);
        self.os_version
    }

    fn focus_changed(&self, frontmost: bool) {
        self.set_frontmost(frontmost);
    }
}

pub struct FakePlatform {
    pub notifications: Arc<FakeNotificationCenter>,
    pub now_playing: Arc<FakeNowPlayingCenter>,
    pub workspace: Arc<FakeWorkspace>,
}

impl FakePlatform {
    pub fn new(os_version: Option<OsVersion>) -> Self {
        Self {
            notifications: Arc::new(FakeNotificationCenter::default()),
            now_playing: Arc::new(FakeNowPlayingCenter::default()),
            workspace: Arc::new(FakeWorkspace::new(os_version)),
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            notifications: self.notifications.clone(),
            now_playing: self.now_playing.clone(),
            workspace: self.workspace.clone(),
        }
    }
}
