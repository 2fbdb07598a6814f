//! Translates host playback events into notifications and now-playing
//! updates.
//!
//! Nothing here may stall or fail playback: every handler returns a typed
//! error, and the event loop (or the detached task that produced it) is
//! the only place those errors are logged.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::artwork::{ImageResolver, LazyArtwork, Size};
use crate::config::Config;
use crate::error::BridgeError;
use crate::models::{
    ActivationType, BridgeStatus, HostCommand, HostEvent, MediaType, NativePlaybackState,
    Notification, NowPlayingSummary, PlaybackState, Song,
};
use crate::nowplaying::{Applied, NowPlayingHandle, NowPlayingUpdate};
use crate::platform::{OsVersion, Platform};


/// Total mapping from host playback state to the now-playing center's.
pub fn map_playback_state(state: PlaybackState) -> NativePlaybackState {
    match state {
        PlaybackState::Playing | PlaybackState::Buffering => NativePlaybackState::Playing,
        PlaybackState::Paused => NativePlaybackState::Paused,
        PlaybackState::Stopped => NativePlaybackState::Stopped,
        PlaybackState::Unknown => NativePlaybackState::Unknown,
    }
}

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub notifications_enabled: bool,
    pub action_button_title: String,
    pub notification_image_width: u32,
    pub private_appearance: bool,
    pub min_os_version: OsVersion,
    pub artwork_bounds: f64,
    pub max_screen_size: u32,
    pub discard_stale_artwork: bool,
}

impl BridgeOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        let min_os_version = config
            .now_playing
            .min_os_version
            .parse()
            .map_err(anyhow::Error::msg)
            .with_context(|| "Invalid now_playing.min_os_version")?;

        Ok(Self {
            notifications_enabled: config.notifications.enabled,
            action_button_title: config.notifications.action_button_title.clone(),
            notification_image_width: config.notifications.image_width,
            private_appearance: config.notifications.private_appearance,
            min_os_version,
            artwork_bounds: config.now_playing.artwork_bounds,
            max_screen_size: config.now_playing.max_screen_size,
            discard_stale_artwork: config.now_playing.discard_stale_artwork,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    Scheduled,
    Disabled,
    HostFrontmost,
    NotPlaying,
}

#[derive(Debug, Default)]
struct PlayerState {
    state: PlaybackState,
    current_song: Option<Song>,
}

pub struct TrackBridge {
    platform: Platform,
    now_playing: NowPlayingHandle,
    artwork: Arc<ImageResolver>,
    options: BridgeOptions,
    player: Mutex<PlayerState>,
    playback_is_video: AtomicBool,
    now_playing_supported: OnceLock<bool>,
    host_commands: Mutex<Vec<HostCommand>>,
    background: Mutex<Vec<JoinHandle<()>>>,
    delivery: tokio::sync::Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn keep_first<T>(first: &mut Option<BridgeError>, result: Result<T, BridgeError>) {
    if let Err(e) = result {
        if first.is_none() {
            *first = Some(e);
        } else {
            report("secondary", &e);
        }
    }
}

/// The one place bridge failures are logged.
fn report(context: &str, e: &BridgeError) {
    error!(context, kind = e.kind(), error = %e, "now-playing bridge error");
}

impl TrackBridge {
    /// Must be called inside a Tokio runtime; the now-playing updater is
    /// spawned onto it.
    pub fn new(
        platform: Platform,
        artwork: Arc<ImageResolver>,
        options: BridgeOptions,
        playback_is_video: bool,
    ) -> Arc<Self> {
        let now_playing =
            NowPlayingHandle::spawn(platform.now_playing.clone(), options.discard_stale_artwork);

        Arc::new(Self {
            platform,
            now_playing,
            artwork,
            options,
            player: Mutex::new(PlayerState::default()),
            playback_is_video: AtomicBool::new(playback_is_video),
            now_playing_supported: OnceLock::new(),
            host_commands: Mutex::new(Vec::new()),
            background: Mutex::new(Vec::new()),
            delivery: tokio::sync::Mutex::new(()),
        })
    }

    /// Handles host events until the sender side closes.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<HostEvent>) {
        info!("Bridge event loop started");
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle(event).await {
                report("event", &e);
            }
        }
        self.wait_for_background().await;
        info!("Bridge event loop stopped");
    }

    pub async fn handle(self: &Arc<Self>, event: HostEvent) -> Result<(), BridgeError> {
        debug!(?event, "host event");
        match event {
            HostEvent::PlaybackStateChanged { state } => self.on_playback_state_changed(state).await,
            HostEvent::TrackChanged { song } => self.on_track_changed(song).await,
            HostEvent::PositionChanged { seconds } => self.update_progress(seconds).await,
            HostEvent::FocusChanged { frontmost } => {
                self.platform.workspace.focus_changed(frontmost);
                Ok(())
            }
            HostEvent::VideoModeChanged { enabled } => {
                self.playback_is_video.store(enabled, Ordering::SeqCst);
                Ok(())
            }
            HostEvent::NotificationActivated { activation } => {
                self.on_notification_activated(activation)
            }
        }
    }

    pub async fn on_playback_state_changed(
        self: &Arc<Self>,
        state: PlaybackState,
    ) -> Result<(), BridgeError> {
        let current_song = {
            let mut player = lock(&self.player);
            player.state = state;
            player.current_song.clone()
        };

        let mut first = None;
        if matches!(state, PlaybackState::Paused | PlaybackState::Stopped) {
            let _delivery = self.delivery.lock().await;
            keep_first(
                &mut first,
                self.platform
                    .notifications
                    .remove_all_delivered()
                    .map_err(BridgeError::from),
            );
        }
        if state == PlaybackState::Playing {
            if let Some(song) = current_song {
                keep_first(&mut first, self.update_song(song).await);
            }
        }
        keep_first(&mut first, self.set_native_state(state).await);

        first.map_or(Ok(()), Err)
    }

    /// Memoized: the OS version is asked once per bridge.
    fn now_playing_supported(&self) -> bool {
        *self.now_playing_supported.get_or_init(|| {
            match self.platform.workspace.os_version() {
                Some(version) => version > self.options.min_os_version,
                None => true,
            }
        })
    }

    /// Returns `false` when the now-playing center is unavailable and the
    /// update was skipped.
    pub async fn set_native_state(&self, state: PlaybackState) -> Result<bool, BridgeError> {
        if !self.now_playing_supported() {
            debug!(%state, "now-playing center unavailable; skipping state");
            return Ok(false);
        }
        let native = map_playback_state(state);
        self.now_playing
            .apply(NowPlayingUpdate::PlaybackState(native))
            .await?;
        Ok(true)
    }

    pub async fn on_track_changed(self: &Arc<Self>, song: Song) -> Result<(), BridgeError> {
        lock(&self.player).current_song = Some(song.clone());
        self.update_song(song).await
    }

    async fn update_song(self: &Arc<Self>, song: Song) -> Result<(), BridgeError> {
        let generation = self.now_playing.begin_track();
        let mut first = None;

        keep_first(&mut first, self.on_song_changed(&song, generation));

        if self.now_playing_supported() {
            let media_type = self.media_type();
            keep_first(
                &mut first,
                self.now_playing
                    .apply(NowPlayingUpdate::Track {
                        generation,
                        song: song.clone(),
                        media_type,
                    })
                    .await,
            );

            let bridge = Arc::clone(self);
            self.detach(async move {
                if let Err(e) = bridge.fetch_artwork(song, generation).await {
                    report("artwork", &e);
                }
            });
        }

        first.map_or(Ok(()), Err)
    }

    fn media_type(&self) -> MediaType {
        if self.playback_is_video.load(Ordering::SeqCst) {
            MediaType::Video
        } else {
            MediaType::Audio
        }
    }

    /// Decides whether a banner is due and, if so, builds and delivers it
    /// in the background once its image is resolved.
    pub fn on_song_changed(
        self: &Arc<Self>,
        song: &Song,
        generation: u64,
    ) -> Result<NotificationOutcome, BridgeError> {
        if !self.options.notifications_enabled {
            return Ok(NotificationOutcome::Disabled);
        }
        if self.platform.workspace.is_host_frontmost() {
            return Ok(NotificationOutcome::HostFrontmost);
        }
        if lock(&self.player).state != PlaybackState::Playing {
            return Ok(NotificationOutcome::NotPlaying);
        }

        let bridge = Arc::clone(self);
        let song = song.clone();
        self.detach(async move {
            if let Err(e) = bridge.deliver_notification(song, generation).await {
                report("notification", &e);
            }
        });
        Ok(NotificationOutcome::Scheduled)
    }

    pub async fn create_notification(&self, song: &Song) -> Notification {
        let mut notification = Notification::for_song(song, &self.options.action_button_title);

        let image = match self
            .artwork
            .get_image(Some(song), self.options.notification_image_width, None)
            .await
        {
            Ok(image) => image,
            Err(e) => {
                warn!(song = %song.id, error = %e, "notification image unavailable");
                None
            }
        };

        if self.options.private_appearance {
            notification.private_appearance = true;
            notification.identity_image = image;
        } else {
            notification.content_image = image;
        }
        notification
    }

    async fn deliver_notification(&self, song: Song, generation: u64) -> Result<bool, BridgeError> {
        let notification = self.create_notification(&song).await;

        let _delivery = self.delivery.lock().await;
        if generation != self.now_playing.current_generation() {
            debug!(song = %song.id, "track changed before notification was ready");
            return Ok(false);
        }
        if lock(&self.player).state != PlaybackState::Playing
            || self.platform.workspace.is_host_frontmost()
        {
            return Ok(false);
        }

        self.platform.notifications.remove_all_delivered()?;
        self.platform.notifications.deliver(&notification)?;
        Ok(true)
    }

    /// Publishes lazy artwork for `song` when local or remote artwork exists.
    async fn fetch_artwork(
        &self,
        song: Song,
        generation: u64,
    ) -> Result<Option<Applied>, BridgeError> {
        let local = self
            .artwork
            .local_image(&song, self.options.max_screen_size)
            .await?;

        if local.is_none() && self.artwork.artwork_url(&song).await?.is_none() {
            debug!(song = %song.id, "no artwork for track");
            return Ok(None);
        }

        let artwork = LazyArtwork::new(
            Size::square(self.options.artwork_bounds),
            song,
            Arc::clone(&self.artwork),
        );
        let applied = self
            .now_playing
            .apply(NowPlayingUpdate::Artwork {
                generation,
                artwork,
            })
            .await?;
        Ok(Some(applied))
    }

    pub async fn update_progress(&self, seconds: f64) -> Result<(), BridgeError> {
        if !self.now_playing_supported() {
            return Ok(());
        }
        self.now_playing
            .apply(NowPlayingUpdate::Elapsed(seconds.max(0.0)))
            .await?;
        Ok(())
    }

    pub fn on_notification_activated(&self, activation: ActivationType) -> Result<(), BridgeError> {
        if activation != ActivationType::ActionButtonClicked {
            debug!(?activation, "ignoring notification activation");
            return Ok(());
        }

        let frontmost = self.platform.workspace.is_host_frontmost();
        debug!(frontmost, "skip requested from notification");
        lock(&self.host_commands).push(HostCommand::NextTrack);
        if frontmost {
            self.platform.workspace.hide_host()?;
        }
        Ok(())
    }

    pub fn take_host_commands(&self) -> Vec<HostCommand> {
        std::mem::take(&mut *lock(&self.host_commands))
    }

    pub async fn status(&self) -> Result<BridgeStatus, BridgeError> {
        let now_playing = self.now_playing.snapshot().await?;
        let player = lock(&self.player);
        Ok(BridgeStatus {
            state: player.state,
            current_song: player.current_song.clone(),
            generation: self.now_playing.current_generation(),
            now_playing: NowPlayingSummary::from(&now_playing),
            playback_is_video: self.playback_is_video.load(Ordering::SeqCst),
            pending_commands: lock(&self.host_commands).len(),
        })
    }

    #[cfg(test)]
    pub(crate) fn now_playing(&self) -> &NowPlayingHandle {
        &self.now_playing
    }

    fn detach<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut background = lock(&self.background);
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }

    /// Waits for every detached notification and artwork task, including
    /// ones spawned while waiting.
    pub async fn wait_for_background(&self) {
        loop {
            let pending = std::mem::take(&mut *lock(&self.background));
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    warn!(error = %e, "background task panicked");
                }
            }
        }
    }
}
