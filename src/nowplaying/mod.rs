//! Single owner of the now-playing record.
//!
//! Every write to the OS now-playing center goes through one task, fed by a
//! channel, so updates are applied in the order they arrive. Artwork writes
//! carry the track generation that produced them; writes from an older
//! generation are dropped when `discard_stale` is set.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::artwork::LazyArtwork;
use crate::error::{BridgeError, PlatformError};
use crate::models::{MediaType, NativePlaybackState, NowPlayingInfo, Song};
use crate::platform::NowPlayingCenter;

pub enum NowPlayingUpdate {
    PlaybackState(NativePlaybackState),
    Track {
        generation: u64,
        song: Song,
        media_type: MediaType,
    },
    Artwork {
        generation: u64,
        artwork: LazyArtwork,
    },
    Elapsed(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Published,
    Stale { generation: u64, current: u64 },
}

enum Message {
    Update {
        update: NowPlayingUpdate,
        reply: oneshot::Sender<Result<Applied, PlatformError>>,
    },
    Snapshot(oneshot::Sender<NowPlayingInfo>),
}

#[derive(Clone)]
pub struct NowPlayingHandle {
    tx: mpsc::Sender<Message>,
    generation: Arc<AtomicU64>,
}

impl NowPlayingHandle {
    /// Starts the updater task on the current runtime.
    pub fn spawn(center: Arc<dyn NowPlayingCenter>, discard_stale: bool) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let generation = Arc::new(AtomicU64::new(0));

        let updater = Updater {
            center,
            generation: Arc::clone(&generation),
            discard_stale,
            info: NowPlayingInfo::default(),
        };
        tokio::spawn(updater.run(rx));

        Self { tx, generation }
    }

    /// Marks the start of a new track and returns its generation.
    pub fn begin_track(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn apply(&self, update: NowPlayingUpdate) -> Result<Applied, BridgeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Update { update, reply })
            .await
            .map_err(|_| BridgeError::UpdaterClosed)?;
        Ok(rx.await.map_err(|_| BridgeError::UpdaterClosed)??)
    }

    pub async fn snapshot(&self) -> Result<NowPlayingInfo, BridgeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Snapshot(reply))
            .await
            .map_err(|_| BridgeError::UpdaterClosed)?;
        rx.await.map_err(|_| BridgeError::UpdaterClosed)
    }
}

struct Updater {
    center: Arc<dyn NowPlayingCenter>,
    generation: Arc<AtomicU64>,
    discard_stale: bool,
    info: NowPlayingInfo,
}

impl Updater {
    async fn run(mut self, mut rx: mpsc::Receiver<Message>) {
        while let Some(message) = rx.recv().await {
            match message {
                Message::Update { update, reply } => {
                    let result = self.apply(update);
                    let _ = reply.send(result);
                }
                Message::Snapshot(reply) => {
                    let _ = reply.send(self.info.clone());
                }
            }
        }
        debug!("now-playing updater stopped");
    }

    fn stale(&self, generation: u64) -> Option<Applied> {
        let current = self.generation.load(Ordering::SeqCst);
        if self.discard_stale && generation < current {
            Some(Applied::Stale {
                generation,
                current,
            })
        } else {
            None
        }
    }

    fn apply(&mut self, update: NowPlayingUpdate) -> Result<Applied, PlatformError> {
        match update {
            NowPlayingUpdate::PlaybackState(state) => {
                self.info.playback_state = state;
                self.center.set_playback_state(state)?;
                return Ok(Applied::Published);
            }
            NowPlayingUpdate::Track {
                generation,
                song,
                media_type,
            } => {
                if let Some(stale) = self.stale(generation) {
                    return Ok(stale);
                }
                self.info = NowPlayingInfo {
                    song_id: Some(song.id),
                    title: Some(song.name),
                    album: Some(song.album),
                    artist: Some(song.artist),
                    media_type,
                    artwork: None,
                    elapsed: None,
                    playback_state: self.info.playback_state,
                };
            }
            NowPlayingUpdate::Artwork {
                generation,
                artwork,
            } => {
                if let Some(stale) = self.stale(generation) {
                    debug!(generation, "dropping artwork from an older track");
                    return Ok(stale);
                }
                self.info.artwork = Some(artwork);
            }
            NowPlayingUpdate::Elapsed(seconds) => {
                self.info.elapsed = Some(seconds);
                if self.info.song_id.is_some() {
                    self.center.update_elapsed(&self.info)?;
                    return Ok(Applied::Published);
                }
            }
        }

        self.center.publish(&self.info)?;
        Ok(Applied::Published)
    }
}
