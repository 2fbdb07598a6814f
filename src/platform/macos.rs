//! AppKit and MediaPlayer backends.
//!
//! Native objects are looked up on every call and never stored, so the
//! backends stay `Send + Sync` and can be driven from any runtime thread.

use std::panic::AssertUnwindSafe;
use std::ptr;
use std::sync::Arc;

use objc2::msg_send;
use objc2::rc::Retained;
use objc2::runtime::AnyObject;
use objc2_app_kit::{NSImage, NSWorkspace};
use objc2_foundation::{
    NSData, NSMutableCopying, NSMutableDictionary, NSNumber, NSObjectNSKeyValueCoding,
    NSProcessInfo, NSSize, NSString, NSUserNotification, NSUserNotificationCenter,
};
use objc2_media_player::{
    MPMediaItemArtwork, MPMediaItemPropertyAlbumTitle, MPMediaItemPropertyArtist,
    MPMediaItemPropertyArtwork, MPMediaItemPropertyTitle, MPNowPlayingInfoCenter,
    MPNowPlayingInfoMediaType, MPNowPlayingInfoPropertyElapsedPlaybackTime,
    MPNowPlayingInfoPropertyMediaType, MPNowPlayingPlaybackState,
};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::{NotificationCenter, NowPlayingCenter, OsVersion, Platform, Workspace};
use crate::artwork::{Image, LazyArtwork, Size};
use crate::config::Config;
use crate::error::PlatformError;
use crate::models::{MediaType, NativePlaybackState, Notification, NowPlayingInfo};

pub fn platform(config: &Config) -> Platform {
    Platform {
        notifications: Arc::new(MacNotificationCenter),
        now_playing: Arc::new(MacNowPlayingCenter::new()),
        workspace: Arc::new(MacWorkspace::new(config.host.bundle_id.clone())),
    }
}

fn ns_image(image: &Image) -> Option<Retained<NSImage>> {
    let png = match image.to_png() {
        Ok(png) => png,
        Err(e) => {
            warn!(error = %e, "failed to encode artwork");
            return None;
        }
    };
    let data = NSData::with_bytes(&png);
    NSImage::initWithData(NSImage::alloc(), &data)
}

/// Sets an undocumented notification property. These keys exist only on
/// some OS releases, so a thrown exception is logged and otherwise ignored.
fn set_private_value(notification: &NSUserNotification, key: &str, value: &AnyObject) {
    let ns_key = NSString::from_str(key);
    let result = unsafe {
        objc2::exception::catch(AssertUnwindSafe(|| {
            notification.setValue_forKey(Some(value), &ns_key)
        }))
    };
    if let Err(exception) = result {
        let error = PlatformError::PrivateApi {
            key: key.to_string(),
            message: exception
                .map(|e| format!("{e:?}"))
                .unwrap_or_else(|| "unknown exception".to_string()),
        };
        warn!(error = %error, "private notification property rejected");
    }
}

/// Notification properties that only exist as undocumented keys.
enum PrivateProperty<'a> {
    ShowsButtons(bool),
    IdentityImage(&'a Image),
}

impl PrivateProperty<'_> {
    fn key(&self) -> &'static str {
        match self {
            Self::ShowsButtons(_) => "_showsButtons",
            Self::IdentityImage(_) => "_identityImage",
        }
    }
}

fn private_properties(notification: &Notification) -> Vec<PrivateProperty<'_>> {
    if !notification.private_appearance {
        return Vec::new();
    }
    let mut properties = vec![PrivateProperty::ShowsButtons(
        notification.has_action_button(),
    )];
    if let Some(image) = &notification.identity_image {
        properties.push(PrivateProperty::IdentityImage(image));
    }
    properties
}

/// `NSUserNotificationCenter`. Activations come back through the host,
/// which owns the delegate.
pub struct MacNotificationCenter;

impl NotificationCenter for MacNotificationCenter {
    fn deliver(&self, notification: &Notification) -> Result<(), PlatformError> {
        let native = NSUserNotification::new();
        let title = NSString::from_str(&notification.title);
        let subtitle = NSString::from_str(&notification.subtitle);
        let text = NSString::from_str(&notification.informative_text);

        unsafe {
            native.setTitle(Some(&title));
            native.setSubtitle(Some(&subtitle));
            native.setInformativeText(Some(&text));
            native.setIdentifier(Some(&NSString::from_str(&notification.id.to_string())));

            match &notification.action_button_title {
                Some(button) => {
                    native.setHasActionButton(true);
                    native.setActionButtonTitle(&NSString::from_str(button));
                }
                None => native.setHasActionButton(false),
            }
        }

        if let Some(image) = notification.content_image.as_ref().and_then(ns_image) {
            let _: () = unsafe { msg_send![&*native, setContentImage: &*image] };
        }

        for property in private_properties(notification) {
            match &property {
                PrivateProperty::ShowsButtons(shows) => {
                    set_private_value(&native, property.key(), &NSNumber::new_bool(*shows));
                }
                PrivateProperty::IdentityImage(image) => {
                    if let Some(image) = ns_image(image) {
                        set_private_value(&native, property.key(), &image);
                    }
                }
            }
        }

        unsafe {
            NSUserNotificationCenter::defaultUserNotificationCenter().deliverNotification(&native);
        }
        debug!(title = %notification.title, "notification delivered");
        Ok(())
    }

    fn remove_all_delivered(&self) -> Result<(), PlatformError> {
        unsafe {
            NSUserNotificationCenter::defaultUserNotificationCenter()
                .removeAllDeliveredNotifications();
        }
        Ok(())
    }
}

/// `MPNowPlayingInfoCenter`.
///
/// Artwork is handed over as an `MPMediaItemArtwork` whose request handler
/// renders through [`LazyArtwork`] on the runtime captured at startup.
pub struct MacNowPlayingCenter {
    runtime: Option<Handle>,
}

impl MacNowPlayingCenter {
    pub fn new() -> Self {
        Self {
            runtime: Handle::try_current().ok(),
        }
    }

    fn artwork(&self, artwork: &LazyArtwork) -> Option<Retained<MPMediaItemArtwork>> {
        let runtime = self.runtime.clone()?;
        let artwork = artwork.clone();
        let bounds = artwork.bounds();

        let handler = block2::RcBlock::new(move |requested: NSSize| -> *const NSImage {
            let size = Size {
                width: requested.width,
                height: requested.height,
            };
            let image = render(&runtime, &artwork, size);
            match ns_image(&image) {
                Some(image) => Retained::autorelease_return(image).cast_const(),
                None => ptr::null(),
            }
        });

        let bounds = NSSize {
            width: bounds.width,
            height: bounds.height,
        };
        Some(unsafe {
            MPMediaItemArtwork::initWithBoundsSize_requestHandler(
                MPMediaItemArtwork::alloc(),
                bounds,
                &handler,
            )
        })
    }
}

/// Blocks the calling MediaPlayer thread until the image is ready. The work
/// runs on a scoped thread so this is safe even if the caller is itself a
/// runtime worker.
fn render(runtime: &Handle, artwork: &LazyArtwork, size: Size) -> Image {
    let resolved = std::thread::scope(|scope| {
        scope
            .spawn(|| runtime.block_on(artwork.image_for(size)))
            .join()
    });
    match resolved {
        Ok(Ok(image)) => image,
        Ok(Err(e)) => {
            warn!(song = artwork.song_id(), error = %e, "artwork request failed");
            Image::placeholder(size.pixel_width())
        }
        Err(_) => Image::placeholder(size.pixel_width()),
    }
}

impl NowPlayingCenter for MacNowPlayingCenter {
    fn set_playback_state(&self, state: NativePlaybackState) -> Result<(), PlatformError> {
        let native = match state {
            NativePlaybackState::Playing => MPNowPlayingPlaybackState::Playing,
            NativePlaybackState::Paused => MPNowPlayingPlaybackState::Paused,
            NativePlaybackState::Stopped => MPNowPlayingPlaybackState::Stopped,
            NativePlaybackState::Unknown => MPNowPlayingPlaybackState::Unknown,
        };
        unsafe {
            MPNowPlayingInfoCenter::defaultCenter().setPlaybackState(native);
        }
        Ok(())
    }

    /// Edits the published dictionary in place so the existing artwork
    /// object, and the images the OS already rendered from it, are kept.
    fn update_elapsed(&self, info: &NowPlayingInfo) -> Result<(), PlatformError> {
        let Some(elapsed) = info.elapsed else {
            return Ok(());
        };
        let center = unsafe { MPNowPlayingInfoCenter::defaultCenter() };
        let Some(current) = (unsafe { center.nowPlayingInfo() }) else {
            return self.publish(info);
        };

        let dict = current.mutableCopy();
        unsafe {
            dict.insert(
                MPNowPlayingInfoPropertyElapsedPlaybackTime,
                &*NSNumber::new_f64(elapsed),
            );
            center.setNowPlayingInfo(Some(&dict));
        }
        Ok(())
    }

    fn publish(&self, info: &NowPlayingInfo) -> Result<(), PlatformError> {
        let media_type = match info.media_type {
            MediaType::Audio => MPNowPlayingInfoMediaType::Audio,
            MediaType::Video => MPNowPlayingInfoMediaType::Video,
        };
        let artwork = info.artwork.as_ref().and_then(|a| self.artwork(a));

        unsafe {
            let dict: Retained<NSMutableDictionary<NSString, AnyObject>> =
                NSMutableDictionary::new();

            let media_type = NSNumber::new_usize(media_type.0);
            dict.insert(MPNowPlayingInfoPropertyMediaType, &*media_type);

            if let Some(title) = &info.title {
                dict.insert(MPMediaItemPropertyTitle, &*NSString::from_str(title));
            }
            if let Some(album) = &info.album {
                dict.insert(MPMediaItemPropertyAlbumTitle, &*NSString::from_str(album));
            }
            if let Some(artist) = &info.artist {
                dict.insert(MPMediaItemPropertyArtist, &*NSString::from_str(artist));
            }
            if let Some(elapsed) = info.elapsed {
                dict.insert(
                    MPNowPlayingInfoPropertyElapsedPlaybackTime,
                    &*NSNumber::new_f64(elapsed),
                );
            }
            if let Some(artwork) = &artwork {
                dict.insert(MPMediaItemPropertyArtwork, &**artwork);
            }

            MPNowPlayingInfoCenter::defaultCenter().setNowPlayingInfo(Some(&dict));
        }
        Ok(())
    }
}

/// `NSWorkspace`, matching the host by bundle identifier.
pub struct MacWorkspace {
    bundle_id: String,
}

impl MacWorkspace {
    pub fn new(bundle_id: String) -> Self {
        Self { bundle_id }
    }
}

impl Workspace for MacWorkspace {
    fn is_host_frontmost(&self) -> bool {
        let frontmost = unsafe { NSWorkspace::sharedWorkspace().frontmostApplication() };
        frontmost
            .and_then(|app| unsafe { app.bundleIdentifier() })
            .is_some_and(|id| id.to_string() == self.bundle_id)
    }

    fn hide_host(&self) -> Result<(), PlatformError> {
        let app = unsafe { NSWorkspace::sharedWorkspace().frontmostApplication() }
            .ok_or_else(|| PlatformError::Native("no frontmost application".to_string()))?;
        let is_host = unsafe { app.bundleIdentifier() }
            .is_some_and(|id| id.to_string() == self.bundle_id);
        if is_host && !unsafe { app.hide() } {
            return Err(PlatformError::Native(format!(
                "{} refused to hide",
                self.bundle_id
            )));
        }
        Ok(())
    }

    fn os_version(&self) -> Option<OsVersion> {
        let version = unsafe { NSProcessInfo::processInfo().operatingSystemVersion() };
        Some(OsVersion::new(
            u32::try_from(version.majorVersion).ok()?,
            u32::try_from(version.minorVersion).ok()?,
            u32::try_from(version.patchVersion).ok()?,
        ))
    }
}
