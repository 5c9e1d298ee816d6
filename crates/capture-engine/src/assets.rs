//! Registry of preloaded assets for one session.

use std::collections::BTreeMap;

use lyricap_project_model::slide::AssetKey;
use lyricap_render_engine::compositor::ImageAsset;
use lyricap_render_engine::renderer::AssetLookup;

use crate::backend::{MediaKind, SharedElement};

/// A loaded, ready-to-use asset.
#[derive(Clone)]
pub enum AssetHandle {
    Image(ImageAsset),
    Media(SharedElement),
}

impl std::fmt::Debug for AssetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image(image) => f
                .debug_tuple("Image")
                .field(&(image.width, image.height))
                .finish(),
            Self::Media(element) => f.debug_tuple("Media").field(&element.source_ref()).finish(),
        }
    }
}

/// One handle per [`AssetKey`], owned by the session.
///
/// Releasing pauses and drops every media element; it also happens on drop,
/// so handles never outlive the session whichever way it ends.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    handles: BTreeMap<AssetKey, AssetHandle>,
    frames: BTreeMap<AssetKey, ImageAsset>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handle` to `key`, releasing any handle it replaces.
    pub fn insert(&mut self, key: AssetKey, handle: AssetHandle) {
        if let Some(AssetHandle::Media(old)) = self.handles.insert(key.clone(), handle) {
            old.pause();
        }
        self.frames.remove(&key);
    }

    pub fn get(&self, key: &AssetKey) -> Option<&AssetHandle> {
        self.handles.get(key)
    }

    /// The media element bound to `key`, if it is playable.
    pub fn element(&self, key: &AssetKey) -> Option<&SharedElement> {
        match self.handles.get(key) {
            Some(AssetHandle::Media(element)) => Some(element),
            _ => None,
        }
    }

    /// Every playable element, in key order.
    pub fn media(&self) -> impl Iterator<Item = (&AssetKey, &SharedElement)> {
        self.handles.iter().filter_map(|(key, handle)| match handle {
            AssetHandle::Media(element) => Some((key, element)),
            AssetHandle::Image(_) => None,
        })
    }

    /// Capture the frame each video element currently presents.
    pub fn refresh_video_frames(&mut self) {
        for (key, handle) in &self.handles {
            let AssetHandle::Media(element) = handle else {
                continue;
            };
            if element.kind() != MediaKind::Video {
                continue;
            }
            match element.current_frame() {
                Some(frame) => {
                    self.frames.insert(key.clone(), frame);
                }
                None => {
                    self.frames.remove(key);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Pause and drop every handle. Safe to call more than once.
    pub fn release(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        let count = self.handles.len();
        for (_, handle) in std::mem::take(&mut self.handles) {
            if let AssetHandle::Media(element) = handle {
                element.pause();
                element.set_muted(true);
            }
        }
        self.frames.clear();
        tracing::debug!(count, "Released session assets");
    }
}

impl AssetLookup for AssetRegistry {
    fn image(&self, key: &AssetKey) -> Option<&ImageAsset> {
        match self.handles.get(key) {
            Some(AssetHandle::Image(image)) => Some(image),
            _ => None,
        }
    }

    fn video_frame(&self, key: &AssetKey) -> Option<&ImageAsset> {
        self.frames.get(key)
    }
}

impl Drop for AssetRegistry {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessMedia;
    use crate::backend::{HeadlessClock, HeadlessSource, MediaElement};
    use lyricap_render_engine::compositor::Rgba;
    use std::sync::Arc;

    fn video(source_ref: &str) -> SharedElement {
        Arc::new(HeadlessMedia::new(
            source_ref,
            MediaKind::Video,
            HeadlessSource::media(5.0),
            HeadlessClock::virtual_clock(),
        ))
    }

    #[test]
    fn test_video_frames_appear_after_refresh() {
        let mut registry = AssetRegistry::new();
        let key = AssetKey::Slide("clip".into());
        registry.insert(key.clone(), AssetHandle::Media(video("clip.mp4")));
        registry.insert(
            AssetKey::Cover,
            AssetHandle::Image(ImageAsset::solid(2, 2, Rgba::WHITE)),
        );

        assert!(registry.video_frame(&key).is_none());
        registry.refresh_video_frames();
        assert!(registry.video_frame(&key).is_some());
        assert!(registry.image(&AssetKey::Cover).is_some());
        assert!(registry.image(&key).is_none());
        assert_eq!(registry.media().count(), 1);
    }

    #[test]
    fn test_video_frame_carries_decoded_picture() {
        let red = Rgba([255, 0, 0, 255]);
        let element: SharedElement = Arc::new(HeadlessMedia::new(
            "clip.mp4",
            MediaKind::Video,
            HeadlessSource::media(5.0).with_frame(ImageAsset::solid(3, 2, red)),
            HeadlessClock::virtual_clock(),
        ));
        let mut registry = AssetRegistry::new();
        let key = AssetKey::Slide("clip".into());
        registry.insert(key.clone(), AssetHandle::Media(element));
        registry.refresh_video_frames();

        let frame = registry.video_frame(&key).unwrap();
        assert_eq!((frame.width, frame.height), (3, 2));
        assert_eq!(frame.pixel(1, 1), red);
    }

    #[test]
    fn test_release_pauses_media_and_is_idempotent() {
        let element = video("clip.mp4");
        element.play().unwrap();

        let mut registry = AssetRegistry::new();
        registry.insert(AssetKey::Background, AssetHandle::Media(element.clone()));
        registry.release();
        registry.release();

        assert!(registry.is_empty());
        assert!(element.is_paused());
        assert!(element.is_muted());
    }

    #[test]
    fn test_drop_releases_media() {
        let element = video("bg.mp4");
        element.play().unwrap();
        {
            let mut registry = AssetRegistry::new();
            registry.insert(AssetKey::Background, AssetHandle::Media(element.clone()));
        }
        assert!(element.is_paused());
    }
}
