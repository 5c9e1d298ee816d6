use std::sync::Arc;
use std::time::Duration;

use lyricap_common::error::LyricapResult;
use lyricap_render_engine::compositor::{ImageAsset, Surface};
use lyricap_render_engine::export::RecordedOutput;

use crate::mixer::MixSnapshot;

pub mod headless;

pub use headless::{HeadlessBackend, HeadlessClock, HeadlessSource, ReadyMode};

/// A media element shared between the asset registry, the mixer, and the
/// render loop.
pub type SharedElement = Arc<dyn MediaElement>;

/// What a playable element carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

/// A playable audio or video element.
///
/// Methods take `&self`: elements are shared handles and implementations
/// use interior mutability, like the host elements they stand for.
#[async_trait::async_trait]
pub trait MediaElement: Send + Sync {
    /// Source the element was opened from.
    fn source_ref(&self) -> &str;

    fn kind(&self) -> MediaKind;

    /// Media duration in seconds, once known.
    fn duration(&self) -> Option<f64>;

    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    fn seek(&self, secs: f64);

    fn play(&self) -> LyricapResult<()>;

    fn pause(&self);

    fn is_paused(&self) -> bool;

    /// Reached the end without looping.
    fn ended(&self) -> bool;

    fn volume(&self) -> f32;

    fn set_volume(&self, volume: f32);

    fn is_muted(&self) -> bool;

    fn set_muted(&self, muted: bool);

    fn set_looping(&self, looping: bool);

    /// Whether the element plays straight to the local audio device.
    fn device_output(&self) -> bool;

    fn set_device_output(&self, enabled: bool);

    /// Whether the element's audio can be routed into a mixer.
    fn supports_audio_capture(&self) -> bool;

    /// Resolves once the element can present its first frame.
    async fn wait_ready(&self) -> LyricapResult<()>;

    /// The frame currently presented, for video elements.
    fn current_frame(&self) -> Option<ImageAsset>;
}

/// Recorder setup negotiated by the stream assembler.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderConfig {
    pub mime_type: String,
    pub video_bits_per_second: u64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Interval at which the recorder emits chunks.
    pub timeslice: Duration,
}

/// Encodes the capture stream into ordered chunks.
pub trait Recorder: Send {
    fn mime_type(&self) -> &str;

    fn start(&mut self) -> LyricapResult<()>;

    /// Sample the surface and the mix for one output frame.
    fn write_frame(&mut self, surface: &Surface, mix: &MixSnapshot) -> LyricapResult<()>;

    /// Stop and return every chunk emitted, in order.
    fn stop(&mut self) -> LyricapResult<RecordedOutput>;

    /// Stop without producing output.
    fn discard(&mut self);

    fn is_recording(&self) -> bool;
}

/// Per-frame callback primitive.
#[async_trait::async_trait]
pub trait FrameScheduler: Send {
    /// Wait for the next display refresh; returns its timestamp in ns.
    async fn next_frame(&mut self) -> u64;

    /// Suspend for `duration` on the scheduler's clock.
    async fn delay(&mut self, duration: Duration);
}

/// Host capabilities the capture pipeline needs.
#[async_trait::async_trait]
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Open a playable element. Readiness is awaited separately.
    fn open_media(&self, source_ref: &str, kind: MediaKind) -> LyricapResult<SharedElement>;

    /// Load and decode a still image.
    async fn load_image(&self, source_ref: &str) -> LyricapResult<ImageAsset>;

    /// Whether the recorder can produce this mime type.
    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn create_recorder(&self, config: RecorderConfig) -> LyricapResult<Box<dyn Recorder>>;

    fn scheduler(&self) -> Box<dyn FrameScheduler>;
}
