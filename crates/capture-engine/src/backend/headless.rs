//! Headless media backend.
//!
//! Simulates playable elements against a shared clock and records a real
//! WebM stream, with one video block per rendered frame (a digest of the
//! surface) and one audio block per frame (the mixer gains). The clock is
//! either virtual, advanced only by the scheduler, or wall time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lyricap_common::error::{LyricapError, LyricapResult};
use lyricap_render_engine::compositor::{ImageAsset, Rgba, Surface};
use lyricap_render_engine::export::{ContainerFamily, RecordedOutput};
use lyricap_render_engine::webm::{WebmTrackConfig, WebmWriter, AUDIO_TRACK, VIDEO_TRACK};

use super::{
    FrameScheduler, MediaBackend, MediaElement, MediaKind, Recorder, RecorderConfig,
    SharedElement,
};
use crate::mixer::MixSnapshot;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Surface pixels sampled per frame digest.
const DIGEST_SAMPLES: usize = 4096;

/// Time source shared by every headless element, recorder, and scheduler.
#[derive(Debug, Clone)]
pub struct HeadlessClock {
    inner: ClockInner,
}

#[derive(Debug, Clone)]
enum ClockInner {
    Virtual(Arc<AtomicU64>),
    Wall(Instant),
}

impl HeadlessClock {
    /// A clock that starts at zero and only moves when advanced.
    pub fn virtual_clock() -> Self {
        Self {
            inner: ClockInner::Virtual(Arc::new(AtomicU64::new(0))),
        }
    }

    /// A clock following real time from now.
    pub fn wall() -> Self {
        Self {
            inner: ClockInner::Wall(Instant::now()),
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.inner, ClockInner::Virtual(_))
    }

    pub fn now_ns(&self) -> u64 {
        match &self.inner {
            ClockInner::Virtual(ns) => ns.load(Ordering::SeqCst),
            ClockInner::Wall(epoch) => epoch.elapsed().as_nanos() as u64,
        }
    }

    /// Move a virtual clock forward. No-op on a wall clock.
    pub fn advance(&self, by: Duration) {
        if let ClockInner::Virtual(ns) = &self.inner {
            ns.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
        }
    }

    /// Move a virtual clock forward to `target_ns` (never backwards).
    pub fn advance_to(&self, target_ns: u64) {
        if let ClockInner::Virtual(ns) = &self.inner {
            ns.fetch_max(target_ns, Ordering::SeqCst);
        }
    }
}

/// How a headless element becomes ready.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyMode {
    Immediate,
    After(Duration),
    /// Never signals readiness.
    Never,
    /// Fails to load with this message.
    Fail(String),
}

/// A simulated media source registered under a source reference.
#[derive(Debug, Clone)]
pub struct HeadlessSource {
    pub duration_secs: Option<f64>,
    pub ready: ReadyMode,
    /// Playback speed relative to the clock; values other than 1.0 drift.
    pub playback_rate: f64,
    pub audio_capture: bool,
    /// Still image, or the frame a video presents.
    pub image: Option<ImageAsset>,
}

impl HeadlessSource {
    /// A playable audio/video source of the given duration.
    pub fn media(duration_secs: f64) -> Self {
        Self {
            duration_secs: Some(duration_secs),
            ready: ReadyMode::Immediate,
            playback_rate: 1.0,
            audio_capture: true,
            image: None,
        }
    }

    /// A decodable still image.
    pub fn image(image: ImageAsset) -> Self {
        Self {
            duration_secs: None,
            ready: ReadyMode::Immediate,
            playback_rate: 1.0,
            audio_capture: false,
            image: Some(image),
        }
    }

    pub fn never_ready(mut self) -> Self {
        self.ready = ReadyMode::Never;
        self
    }

    pub fn ready_after(mut self, delay: Duration) -> Self {
        self.ready = ReadyMode::After(delay);
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.ready = ReadyMode::Fail(message.into());
        self
    }

    pub fn with_rate(mut self, playback_rate: f64) -> Self {
        self.playback_rate = playback_rate;
        self
    }

    pub fn without_audio_capture(mut self) -> Self {
        self.audio_capture = false;
        self
    }

    pub fn with_frame(mut self, image: ImageAsset) -> Self {
        self.image = Some(image);
        self
    }
}

/// Deterministic color for a source reference.
pub fn synthetic_color(source_ref: &str) -> Rgba {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in source_ref.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    let [r, g, b, ..] = hash.to_le_bytes();
    Rgba([r, g, b, 255])
}

#[derive(Debug)]
struct MediaState {
    paused: bool,
    anchor_ns: u64,
    anchor_pos: f64,
    volume: f32,
    muted: bool,
    looping: bool,
    device_output: bool,
}

/// A simulated playable element.
#[derive(Debug)]
pub struct HeadlessMedia {
    source_ref: String,
    kind: MediaKind,
    source: HeadlessSource,
    frame: ImageAsset,
    clock: HeadlessClock,
    state: Mutex<MediaState>,
}

impl HeadlessMedia {
    pub fn new(
        source_ref: impl Into<String>,
        kind: MediaKind,
        source: HeadlessSource,
        clock: HeadlessClock,
    ) -> Self {
        let source_ref = source_ref.into();
        let frame = source
            .image
            .clone()
            .unwrap_or_else(|| ImageAsset::solid(16, 9, synthetic_color(&source_ref)));
        Self {
            source_ref,
            kind,
            source,
            frame,
            clock,
            state: Mutex::new(MediaState {
                paused: true,
                anchor_ns: 0,
                anchor_pos: 0.0,
                volume: 1.0,
                muted: false,
                looping: false,
                device_output: true,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MediaState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn position(&self, state: &MediaState, now_ns: u64) -> f64 {
        let mut pos = state.anchor_pos;
        if !state.paused {
            let elapsed = now_ns.saturating_sub(state.anchor_ns) as f64 / NANOS_PER_SEC as f64;
            pos += elapsed * self.source.playback_rate;
        }
        match self.source.duration_secs {
            Some(d) if d > 0.0 && state.looping => pos % d,
            Some(d) => pos.min(d),
            None => pos,
        }
    }

    fn reanchor(&self, state: &mut MediaState) {
        let now = self.clock.now_ns();
        state.anchor_pos = self.position(state, now);
        state.anchor_ns = now;
    }
}

#[async_trait::async_trait]
impl MediaElement for HeadlessMedia {
    fn source_ref(&self) -> &str {
        &self.source_ref
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn duration(&self) -> Option<f64> {
        self.source.duration_secs
    }

    fn current_time(&self) -> f64 {
        let state = self.lock();
        self.position(&state, self.clock.now_ns())
    }

    fn seek(&self, secs: f64) {
        let mut state = self.lock();
        let upper = self.source.duration_secs.unwrap_or(f64::MAX);
        state.anchor_pos = secs.clamp(0.0, upper.max(0.0));
        state.anchor_ns = self.clock.now_ns();
    }

    fn play(&self) -> LyricapResult<()> {
        if let ReadyMode::Fail(message) = &self.source.ready {
            return Err(LyricapError::capture(format!(
                "Cannot play {}: {message}",
                self.source_ref
            )));
        }
        let mut state = self.lock();
        if !state.paused {
            return Ok(());
        }
        let now = self.clock.now_ns();
        let at_end = !state.looping
            && self
                .source
                .duration_secs
                .is_some_and(|d| self.position(&state, now) >= d);
        if at_end {
            state.anchor_pos = 0.0;
        }
        state.anchor_ns = now;
        state.paused = false;
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.lock();
        if !state.paused {
            self.reanchor(&mut state);
            state.paused = true;
        }
    }

    fn is_paused(&self) -> bool {
        self.lock().paused
    }

    fn ended(&self) -> bool {
        let state = self.lock();
        if state.looping {
            return false;
        }
        match self.source.duration_secs {
            Some(d) => self.position(&state, self.clock.now_ns()) >= d,
            None => false,
        }
    }

    fn volume(&self) -> f32 {
        self.lock().volume
    }

    fn set_volume(&self, volume: f32) {
        self.lock().volume = volume.clamp(0.0, 1.0);
    }

    fn is_muted(&self) -> bool {
        self.lock().muted
    }

    fn set_muted(&self, muted: bool) {
        self.lock().muted = muted;
    }

    fn set_looping(&self, looping: bool) {
        let mut state = self.lock();
        if state.looping != looping {
            self.reanchor(&mut state);
            state.looping = looping;
        }
    }

    fn device_output(&self) -> bool {
        self.lock().device_output
    }

    fn set_device_output(&self, enabled: bool) {
        self.lock().device_output = enabled;
    }

    fn supports_audio_capture(&self) -> bool {
        self.source.audio_capture
    }

    async fn wait_ready(&self) -> LyricapResult<()> {
        match &self.source.ready {
            ReadyMode::Immediate => Ok(()),
            ReadyMode::After(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            ReadyMode::Never => std::future::pending().await,
            ReadyMode::Fail(message) => Err(LyricapError::preload(format!(
                "{}: {message}",
                self.source_ref
            ))),
        }
    }

    fn current_frame(&self) -> Option<ImageAsset> {
        match self.kind {
            MediaKind::Video => Some(self.frame.clone()),
            MediaKind::Audio => None,
        }
    }
}

/// Records the capture stream as WebM: one cluster per timeslice.
pub struct HeadlessRecorder {
    config: RecorderConfig,
    clock: HeadlessClock,
    writer: WebmWriter,
    output: RecordedOutput,
    started_ns: Option<u64>,
    last_chunk_ns: u64,
    frames: u64,
    recording: bool,
}

impl HeadlessRecorder {
    pub fn new(config: RecorderConfig, clock: HeadlessClock) -> Self {
        let tracks = WebmTrackConfig::for_mime(&config.mime_type, config.width, config.height);
        Self {
            writer: WebmWriter::new(tracks),
            output: RecordedOutput::new(config.mime_type.clone()),
            config,
            clock,
            started_ns: None,
            last_chunk_ns: 0,
            frames: 0,
            recording: false,
        }
    }

    /// Frames written so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn emit(&mut self, chunk: Option<Vec<u8>>) {
        if let Some(chunk) = chunk {
            self.output.push(chunk);
        }
    }
}

impl Recorder for HeadlessRecorder {
    fn mime_type(&self) -> &str {
        &self.config.mime_type
    }

    fn start(&mut self) -> LyricapResult<()> {
        if self.started_ns.is_some() {
            return Err(LyricapError::capture("Recorder already started"));
        }
        let now = self.clock.now_ns();
        self.started_ns = Some(now);
        self.last_chunk_ns = now;
        self.recording = true;
        tracing::debug!(
            mime = %self.config.mime_type,
            bitrate = self.config.video_bits_per_second,
            "Headless recorder started"
        );
        Ok(())
    }

    fn write_frame(&mut self, surface: &Surface, mix: &MixSnapshot) -> LyricapResult<()> {
        let Some(started) = self.started_ns.filter(|_| self.recording) else {
            return Err(LyricapError::capture("Recorder is not recording"));
        };
        let now = self.clock.now_ns();
        let timestamp_ms = now.saturating_sub(started) / 1_000_000;

        let pixels = (surface.width() as usize) * (surface.height() as usize);
        let digest = surface.digest(pixels / DIGEST_SAMPLES);
        let keyframe = self.frames % self.config.fps.max(1) as u64 == 0;
        let rolled = self
            .writer
            .push_block(VIDEO_TRACK, timestamp_ms, keyframe, &digest.to_be_bytes());
        self.emit(rolled);

        let mut audio = Vec::with_capacity(4 + mix.contributions.len() * 4);
        audio.extend_from_slice(&mix.output_level().to_le_bytes());
        for contribution in &mix.contributions {
            audio.extend_from_slice(&contribution.gain.to_le_bytes());
        }
        let rolled = self
            .writer
            .push_block(AUDIO_TRACK, timestamp_ms, true, &audio);
        self.emit(rolled);

        self.frames += 1;

        let timeslice_ns = self.config.timeslice.as_nanos() as u64;
        if now.saturating_sub(self.last_chunk_ns) >= timeslice_ns {
            let chunk = self.writer.flush();
            self.emit(chunk);
            self.last_chunk_ns = now;
        }
        Ok(())
    }

    fn stop(&mut self) -> LyricapResult<RecordedOutput> {
        if !self.recording {
            return Err(LyricapError::capture("Recorder is not recording"));
        }
        self.recording = false;
        let chunk = self.writer.flush();
        self.emit(chunk);
        let output = std::mem::replace(
            &mut self.output,
            RecordedOutput::new(self.config.mime_type.clone()),
        );
        tracing::debug!(
            frames = self.frames,
            chunks = output.chunks.len(),
            bytes = output.total_bytes(),
            "Headless recorder stopped"
        );
        Ok(output)
    }

    fn discard(&mut self) {
        self.recording = false;
        self.output = RecordedOutput::new(self.config.mime_type.clone());
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}

/// Refresh timestamp on a `hz` grid for tick index `k`.
fn grid_ns(k: u64, hz: u32) -> u64 {
    (k as u128 * NANOS_PER_SEC as u128 / hz.max(1) as u128) as u64
}

/// Drives a virtual clock one display refresh per frame.
pub struct VirtualScheduler {
    clock: HeadlessClock,
    refresh_hz: u32,
}

impl VirtualScheduler {
    pub fn new(clock: HeadlessClock, refresh_hz: u32) -> Self {
        Self {
            clock,
            refresh_hz: refresh_hz.max(1),
        }
    }
}

#[async_trait::async_trait]
impl FrameScheduler for VirtualScheduler {
    async fn next_frame(&mut self) -> u64 {
        let now = self.clock.now_ns();
        let mut k = (now as u128 * self.refresh_hz as u128 / NANOS_PER_SEC as u128) as u64 + 1;
        if grid_ns(k, self.refresh_hz) <= now {
            k += 1;
        }
        let ts = grid_ns(k, self.refresh_hz);
        self.clock.advance_to(ts);
        tokio::task::yield_now().await;
        ts
    }

    async fn delay(&mut self, duration: Duration) {
        self.clock.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Fires on a real-time interval; timestamps snap to the refresh grid.
pub struct IntervalScheduler {
    clock: HeadlessClock,
    refresh_hz: u32,
    interval: Option<tokio::time::Interval>,
}

impl IntervalScheduler {
    pub fn new(clock: HeadlessClock, refresh_hz: u32) -> Self {
        Self {
            clock,
            refresh_hz: refresh_hz.max(1),
            interval: None,
        }
    }
}

#[async_trait::async_trait]
impl FrameScheduler for IntervalScheduler {
    async fn next_frame(&mut self) -> u64 {
        let hz = self.refresh_hz;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval =
                tokio::time::interval(Duration::from_nanos(NANOS_PER_SEC / hz as u64));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval
        });
        interval.tick().await;
        let now = self.clock.now_ns();
        let k = ((now as f64 * hz as f64) / NANOS_PER_SEC as f64).round() as u64;
        grid_ns(k, hz)
    }

    async fn delay(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Simulated host: registered sources, WebM-only recorder.
#[derive(Debug)]
pub struct HeadlessBackend {
    clock: HeadlessClock,
    refresh_hz: u32,
    sources: HashMap<String, HeadlessSource>,
    supported_mimes: Vec<String>,
    recorders_created: Arc<AtomicUsize>,
}

impl HeadlessBackend {
    pub fn new(clock: HeadlessClock) -> Self {
        Self {
            clock,
            refresh_hz: 60,
            sources: HashMap::new(),
            supported_mimes: vec![
                "video/webm;codecs=vp9,opus".to_string(),
                "video/webm;codecs=vp8,opus".to_string(),
                "video/webm".to_string(),
            ],
            recorders_created: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Backend on a fresh virtual clock.
    pub fn virtual_time() -> Self {
        Self::new(HeadlessClock::virtual_clock())
    }

    pub fn with_refresh_hz(mut self, refresh_hz: u32) -> Self {
        self.refresh_hz = refresh_hz.max(1);
        self
    }

    /// Restrict recorder support. Only WebM mime types can be recorded.
    pub fn with_supported_mimes<I, S>(mut self, mimes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_mimes = mimes
            .into_iter()
            .map(Into::into)
            .filter(|mime| {
                let webm = ContainerFamily::from_mime(mime) == ContainerFamily::WebM;
                if !webm {
                    tracing::warn!(mime = %mime, "Headless recorder only writes WebM, ignoring");
                }
                webm
            })
            .collect();
        self
    }

    pub fn with_source(mut self, source_ref: impl Into<String>, source: HeadlessSource) -> Self {
        self.register(source_ref, source);
        self
    }

    pub fn register(&mut self, source_ref: impl Into<String>, source: HeadlessSource) {
        self.sources.insert(source_ref.into(), source);
    }

    pub fn clock(&self) -> &HeadlessClock {
        &self.clock
    }

    /// Recorders handed out so far.
    pub fn recorders_created(&self) -> usize {
        self.recorders_created.load(Ordering::SeqCst)
    }

    fn source(&self, source_ref: &str) -> LyricapResult<&HeadlessSource> {
        self.sources
            .get(source_ref)
            .ok_or_else(|| LyricapError::FileNotFound {
                path: source_ref.into(),
            })
    }
}

#[async_trait::async_trait]
impl MediaBackend for HeadlessBackend {
    fn name(&self) -> &str {
        if self.clock.is_virtual() {
            "headless (virtual clock)"
        } else {
            "headless (wall clock)"
        }
    }

    fn open_media(&self, source_ref: &str, kind: MediaKind) -> LyricapResult<SharedElement> {
        let source = self.source(source_ref)?;
        if source.duration_secs.is_none() && source.image.is_some() {
            return Err(LyricapError::preload(format!(
                "{source_ref} is a still image, not playable media"
            )));
        }
        Ok(Arc::new(HeadlessMedia::new(
            source_ref,
            kind,
            source.clone(),
            self.clock.clone(),
        )))
    }

    async fn load_image(&self, source_ref: &str) -> LyricapResult<ImageAsset> {
        let source = self.source(source_ref)?;
        match &source.ready {
            ReadyMode::Immediate => {}
            ReadyMode::After(delay) => tokio::time::sleep(*delay).await,
            ReadyMode::Never => std::future::pending::<()>().await,
            ReadyMode::Fail(message) => {
                return Err(LyricapError::preload(format!("{source_ref}: {message}")))
            }
        }
        source
            .image
            .clone()
            .ok_or_else(|| LyricapError::preload(format!("{source_ref} is not an image")))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported_mimes
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mime_type.trim()))
    }

    fn create_recorder(&self, config: RecorderConfig) -> LyricapResult<Box<dyn Recorder>> {
        if !self.is_type_supported(&config.mime_type) {
            return Err(LyricapError::unsupported(format!(
                "Headless recorder cannot produce {}",
                config.mime_type
            )));
        }
        self.recorders_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(HeadlessRecorder::new(config, self.clock.clone())))
    }

    fn scheduler(&self) -> Box<dyn FrameScheduler> {
        if self.clock.is_virtual() {
            Box::new(VirtualScheduler::new(self.clock.clone(), self.refresh_hz))
        } else {
            Box::new(IntervalScheduler::new(self.clock.clone(), self.refresh_hz))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyricap_render_engine::webm;

    fn media(duration: f64) -> (HeadlessClock, HeadlessMedia) {
        let clock = HeadlessClock::virtual_clock();
        let element = HeadlessMedia::new(
            "song.mp3",
            MediaKind::Audio,
            HeadlessSource::media(duration),
            clock.clone(),
        );
        (clock, element)
    }

    #[test]
    fn test_position_follows_virtual_clock() {
        let (clock, element) = media(10.0);
        assert_eq!(element.current_time(), 0.0);

        element.play().unwrap();
        clock.advance(Duration::from_millis(1500));
        assert!((element.current_time() - 1.5).abs() < 1e-9);

        element.pause();
        clock.advance(Duration::from_secs(3));
        assert!((element.current_time() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_ends_at_duration_unless_looping() {
        let (clock, element) = media(2.0);
        element.play().unwrap();
        clock.advance(Duration::from_millis(2500));
        assert!(element.ended());
        assert_eq!(element.current_time(), 2.0);

        let (clock, looped) = media(2.0);
        looped.set_looping(true);
        looped.play().unwrap();
        clock.advance(Duration::from_millis(2500));
        assert!(!looped.ended());
        assert!((looped.current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_playback_rate_drifts() {
        let clock = HeadlessClock::virtual_clock();
        let element = HeadlessMedia::new(
            "clip.mp4",
            MediaKind::Video,
            HeadlessSource::media(30.0).with_rate(1.5),
            clock.clone(),
        );
        element.play().unwrap();
        clock.advance(Duration::from_secs(2));
        assert!((element.current_time() - 3.0).abs() < 1e-9);
        assert!(element.current_frame().is_some());
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let (_, element) = media(4.0);
        element.seek(9.0);
        assert_eq!(element.current_time(), 4.0);
        element.seek(-1.0);
        assert_eq!(element.current_time(), 0.0);
    }

    #[tokio::test]
    async fn test_virtual_scheduler_snaps_to_refresh_grid() {
        let clock = HeadlessClock::virtual_clock();
        let mut scheduler = VirtualScheduler::new(clock.clone(), 60);

        assert_eq!(scheduler.next_frame().await, 16_666_666);
        assert_eq!(scheduler.next_frame().await, 33_333_333);

        scheduler.delay(Duration::from_millis(50)).await;
        assert_eq!(clock.now_ns(), 83_333_333);
        assert_eq!(scheduler.next_frame().await, 100_000_000);
    }

    #[tokio::test]
    async fn test_never_ready_image_times_out() {
        let backend = HeadlessBackend::virtual_time().with_source(
            "cover.png",
            HeadlessSource::image(ImageAsset::solid(2, 2, Rgba::WHITE)).never_ready(),
        );
        let result =
            tokio::time::timeout(Duration::from_millis(20), backend.load_image("cover.png")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_source_is_not_found() {
        let backend = HeadlessBackend::virtual_time();
        let err = backend
            .open_media("missing.mp4", MediaKind::Video)
            .err()
            .unwrap();
        assert!(matches!(err, LyricapError::FileNotFound { .. }));
    }

    #[test]
    fn test_only_webm_can_be_supported() {
        let backend = HeadlessBackend::virtual_time()
            .with_supported_mimes(["video/mp4", "video/webm;codecs=vp8,opus"]);
        assert!(!backend.is_type_supported("video/mp4"));
        assert!(backend.is_type_supported("video/webm;codecs=vp8,opus"));
    }

    #[test]
    fn test_recorder_emits_one_chunk_per_timeslice() {
        let backend = HeadlessBackend::virtual_time();
        let clock = backend.clock().clone();
        let mut recorder = backend
            .create_recorder(RecorderConfig {
                mime_type: "video/webm;codecs=vp9,opus".to_string(),
                video_bits_per_second: 8_000_000,
                width: 8,
                height: 8,
                fps: 10,
                timeslice: Duration::from_secs(1),
            })
            .unwrap();
        assert_eq!(backend.recorders_created(), 1);

        let surface = Surface::new(8, 8).unwrap();
        let mix = MixSnapshot::default();
        assert!(recorder.write_frame(&surface, &mix).is_err());

        recorder.start().unwrap();
        for _ in 0..25 {
            clock.advance(Duration::from_millis(100));
            recorder.write_frame(&surface, &mix).unwrap();
        }
        let output = recorder.stop().unwrap();
        assert!(!recorder.is_recording());
        assert_eq!(output.chunks.len(), 3);

        let bytes: Vec<u8> = output.chunks.concat();
        let summary = webm::probe(&bytes).unwrap();
        assert_eq!(summary.video_blocks, 25);
        assert_eq!(summary.audio_blocks, 25);
        assert_eq!(summary.duration_secs, None);
    }
}
