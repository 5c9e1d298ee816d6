//! The throttled per-frame render loop.
//!
//! Each tick reads `t` from the primary track, applies every layer sync
//! rule, re-asserts mix exclusivity, paints the surface through the frame
//! renderer, and hands the result to a [`FrameSink`]. All corrections for a
//! tick happen before painting.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use lyricap_common::clock::FrameThrottle;
use lyricap_common::error::{LyricapError, LyricapResult};
use lyricap_project_model::project::ProjectSnapshot;
use lyricap_render_engine::compositor::Surface;
use lyricap_render_engine::renderer::{FrameInputs, FrameRenderer};
use tokio_util::sync::CancellationToken;

use crate::assets::AssetRegistry;
use crate::backend::{FrameScheduler, Recorder, SharedElement};
use crate::mixer::{MixSnapshot, MixerGraph};
use crate::session::SessionState;
use crate::sync::{sync_layers, SyncStats};

/// Progress published after every rendered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureProgress {
    /// `playback_secs / duration_secs`, in `[0, 1]`.
    pub progress: f64,
    pub playback_secs: f64,
    pub duration_secs: Option<f64>,
    pub frames_rendered: u64,
    pub frames_skipped: u64,
    pub state: SessionState,
}

pub type ProgressCallback = Arc<dyn Fn(CaptureProgress) + Send + Sync>;

/// Receives each painted frame together with the mix at that instant.
pub trait FrameSink: Send {
    fn submit(&mut self, surface: &Surface, mix: &MixSnapshot) -> LyricapResult<()>;
}

/// Feeds frames to a recorder.
pub struct RecorderSink<'a> {
    recorder: &'a mut dyn Recorder,
}

impl<'a> RecorderSink<'a> {
    pub fn new(recorder: &'a mut dyn Recorder) -> Self {
        Self { recorder }
    }
}

impl FrameSink for RecorderSink<'_> {
    fn submit(&mut self, surface: &Surface, mix: &MixSnapshot) -> LyricapResult<()> {
        self.recorder.write_frame(surface, mix)
    }
}

/// Discards frames, keeping a digest of the most recent one.
#[derive(Debug, Default)]
pub struct PreviewSink {
    frames: u64,
    last_digest: Option<u64>,
    last_mix: MixSnapshot,
}

impl PreviewSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_digest(&self) -> Option<u64> {
        self.last_digest
    }

    pub fn last_mix(&self) -> &MixSnapshot {
        &self.last_mix
    }
}

impl FrameSink for PreviewSink {
    fn submit(&mut self, surface: &Surface, mix: &MixSnapshot) -> LyricapResult<()> {
        self.frames += 1;
        self.last_digest = Some(surface.digest(64));
        self.last_mix = mix.clone();
        Ok(())
    }
}

/// Result of a single scheduler callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Rendered,
    Throttled,
    /// The primary track ended; nothing was done.
    Ended,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Ended,
    Aborted,
}

/// Loop tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopConfig {
    pub target_fps: u32,
    /// Drift allowed before a corrective seek.
    pub drift_tolerance_secs: f64,
    /// Stop once the primary track reaches this position.
    pub end_at_secs: Option<f64>,
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopReport {
    pub frames_rendered: u64,
    pub frames_skipped: u64,
    pub sync: SyncStats,
    pub last_playback_secs: f64,
}

pub struct RenderLoop<'a> {
    primary: SharedElement,
    snapshot: Arc<ProjectSnapshot>,
    assets: &'a mut AssetRegistry,
    mixer: Option<&'a MixerGraph>,
    renderer: &'a mut dyn FrameRenderer,
    surface: &'a mut Surface,
    throttle: FrameThrottle,
    config: LoopConfig,
    stats: SyncStats,
    last_t: f64,
}

impl<'a> RenderLoop<'a> {
    pub fn new(
        primary: SharedElement,
        snapshot: Arc<ProjectSnapshot>,
        assets: &'a mut AssetRegistry,
        renderer: &'a mut dyn FrameRenderer,
        surface: &'a mut Surface,
        config: LoopConfig,
    ) -> Self {
        Self {
            primary,
            snapshot,
            assets,
            mixer: None,
            renderer,
            surface,
            throttle: FrameThrottle::new(config.target_fps),
            config,
            stats: SyncStats::default(),
            last_t: 0.0,
        }
    }

    /// Route frame mixes through `mixer` and police its exclusivity.
    pub fn with_mixer(mut self, mixer: &'a MixerGraph) -> Self {
        self.mixer = Some(mixer);
        self
    }

    /// Whether the loop has nothing left to do.
    pub fn is_finished(&self) -> bool {
        if self.primary.ended() {
            return true;
        }
        self.config
            .end_at_secs
            .is_some_and(|end| self.primary.current_time() >= end)
    }

    /// Handle one scheduler callback at `now_ns`.
    pub fn tick(&mut self, now_ns: u64, sink: &mut dyn FrameSink) -> LyricapResult<TickOutcome> {
        if self.is_finished() {
            return Ok(TickOutcome::Ended);
        }
        if !self.throttle.should_render(now_ns) {
            return Ok(TickOutcome::Throttled);
        }

        let t = self.primary.current_time();
        sync_layers(
            t,
            &self.snapshot,
            self.assets,
            self.config.drift_tolerance_secs,
            &mut self.stats,
        )?;
        if let Some(mixer) = self.mixer {
            mixer.enforce_exclusive();
        }
        self.assets.refresh_video_frames();
        self.paint(t)?;

        let mix = self.mixer.map(MixerGraph::snapshot).unwrap_or_default();
        sink.submit(self.surface, &mix)?;
        self.last_t = t;
        Ok(TickOutcome::Rendered)
    }

    fn paint(&mut self, t: f64) -> LyricapResult<()> {
        let renderer = &mut *self.renderer;
        let surface = &mut *self.surface;
        let assets: &AssetRegistry = self.assets;
        let snapshot = &*self.snapshot;

        panic::catch_unwind(AssertUnwindSafe(|| {
            let inputs = FrameInputs::from_snapshot(surface, t, snapshot, assets);
            renderer.render(surface, &inputs);
        }))
        .map_err(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(playback_secs = t, panic = %message, "Frame renderer panicked");
            LyricapError::render(format!("Frame renderer panicked at {t:.3}s: {message}"))
        })
    }

    /// Tick until the primary track ends or `cancel` fires.
    ///
    /// Cancellation is observed at the top of each tick, so the tick in
    /// progress always completes.
    pub async fn run(
        &mut self,
        scheduler: &mut dyn FrameScheduler,
        sink: &mut dyn FrameSink,
        cancel: &CancellationToken,
        progress: Option<&ProgressCallback>,
    ) -> LyricapResult<LoopExit> {
        loop {
            let now_ns = scheduler.next_frame().await;
            if cancel.is_cancelled() {
                tracing::info!(playback_secs = self.last_t, "Render loop cancelled");
                return Ok(LoopExit::Aborted);
            }
            match self.tick(now_ns, sink)? {
                TickOutcome::Ended => {
                    tracing::info!(
                        frames = self.throttle.frames_rendered(),
                        skipped = self.throttle.frames_skipped(),
                        "Primary track ended"
                    );
                    return Ok(LoopExit::Ended);
                }
                TickOutcome::Rendered => {
                    if let Some(callback) = progress {
                        callback(self.progress());
                    }
                }
                TickOutcome::Throttled => {}
            }
        }
    }

    pub fn progress(&self) -> CaptureProgress {
        let duration_secs = self.primary.duration().or_else(|| {
            self.snapshot
                .primary_track
                .as_ref()
                .and_then(|track| track.duration_secs)
        });
        let progress = duration_secs
            .filter(|d| *d > 0.0)
            .map(|d| (self.last_t / d).clamp(0.0, 1.0))
            .unwrap_or(0.0);
        CaptureProgress {
            progress,
            playback_secs: self.last_t,
            duration_secs,
            frames_rendered: self.throttle.frames_rendered(),
            frames_skipped: self.throttle.frames_skipped(),
            state: SessionState::Recording,
        }
    }

    pub fn report(&self) -> LoopReport {
        LoopReport {
            frames_rendered: self.throttle.frames_rendered(),
            frames_skipped: self.throttle.frames_skipped(),
            sync: self.stats,
            last_playback_secs: self.last_t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{HeadlessMedia, VirtualScheduler};
    use crate::backend::{HeadlessClock, HeadlessSource, MediaElement, MediaKind};
    use lyricap_project_model::ProjectDocument;
    use lyricap_render_engine::renderer::LyricFrameRenderer;
    use std::time::Duration;

    fn primary(clock: &HeadlessClock, duration: f64) -> SharedElement {
        Arc::new(HeadlessMedia::new(
            "song.mp3",
            MediaKind::Audio,
            HeadlessSource::media(duration),
            clock.clone(),
        ))
    }

    fn config(fps: u32) -> LoopConfig {
        LoopConfig {
            target_fps: fps,
            drift_tolerance_secs: 0.5,
            end_at_secs: None,
        }
    }

    struct Panicking;

    impl FrameRenderer for Panicking {
        fn render(&mut self, _surface: &mut Surface, _frame: &FrameInputs<'_>) {
            panic!("bad glyph");
        }
    }

    #[tokio::test]
    async fn test_runs_at_target_fps_until_primary_ends() {
        let clock = HeadlessClock::virtual_clock();
        let song = primary(&clock, 2.0);
        song.play().unwrap();

        let snapshot = ProjectDocument::new("Loop").snapshot();
        let mut assets = AssetRegistry::new();
        let mut renderer = LyricFrameRenderer::new();
        let mut surface = Surface::new(16, 16).unwrap();
        let mut render_loop = RenderLoop::new(
            song,
            snapshot,
            &mut assets,
            &mut renderer,
            &mut surface,
            config(30),
        );
        let mut scheduler = VirtualScheduler::new(clock.clone(), 60);
        let mut sink = PreviewSink::new();

        let exit = render_loop
            .run(&mut scheduler, &mut sink, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(exit, LoopExit::Ended);
        let report = render_loop.report();
        assert_eq!(report.frames_rendered, 60);
        assert_eq!(report.frames_skipped, 59);
        assert_eq!(sink.frames(), 60);
        assert!(report.last_playback_secs > 1.9);
    }

    #[tokio::test]
    async fn test_cancel_stops_at_top_of_tick() {
        let clock = HeadlessClock::virtual_clock();
        let song = primary(&clock, 60.0);
        song.play().unwrap();

        let snapshot = ProjectDocument::new("Loop").snapshot();
        let mut assets = AssetRegistry::new();
        let mut renderer = LyricFrameRenderer::new();
        let mut surface = Surface::new(8, 8).unwrap();
        let mut render_loop = RenderLoop::new(
            song,
            snapshot,
            &mut assets,
            &mut renderer,
            &mut surface,
            config(30),
        );
        let mut scheduler = VirtualScheduler::new(clock.clone(), 60);
        let mut sink = PreviewSink::new();
        let cancel = CancellationToken::new();

        let seen = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let counter = seen.clone();
        let token = cancel.clone();
        let callback: ProgressCallback = Arc::new(move |p: CaptureProgress| {
            counter.store(p.frames_rendered, std::sync::atomic::Ordering::SeqCst);
            if p.frames_rendered == 10 {
                token.cancel();
            }
        });

        let exit = render_loop
            .run(&mut scheduler, &mut sink, &cancel, Some(&callback))
            .await
            .unwrap();
        assert_eq!(exit, LoopExit::Aborted);
        assert_eq!(sink.frames(), 10);
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 10);
    }

    #[test]
    fn test_renderer_panic_becomes_render_error() {
        let clock = HeadlessClock::virtual_clock();
        let song = primary(&clock, 5.0);
        song.play().unwrap();

        let snapshot = ProjectDocument::new("Loop").snapshot();
        let mut assets = AssetRegistry::new();
        let mut renderer = Panicking;
        let mut surface = Surface::new(8, 8).unwrap();
        let mut render_loop = RenderLoop::new(
            song,
            snapshot,
            &mut assets,
            &mut renderer,
            &mut surface,
            config(30),
        );

        let err = render_loop.tick(0, &mut PreviewSink::new()).unwrap_err();
        assert!(matches!(err, LyricapError::Render { .. }));
    }

    #[test]
    fn test_end_at_stops_early() {
        let clock = HeadlessClock::virtual_clock();
        let song = primary(&clock, 10.0);
        song.play().unwrap();

        let snapshot = ProjectDocument::new("Loop").snapshot();
        let mut assets = AssetRegistry::new();
        let mut renderer = LyricFrameRenderer::new();
        let mut surface = Surface::new(8, 8).unwrap();
        let mut render_loop = RenderLoop::new(
            song,
            snapshot,
            &mut assets,
            &mut renderer,
            &mut surface,
            LoopConfig {
                end_at_secs: Some(1.0),
                ..config(30)
            },
        );
        let mut sink = PreviewSink::new();

        assert_eq!(render_loop.tick(0, &mut sink).unwrap(), TickOutcome::Rendered);
        clock.advance(Duration::from_secs(1));
        assert_eq!(
            render_loop.tick(1_000_000_000, &mut sink).unwrap(),
            TickOutcome::Ended
        );
    }
}
