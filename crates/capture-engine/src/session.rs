//! Capture session state machine.
//!
//! An [`Exporter`] validates an export request and hands out at most one
//! [`CaptureSession`] at a time. Running the session walks
//! `Idle → Preloading → Starting → Recording → Finalizing → Completed`,
//! with `Aborted` reachable until finalization begins and `Failed` for
//! unexpected faults. Every exit path releases the recorder, the mixer,
//! and all preloaded assets.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lyricap_common::clock::WallClock;
use lyricap_common::config::CaptureDefaults;
use lyricap_common::error::{LyricapError, LyricapResult};
use lyricap_project_model::export::ExportParams;
use lyricap_project_model::project::ProjectSnapshot;
use lyricap_render_engine::compositor::Surface;
use lyricap_render_engine::export::{ArtifactNaming, ArtifactSink, FinalArtifact, Finalizer};
use lyricap_render_engine::renderer::{FrameRenderer, LyricFrameRenderer};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::assets::AssetRegistry;
use crate::backend::{FrameScheduler, MediaBackend, MediaKind, Recorder, SharedElement};
use crate::mixer::MixerGraph;
use crate::preload::{PreloadReport, Preloader};
use crate::render_loop::{
    CaptureProgress, LoopConfig, LoopExit, ProgressCallback, RecorderSink, RenderLoop,
};
use crate::stream::{self, CodecProfile};
use crate::sync::SyncStats;

/// State of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, not yet running.
    Idle,
    /// Loading assets.
    Preloading,
    /// Mixer and recorder set up; waiting for the stream to stabilize.
    Starting,
    /// Render loop running.
    Recording,
    /// Recorder stopped; building and delivering the artifact.
    Finalizing,
    Completed,
    Aborted,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed)
    }

    /// Whether an abort request can still take effect.
    pub fn can_abort(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Preloading | Self::Starting | Self::Recording
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preloading => "preloading",
            Self::Starting => "starting",
            Self::Recording => "recording",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Holds the single session slot; released on drop.
#[derive(Debug)]
struct SlotGuard {
    busy: Arc<AtomicBool>,
}

impl SlotGuard {
    fn acquire(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { busy: busy.clone() })
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// Decides once whether a session ends aborted or goes on to finalize.
///
/// Whichever of [`AbortGate::request`] and [`AbortGate::seal`] runs first
/// wins; the other then fails.
#[derive(Debug, Clone, Default)]
struct AbortGate(Arc<AtomicU8>);

impl AbortGate {
    const OPEN: u8 = 0;
    const ABORTED: u8 = 1;
    const SEALED: u8 = 2;

    fn close_as(&self, outcome: u8) -> bool {
        self.0
            .compare_exchange(Self::OPEN, outcome, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn request(&self) -> bool {
        self.close_as(Self::ABORTED)
    }

    /// Called before finalizing; `false` means an abort got in first.
    fn seal(&self) -> bool {
        self.close_as(Self::SEALED)
    }

    fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst) == Self::ABORTED
    }
}

/// Everything an export needs from the caller.
pub struct ExportRequest {
    pub snapshot: Arc<ProjectSnapshot>,
    pub params: ExportParams,
    /// Drawing surface the renderer paints and the recorder samples.
    pub surface: Option<Surface>,
    pub renderer: Box<dyn FrameRenderer>,
}

impl ExportRequest {
    /// Request with an output-sized surface and the reference renderer.
    pub fn new(snapshot: Arc<ProjectSnapshot>, params: ExportParams) -> Self {
        let (width, height) = params.output_size();
        Self {
            snapshot,
            params,
            surface: Surface::new(width, height).ok(),
            renderer: Box::new(LyricFrameRenderer::new()),
        }
    }

    pub fn with_surface(mut self, surface: Option<Surface>) -> Self {
        self.surface = surface;
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn FrameRenderer>) -> Self {
        self.renderer = renderer;
        self
    }
}

/// Starts capture sessions, one at a time.
pub struct Exporter {
    backend: Arc<dyn MediaBackend>,
    defaults: CaptureDefaults,
    sink: Arc<dyn ArtifactSink>,
    busy: Arc<AtomicBool>,
}

impl Exporter {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        defaults: CaptureDefaults,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            backend,
            defaults,
            sink,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a session currently holds the slot.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Validate `request` and create an idle session.
    ///
    /// Rejects the request without allocating anything when a session is
    /// already active, or when the project has no primary track, there is
    /// no drawing surface, no codec is supported, or the primary track's
    /// audio cannot be captured.
    pub fn begin(&self, request: ExportRequest) -> LyricapResult<CaptureSession> {
        let slot = SlotGuard::acquire(&self.busy).ok_or(LyricapError::SessionActive)?;

        let ExportRequest {
            snapshot,
            params,
            surface,
            renderer,
        } = request;

        let track = snapshot
            .primary_track
            .clone()
            .filter(|t| !t.source_ref.is_empty())
            .ok_or_else(|| LyricapError::precondition("Project has no primary track"))?;
        let surface =
            surface.ok_or_else(|| LyricapError::precondition("No drawing surface available"))?;
        let profile =
            CodecProfile::negotiate(&params, &self.defaults.codec_preferences, &*self.backend)?;

        let primary = self
            .backend
            .open_media(&track.source_ref, MediaKind::Audio)
            .map_err(|e| {
                LyricapError::precondition(format!("Primary track cannot be opened: {e}"))
            })?;
        if !primary.supports_audio_capture() {
            return Err(LyricapError::precondition(format!(
                "Primary track {} has no capturable audio output",
                track.source_ref
            )));
        }

        if let Err(e) = snapshot.timeline.validate() {
            tracing::warn!(error = %e, "Timeline is inconsistent, earliest slide wins on overlap");
        }

        let (state, _) = watch::channel(SessionState::Idle);
        tracing::info!(
            project = %snapshot.name,
            backend = self.backend.name(),
            "Capture session created"
        );

        Ok(CaptureSession {
            backend: self.backend.clone(),
            defaults: self.defaults.clone(),
            sink: self.sink.clone(),
            snapshot,
            params,
            profile,
            surface,
            renderer,
            primary,
            primary_duration_hint: track.duration_secs,
            state,
            cancel: CancellationToken::new(),
            abort_gate: AbortGate::default(),
            progress: None,
            _slot: slot,
        })
    }

    /// Begin and run a session to completion.
    pub async fn export(&self, request: ExportRequest) -> LyricapResult<ExportOutcome> {
        self.begin(request)?.run().await
    }
}

/// Counters collected over one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    /// Wall-clock start (ISO 8601).
    pub started_at: String,
    pub preload: PreloadReport,
    pub frames_rendered: u64,
    pub frames_skipped: u64,
    pub sync: SyncStats,
    pub last_playback_secs: f64,
    pub elapsed_secs: f64,
}

#[derive(Debug)]
pub enum ExportOutcome {
    Completed {
        artifact: FinalArtifact,
        location: PathBuf,
        report: SessionReport,
    },
    /// Stopped by the user. No artifact was produced.
    Aborted { report: SessionReport },
}

impl ExportOutcome {
    pub fn report(&self) -> &SessionReport {
        match self {
            Self::Completed { report, .. } | Self::Aborted { report } => report,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Requests cancellation of a running session.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    cancel: CancellationToken,
    gate: AbortGate,
    state: watch::Receiver<SessionState>,
}

impl AbortHandle {
    /// Request an abort. Returns `true` only for the call that initiated it;
    /// repeated calls and calls after finalization began are no-ops.
    pub fn abort(&self) -> bool {
        let state = *self.state.borrow();
        if !state.can_abort() {
            return false;
        }
        if !self.gate.request() {
            return false;
        }
        tracing::info!(%state, "Abort requested");
        self.cancel.cancel();
        true
    }

    pub fn is_requested(&self) -> bool {
        self.gate.is_requested()
    }
}

#[derive(Default)]
struct SessionResources {
    assets: Option<AssetRegistry>,
    mixer: Option<MixerGraph>,
    recorder: Option<Box<dyn Recorder>>,
}

impl SessionResources {
    fn release(&mut self, primary: &SharedElement) {
        if let Some(mut recorder) = self.recorder.take() {
            if recorder.is_recording() {
                recorder.discard();
                tracing::info!("Recorder stopped without finalizing");
            }
        }
        if let Some(mut mixer) = self.mixer.take() {
            mixer.teardown();
        }
        if let Some(mut assets) = self.assets.take() {
            assets.release();
        }
        primary.pause();
    }
}

/// One export run. Consumed by [`CaptureSession::run`].
pub struct CaptureSession {
    backend: Arc<dyn MediaBackend>,
    defaults: CaptureDefaults,
    sink: Arc<dyn ArtifactSink>,
    snapshot: Arc<ProjectSnapshot>,
    params: ExportParams,
    profile: CodecProfile,
    surface: Surface,
    renderer: Box<dyn FrameRenderer>,
    primary: SharedElement,
    primary_duration_hint: Option<f64>,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
    abort_gate: AbortGate,
    progress: Option<ProgressCallback>,
    _slot: SlotGuard,
}

impl CaptureSession {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            cancel: self.cancel.clone(),
            gate: self.abort_gate.clone(),
            state: self.state.subscribe(),
        }
    }

    /// The codec and bitrate this session records with.
    pub fn profile(&self) -> &CodecProfile {
        &self.profile
    }

    /// Called after every rendered frame.
    pub fn on_progress(
        mut self,
        callback: impl Fn(CaptureProgress) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Session state changed");
        }
    }

    /// Drive the session to a terminal state.
    ///
    /// Returns `Ok(Aborted)` when the user aborted, and `Err` for
    /// unexpected faults, after which the state is `Failed`. Resources are
    /// released on every path before this returns.
    pub async fn run(mut self) -> LyricapResult<ExportOutcome> {
        let clock = WallClock::start();
        let mut report = SessionReport {
            started_at: clock.epoch_wall().to_string(),
            ..SessionReport::default()
        };
        tracing::info!(
            project = %self.snapshot.name,
            mime = %self.profile.mime_type,
            bitrate = self.profile.video_bits_per_second,
            started_at = %clock.epoch_wall(),
            "Capture session started"
        );

        let mut resources = SessionResources::default();
        let result = self.drive(&mut resources, &mut report).await;
        resources.release(&self.primary);
        report.elapsed_secs = clock.elapsed_secs();

        match result {
            Ok(Some((artifact, location))) => {
                self.set_state(SessionState::Completed);
                tracing::info!(
                    file = %location.display(),
                    frames = report.frames_rendered,
                    elapsed_secs = report.elapsed_secs,
                    "Export completed"
                );
                Ok(ExportOutcome::Completed {
                    artifact,
                    location,
                    report,
                })
            }
            Ok(None) => {
                self.set_state(SessionState::Aborted);
                tracing::info!(frames = report.frames_rendered, "Export aborted");
                Ok(ExportOutcome::Aborted { report })
            }
            Err(e) => {
                self.set_state(SessionState::Failed);
                tracing::error!(error = %e, "Export failed");
                Err(e)
            }
        }
    }

    /// `Ok(None)` means aborted.
    async fn drive(
        &mut self,
        res: &mut SessionResources,
        report: &mut SessionReport,
    ) -> LyricapResult<Option<(FinalArtifact, PathBuf)>> {
        let cancel = self.cancel.clone();
        if cancel.is_cancelled() {
            return Ok(None);
        }

        self.set_state(SessionState::Preloading);
        let preloader = Preloader::from_defaults(self.backend.clone(), &self.defaults);
        let ready_timeout = self.defaults.preload_timeout();
        let primary = self.primary.clone();
        let snapshot = self.snapshot.clone();
        let loading = async move {
            let (assets, preload) = preloader.preload(&snapshot).await;
            let primary_ready = tokio::time::timeout(ready_timeout, primary.wait_ready()).await;
            (assets, preload, primary_ready)
        };
        let loaded = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            loaded = loading => Some(loaded),
        };
        let Some((assets, preload, primary_ready)) = loaded else {
            tracing::info!("Aborted while preloading");
            return Ok(None);
        };
        report.preload = preload;
        let assets = res.assets.insert(assets);
        match primary_ready {
            Ok(result) => result?,
            Err(_) => tracing::warn!("Primary track not ready before timeout, continuing"),
        }

        if cancel.is_cancelled() {
            tracing::info!("Aborted after preload");
            return Ok(None);
        }

        self.set_state(SessionState::Starting);
        let mixer = res.mixer.insert(MixerGraph::build(&self.primary, assets)?);
        let recorder = res.recorder.insert(stream::assemble(
            &*self.backend,
            &self.profile,
            &self.surface,
            self.defaults.timeslice(),
        )?);
        recorder.start()?;

        let mut scheduler = self.backend.scheduler();
        if !delay_unless_cancelled(&mut *scheduler, self.defaults.stabilize_delay(), &cancel).await
        {
            tracing::info!("Aborted while starting");
            return Ok(None);
        }
        self.primary.play()?;
        self.set_state(SessionState::Recording);

        let exit = {
            let mut render_loop = RenderLoop::new(
                self.primary.clone(),
                self.snapshot.clone(),
                assets,
                &mut *self.renderer,
                &mut self.surface,
                LoopConfig {
                    target_fps: self.profile.fps,
                    drift_tolerance_secs: self.defaults.capture_drift_tolerance_secs,
                    end_at_secs: None,
                },
            )
            .with_mixer(mixer);
            let mut sink = RecorderSink::new(&mut **recorder);
            let exit = render_loop
                .run(&mut *scheduler, &mut sink, &cancel, self.progress.as_ref())
                .await;

            let stats = render_loop.report();
            report.frames_rendered = stats.frames_rendered;
            report.frames_skipped = stats.frames_skipped;
            report.sync = stats.sync;
            report.last_playback_secs = stats.last_playback_secs;
            exit?
        };
        if exit == LoopExit::Aborted {
            return Ok(None);
        }

        if !delay_unless_cancelled(&mut *scheduler, self.defaults.tail_delay(), &cancel).await {
            tracing::info!("Aborted during tail delay");
            return Ok(None);
        }

        if cancel.is_cancelled() || !self.abort_gate.seal() {
            tracing::info!("Aborted before finalizing");
            return Ok(None);
        }
        self.set_state(SessionState::Finalizing);
        let output = recorder.stop()?;
        let duration = self.primary.duration().or(self.primary_duration_hint);
        let naming = ArtifactNaming {
            title: self.snapshot.metadata.title.clone(),
            aspect_ratio: self.params.aspect_ratio,
            resolution: self.params.resolution,
        };
        let delivered =
            Finalizer::new().finalize_and_deliver(output, duration, &naming, &*self.sink)?;
        Ok(Some(delivered))
    }
}

/// Wait `duration` on the scheduler clock. Returns `false` if cancelled.
async fn delay_unless_cancelled(
    scheduler: &mut dyn FrameScheduler,
    duration: Duration,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = scheduler.delay(duration) => !cancel.is_cancelled(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessBackend, HeadlessSource};
    use lyricap_project_model::project::PrimaryTrack;
    use lyricap_project_model::ProjectDocument;
    use lyricap_render_engine::export::MemorySink;

    fn exporter(backend: HeadlessBackend) -> Exporter {
        Exporter::new(
            Arc::new(backend),
            CaptureDefaults::default(),
            Arc::new(MemorySink::new()),
        )
    }

    fn request(with_track: bool) -> ExportRequest {
        let mut doc = ProjectDocument::new("Session");
        if with_track {
            doc.primary_track = Some(PrimaryTrack {
                source_ref: "song.mp3".to_string(),
                duration_secs: Some(1.0),
            });
        }
        ExportRequest::new(doc.snapshot(), ExportParams::default())
            .with_surface(Surface::new(16, 9).ok())
    }

    #[test]
    fn test_state_classification() {
        assert!(SessionState::Recording.can_abort());
        assert!(!SessionState::Finalizing.can_abort());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Preloading.is_terminal());
        assert_eq!(SessionState::Starting.to_string(), "starting");
    }

    #[test]
    fn test_missing_primary_track_leaves_slot_free() {
        let exporter = exporter(HeadlessBackend::virtual_time());
        let err = exporter.begin(request(false)).err().unwrap();
        assert!(err.is_precondition());
        assert!(!exporter.is_busy());
    }

    #[test]
    fn test_missing_surface_is_precondition() {
        let backend =
            HeadlessBackend::virtual_time().with_source("song.mp3", HeadlessSource::media(1.0));
        let exporter = exporter(backend);
        let err = exporter
            .begin(request(true).with_surface(None))
            .err()
            .unwrap();
        assert!(err.is_precondition());
        assert!(!exporter.is_busy());
    }

    #[test]
    fn test_uncapturable_primary_is_precondition() {
        let backend = HeadlessBackend::virtual_time().with_source(
            "song.mp3",
            HeadlessSource::media(1.0).without_audio_capture(),
        );
        let exporter = exporter(backend);
        let err = exporter.begin(request(true)).err().unwrap();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_no_supported_codec_is_precondition() {
        let backend = HeadlessBackend::virtual_time()
            .with_source("song.mp3", HeadlessSource::media(1.0))
            .with_supported_mimes(Vec::<String>::new());
        let exporter = exporter(backend);
        let err = exporter.begin(request(true)).err().unwrap();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_abort_is_idempotent_and_holds_slot() {
        let backend =
            HeadlessBackend::virtual_time().with_source("song.mp3", HeadlessSource::media(1.0));
        let exporter = exporter(backend);
        let session = exporter.begin(request(true)).unwrap();
        let handle = session.abort_handle();

        assert!(handle.abort());
        assert!(!handle.abort());
        assert!(handle.is_requested());

        let other = exporter.begin(request(true)).err().unwrap();
        assert!(matches!(other, LyricapError::SessionActive));

        drop(session);
        assert!(!exporter.is_busy());
    }

    #[test]
    fn test_abort_gate_is_decided_once() {
        let gate = AbortGate::default();
        assert!(gate.seal());
        assert!(!gate.request());
        assert!(!gate.is_requested());

        let gate = AbortGate::default();
        assert!(gate.request());
        assert!(!gate.seal());
        assert!(gate.is_requested());
    }

    #[test]
    fn test_abort_refused_once_finalizing_is_claimed() {
        let backend =
            HeadlessBackend::virtual_time().with_source("song.mp3", HeadlessSource::media(1.0));
        let exporter = exporter(backend);
        let session = exporter.begin(request(true)).unwrap();
        let handle = session.abort_handle();

        // The watch still reports an abortable state; the gate decides.
        assert!(session.abort_gate.seal());
        assert!(session.state().can_abort());
        assert!(!handle.abort());
        assert!(!handle.is_requested());
        assert!(!session.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_abort_before_run_ends_aborted() {
        let backend =
            HeadlessBackend::virtual_time().with_source("song.mp3", HeadlessSource::media(1.0));
        let exporter = exporter(backend);
        let session = exporter.begin(request(true)).unwrap();
        let mut states = session.subscribe();
        session.abort_handle().abort();

        let outcome = session.run().await.unwrap();
        assert!(!outcome.is_completed());
        assert_eq!(*states.borrow_and_update(), SessionState::Aborted);
        assert!(!exporter.is_busy());
    }
}
