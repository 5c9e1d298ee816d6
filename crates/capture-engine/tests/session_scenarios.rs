//! End-to-end capture scenarios on the headless backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lyricap_capture_engine::backend::headless::VirtualScheduler;
use lyricap_capture_engine::backend::{
    FrameScheduler, HeadlessBackend, HeadlessSource, MediaBackend, MediaElement, MediaKind,
    Recorder, RecorderConfig, SharedElement,
};
use lyricap_capture_engine::mixer::{MixSnapshot, MixerGraph, PRIMARY_LABEL};
use lyricap_capture_engine::render_loop::{FrameSink, LoopConfig, LoopExit, RenderLoop};
use lyricap_capture_engine::stream::select_codec;
use lyricap_capture_engine::{
    ExportOutcome, ExportRequest, Exporter, Preloader, SessionState,
};
use lyricap_common::config::CaptureDefaults;
use lyricap_common::error::{LyricapError, LyricapResult};
use lyricap_project_model::export::{AspectRatio, ExportParams, Quality, Resolution};
use lyricap_project_model::project::PrimaryTrack;
use lyricap_project_model::slide::{Slide, SlideKind};
use lyricap_project_model::ProjectDocument;
use lyricap_render_engine::compositor::{ImageAsset, Rgba, Surface};
use lyricap_render_engine::export::{DirectorySink, MemorySink, RecordedOutput};
use lyricap_render_engine::renderer::LyricFrameRenderer;
use lyricap_render_engine::webm;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn document(title: &str, duration: f64, slides: Vec<Slide>) -> ProjectDocument {
    let mut doc = ProjectDocument::new(title);
    doc.primary_track = Some(PrimaryTrack {
        source_ref: "song.mp3".to_string(),
        duration_secs: Some(duration),
    });
    doc.timeline.slides = slides;
    doc
}

fn params(fps: u32) -> ExportParams {
    ExportParams {
        resolution: Resolution::P480,
        aspect_ratio: AspectRatio::Landscape,
        target_fps: fps,
        quality: Quality::Medium,
        codec: None,
    }
}

/// Two back-to-back video slides over a 10 s track at 30 fps.
#[tokio::test]
async fn scenario_a_artifact_duration_matches_primary_track() {
    let backend = Arc::new(
        HeadlessBackend::virtual_time()
            .with_source("song.mp3", HeadlessSource::media(10.0))
            .with_source("a.mp4", HeadlessSource::media(5.0))
            .with_source("b.mp4", HeadlessSource::media(5.0)),
    );
    let doc = document(
        "Scenario A",
        10.0,
        vec![
            Slide::new("a", SlideKind::Video, "a.mp4", 0.0, 5.0),
            Slide::new("b", SlideKind::Video, "b.mp4", 5.0, 10.0),
        ],
    );
    let sink = Arc::new(MemorySink::new());
    let exporter = Exporter::new(backend.clone(), CaptureDefaults::default(), sink.clone());

    let request =
        ExportRequest::new(doc.snapshot(), params(30)).with_surface(Surface::new(64, 36).ok());
    let outcome = exporter.export(request).await.unwrap();

    let ExportOutcome::Completed {
        artifact, report, ..
    } = outcome
    else {
        panic!("export did not complete");
    };
    assert!(artifact.duration_repaired);
    assert_eq!(artifact.file_name, "Scenario_A_16x9_480p.webm");
    assert_eq!(sink.delivered().len(), 1);

    let summary = webm::probe(&artifact.bytes).unwrap();
    let duration = summary.duration_secs.unwrap();
    assert!((duration - 10.0).abs() < 0.034, "duration {duration}");
    assert!(
        (295..=305).contains(&summary.video_blocks),
        "video blocks {}",
        summary.video_blocks
    );
    let last = summary.last_video_secs.unwrap();
    assert!((last - 10.0).abs() < 0.1, "last video block at {last}");
    assert!(summary.clusters >= 10);

    assert_eq!(report.frames_rendered, summary.video_blocks);
    assert_eq!(report.preload.loaded.len(), 2);
    assert!(!exporter.is_busy());
}

/// Records the mix seen at each rendered frame along with the clock.
struct MixTrace {
    primary: SharedElement,
    frames: Arc<Mutex<Vec<(f64, MixSnapshot)>>>,
}

impl FrameSink for MixTrace {
    fn submit(&mut self, _surface: &Surface, mix: &MixSnapshot) -> LyricapResult<()> {
        self.frames
            .lock()
            .map_err(|_| LyricapError::capture("mix trace poisoned"))?
            .push((self.primary.current_time(), mix.clone()));
        Ok(())
    }
}

/// A half-volume audio slide over a muted video slide.
#[tokio::test]
async fn scenario_b_mix_carries_video_and_audio_at_their_gains() {
    let backend = Arc::new(
        HeadlessBackend::virtual_time()
            .with_source("song.mp3", HeadlessSource::media(10.0))
            .with_source("clip.mp4", HeadlessSource::media(10.0))
            .with_source("vox.mp3", HeadlessSource::media(2.0)),
    );
    let mut clip = Slide::new("clip", SlideKind::Video, "clip.mp4", 0.0, 10.0);
    clip.is_muted = true;
    let mut vox = Slide::new("vox", SlideKind::Audio, "vox.mp3", 2.0, 4.0);
    vox.volume = 0.5;
    let snapshot = document("Scenario B", 10.0, vec![clip, vox]).snapshot();

    let preloader = Preloader::from_defaults(backend.clone(), &CaptureDefaults::default());
    let (mut assets, _) = preloader.preload(&snapshot).await;
    let primary = backend.open_media("song.mp3", MediaKind::Audio).unwrap();
    let mixer = MixerGraph::build(&primary, &assets).unwrap();
    primary.play().unwrap();

    let frames = Arc::new(Mutex::new(Vec::new()));
    let mut trace = MixTrace {
        primary: primary.clone(),
        frames: frames.clone(),
    };
    let mut renderer = LyricFrameRenderer::new();
    let mut surface = Surface::new(32, 18).unwrap();
    let mut scheduler = backend.scheduler();
    let mut render_loop = RenderLoop::new(
        primary.clone(),
        snapshot.clone(),
        &mut assets,
        &mut renderer,
        &mut surface,
        LoopConfig {
            target_fps: 30,
            drift_tolerance_secs: 0.5,
            end_at_secs: Some(5.0),
        },
    )
    .with_mixer(&mixer);

    let exit = render_loop
        .run(&mut *scheduler, &mut trace, &CancellationToken::new(), None)
        .await
        .unwrap();
    assert_eq!(exit, LoopExit::Ended);

    let frames = frames.lock().unwrap();
    let (t, mix) = frames
        .iter()
        .min_by(|a, b| (a.0 - 3.0).abs().total_cmp(&(b.0 - 3.0).abs()))
        .unwrap();
    assert!((t - 3.0).abs() < 0.05);
    assert_eq!(mix.gain_of(PRIMARY_LABEL), Some(1.0));
    assert_eq!(mix.gain_of("slide:clip"), Some(0.0));
    assert_eq!(mix.gain_of("slide:vox"), Some(0.5));

    let (_, before) = frames.iter().find(|(t, _)| *t < 2.0).unwrap();
    assert_eq!(before.gain_of("slide:vox"), Some(0.0));
    let (_, after) = frames.iter().rev().find(|(t, _)| *t >= 4.0).unwrap();
    assert_eq!(after.gain_of("slide:vox"), Some(0.0));
}

/// An unsupported request falls back to the first supported preference.
#[test]
fn scenario_c_unsupported_codec_falls_back() {
    let supported = ["video/webm;codecs=vp8,opus", "video/webm"];
    let preferences = vec![
        "video/mp4;codecs=\"avc1.640028,mp4a.40.2\"".to_string(),
        "video/webm;codecs=vp8,opus".to_string(),
        "video/webm".to_string(),
    ];
    let chosen = select_codec(Some("video/x-matroska"), &preferences, |m| {
        supported.contains(&m)
    })
    .unwrap();
    assert_eq!(chosen, "video/webm;codecs=vp8,opus");
}

/// Abort while an asset never becomes ready.
#[tokio::test]
async fn scenario_d_abort_during_preload_produces_nothing() {
    let backend = Arc::new(
        HeadlessBackend::virtual_time()
            .with_source("song.mp3", HeadlessSource::media(10.0))
            .with_source(
                "stuck.png",
                HeadlessSource::image(ImageAsset::solid(4, 4, Rgba::WHITE)).never_ready(),
            ),
    );
    let doc = document(
        "Scenario D",
        10.0,
        vec![Slide::new("stuck", SlideKind::Image, "stuck.png", 0.0, 5.0)],
    );
    let out_dir = tempfile::tempdir().unwrap();
    let exporter = Exporter::new(
        backend.clone(),
        CaptureDefaults::default(),
        Arc::new(DirectorySink::new(out_dir.path())),
    );

    let session = exporter
        .begin(ExportRequest::new(doc.snapshot(), params(30)).with_surface(Surface::new(16, 9).ok()))
        .unwrap();
    let handle = session.abort_handle();
    let mut states = session.subscribe();
    let task = tokio::spawn(session.run());

    states
        .wait_for(|s| *s == SessionState::Preloading)
        .await
        .unwrap();
    assert!(handle.abort());
    assert!(!handle.abort());

    let outcome = task.await.unwrap().unwrap();
    assert!(matches!(outcome, ExportOutcome::Aborted { .. }));
    assert_eq!(*states.borrow(), SessionState::Aborted);
    assert_eq!(backend.recorders_created(), 0);
    assert!(std::fs::read_dir(out_dir.path()).unwrap().next().is_none());
    assert!(!exporter.is_busy());
}

#[tokio::test]
async fn abort_while_recording_skips_finalizer() {
    let backend = Arc::new(
        HeadlessBackend::virtual_time().with_source("song.mp3", HeadlessSource::media(30.0)),
    );
    let doc = document("Long", 30.0, Vec::new());
    let sink = Arc::new(MemorySink::new());
    let exporter = Exporter::new(backend.clone(), CaptureDefaults::default(), sink.clone());

    let session = exporter
        .begin(ExportRequest::new(doc.snapshot(), params(30)).with_surface(Surface::new(16, 9).ok()))
        .unwrap();
    let handle = session.abort_handle();
    let abort = handle.clone();
    let session = session.on_progress(move |p| {
        if p.playback_secs >= 1.0 {
            abort.abort();
        }
    });

    let outcome = session.run().await.unwrap();
    let ExportOutcome::Aborted { report } = outcome else {
        panic!("expected abort");
    };
    assert!(report.frames_rendered >= 30 && report.frames_rendered < 40);
    assert!(sink.delivered().is_empty());
    assert_eq!(backend.recorders_created(), 1);
    assert!(!handle.abort());
}

#[tokio::test]
async fn second_request_is_rejected_while_active() {
    let backend = Arc::new(
        HeadlessBackend::virtual_time()
            .with_source("song.mp3", HeadlessSource::media(10.0))
            .with_source("stuck.png", HeadlessSource::image(ImageAsset::solid(1, 1, Rgba::BLACK)).never_ready()),
    );
    let doc = document(
        "Busy",
        10.0,
        vec![Slide::new("stuck", SlideKind::Image, "stuck.png", 0.0, 5.0)],
    );
    let exporter = Exporter::new(
        backend.clone(),
        CaptureDefaults::default(),
        Arc::new(MemorySink::new()),
    );
    let request = || {
        ExportRequest::new(doc.snapshot(), params(30)).with_surface(Surface::new(16, 9).ok())
    };

    let session = exporter.begin(request()).unwrap();
    let handle = session.abort_handle();
    let mut states = session.subscribe();
    let task = tokio::spawn(session.run());
    states
        .wait_for(|s| *s == SessionState::Preloading)
        .await
        .unwrap();

    let rejected = exporter.begin(request()).err().unwrap();
    assert!(matches!(rejected, LyricapError::SessionActive));
    assert_eq!(*states.borrow(), SessionState::Preloading);

    handle.abort();
    task.await.unwrap().unwrap();
    assert!(exporter.begin(request()).is_ok());
}

#[tokio::test]
async fn failing_renderer_fails_session_and_releases_slot() {
    use lyricap_render_engine::renderer::{FrameInputs, FrameRenderer};

    struct Broken;
    impl FrameRenderer for Broken {
        fn render(&mut self, _surface: &mut Surface, frame: &FrameInputs<'_>) {
            if frame.playback_secs > 0.5 {
                panic!("renderer gave up");
            }
        }
    }

    let backend = Arc::new(
        HeadlessBackend::virtual_time().with_source("song.mp3", HeadlessSource::media(5.0)),
    );
    let sink = Arc::new(MemorySink::new());
    let exporter = Exporter::new(backend.clone(), CaptureDefaults::default(), sink.clone());
    let request = ExportRequest::new(document("Broken", 5.0, Vec::new()).snapshot(), params(30))
        .with_surface(Surface::new(16, 9).ok())
        .with_renderer(Box::new(Broken));

    let session = exporter.begin(request).unwrap();
    let states = session.subscribe();
    let err = session.run().await.unwrap_err();

    assert!(matches!(err, LyricapError::Render { .. }));
    assert_eq!(*states.borrow(), SessionState::Failed);
    assert!(sink.delivered().is_empty());
    assert!(!exporter.is_busy());
}

#[tokio::test]
async fn mix_stays_exclusive_every_frame() {
    let backend = Arc::new(
        HeadlessBackend::virtual_time()
            .with_source("song.mp3", HeadlessSource::media(3.0))
            .with_source("clip.mp4", HeadlessSource::media(3.0))
            .with_source("bg.mp4", HeadlessSource::media(1.0)),
    );
    let mut doc = document(
        "Exclusive",
        3.0,
        vec![Slide::new("clip", SlideKind::Video, "clip.mp4", 0.0, 3.0)],
    );
    doc.metadata.background_ref = Some("bg.mp4".to_string());
    doc.metadata.background_kind = lyricap_project_model::project::BackgroundKind::Video;
    let snapshot = doc.snapshot();

    let preloader = Preloader::from_defaults(backend.clone(), &CaptureDefaults::default());
    let (mut assets, _) = preloader.preload(&snapshot).await;
    let primary = backend.open_media("song.mp3", MediaKind::Audio).unwrap();
    let mixer = MixerGraph::build(&primary, &assets).unwrap();
    assert_eq!(mixer.edge_count(), 3);

    // A source that drifted back to the device must be caught before the
    // next frame is recorded.
    let clip = assets
        .element(&lyricap_project_model::slide::AssetKey::Slide("clip".into()))
        .unwrap()
        .clone();
    clip.set_device_output(true);
    primary.play().unwrap();

    struct ExclusiveCheck<'m> {
        mixer: &'m MixerGraph,
        frames: u64,
    }
    impl FrameSink for ExclusiveCheck<'_> {
        fn submit(&mut self, _surface: &Surface, mix: &MixSnapshot) -> LyricapResult<()> {
            assert!(self.mixer.verify_exclusive().is_empty());
            let mut labels: Vec<_> = mix.contributions.iter().map(|c| &c.source).collect();
            labels.sort();
            labels.dedup();
            assert_eq!(labels.len(), mix.contributions.len());
            self.frames += 1;
            Ok(())
        }
    }

    let mut check = ExclusiveCheck {
        mixer: &mixer,
        frames: 0,
    };
    let mut renderer = LyricFrameRenderer::new();
    let mut surface = Surface::new(16, 9).unwrap();
    let mut scheduler = VirtualScheduler::new(backend.clock().clone(), 60);
    let mut render_loop = RenderLoop::new(
        primary.clone(),
        snapshot.clone(),
        &mut assets,
        &mut renderer,
        &mut surface,
        LoopConfig {
            target_fps: 30,
            drift_tolerance_secs: 0.5,
            end_at_secs: None,
        },
    )
    .with_mixer(&mixer);
    render_loop
        .run(&mut scheduler, &mut check, &CancellationToken::new(), None)
        .await
        .unwrap();

    assert!(check.frames >= 85);
}

/// Counts how the session disposes of its recorder.
#[derive(Default)]
struct RecorderLog {
    stopped: AtomicUsize,
    discarded: AtomicUsize,
}

struct LoggedRecorder {
    inner: Box<dyn Recorder>,
    log: Arc<RecorderLog>,
}

impl Recorder for LoggedRecorder {
    fn mime_type(&self) -> &str {
        self.inner.mime_type()
    }

    fn start(&mut self) -> LyricapResult<()> {
        self.inner.start()
    }

    fn write_frame(&mut self, surface: &Surface, mix: &MixSnapshot) -> LyricapResult<()> {
        self.inner.write_frame(surface, mix)
    }

    fn stop(&mut self) -> LyricapResult<RecordedOutput> {
        self.log.stopped.fetch_add(1, Ordering::SeqCst);
        self.inner.stop()
    }

    fn discard(&mut self) {
        self.log.discarded.fetch_add(1, Ordering::SeqCst);
        self.inner.discard();
    }

    fn is_recording(&self) -> bool {
        self.inner.is_recording()
    }
}

/// Scheduler whose `held`-th delay never completes. The session waits on
/// the scheduler twice: index 0 is the stabilization wait, 1 the tail.
struct HeldScheduler {
    inner: Box<dyn FrameScheduler>,
    held: usize,
    delays: usize,
    reached: Arc<Notify>,
}

#[async_trait::async_trait]
impl FrameScheduler for HeldScheduler {
    async fn next_frame(&mut self) -> u64 {
        self.inner.next_frame().await
    }

    async fn delay(&mut self, duration: Duration) {
        let index = self.delays;
        self.delays += 1;
        if index == self.held {
            self.reached.notify_one();
            std::future::pending::<()>().await;
        }
        self.inner.delay(duration).await;
    }
}

/// Headless backend that stalls one session delay and logs its recorder.
struct StalledDelayBackend {
    inner: HeadlessBackend,
    held: usize,
    reached: Arc<Notify>,
    log: Arc<RecorderLog>,
}

impl StalledDelayBackend {
    fn new(inner: HeadlessBackend, held: usize) -> Self {
        Self {
            inner,
            held,
            reached: Arc::new(Notify::new()),
            log: Arc::new(RecorderLog::default()),
        }
    }
}

#[async_trait::async_trait]
impl MediaBackend for StalledDelayBackend {
    fn name(&self) -> &str {
        "stalled delay"
    }

    fn open_media(&self, source_ref: &str, kind: MediaKind) -> LyricapResult<SharedElement> {
        self.inner.open_media(source_ref, kind)
    }

    async fn load_image(&self, source_ref: &str) -> LyricapResult<ImageAsset> {
        self.inner.load_image(source_ref).await
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.inner.is_type_supported(mime_type)
    }

    fn create_recorder(&self, config: RecorderConfig) -> LyricapResult<Box<dyn Recorder>> {
        Ok(Box::new(LoggedRecorder {
            inner: self.inner.create_recorder(config)?,
            log: self.log.clone(),
        }))
    }

    fn scheduler(&self) -> Box<dyn FrameScheduler> {
        Box::new(HeldScheduler {
            inner: self.inner.scheduler(),
            held: self.held,
            delays: 0,
            reached: self.reached.clone(),
        })
    }
}

/// Run a 2 s export whose `held`-th delay stalls, abort it there, and
/// return the backend, the sink, and the state observed at the stall.
async fn abort_at_stalled_delay(
    held: usize,
) -> (
    Arc<StalledDelayBackend>,
    Arc<MemorySink>,
    SessionState,
    ExportOutcome,
) {
    let backend = Arc::new(StalledDelayBackend::new(
        HeadlessBackend::virtual_time().with_source("song.mp3", HeadlessSource::media(2.0)),
        held,
    ));
    let sink = Arc::new(MemorySink::new());
    let exporter = Exporter::new(backend.clone(), CaptureDefaults::default(), sink.clone());

    let session = exporter
        .begin(
            ExportRequest::new(document("Stalled", 2.0, Vec::new()).snapshot(), params(30))
                .with_surface(Surface::new(16, 9).ok()),
        )
        .unwrap();
    let handle = session.abort_handle();
    let mut states = session.subscribe();
    let task = tokio::spawn(session.run());

    backend.reached.notified().await;
    let stalled_in = *states.borrow_and_update();
    assert!(handle.abort());
    assert!(!handle.abort());

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(*states.borrow(), SessionState::Aborted);
    assert!(!exporter.is_busy());
    (backend, sink, stalled_in, outcome)
}

#[tokio::test]
async fn abort_while_starting_discards_recorder() {
    let (backend, sink, stalled_in, outcome) = abort_at_stalled_delay(0).await;

    assert_eq!(stalled_in, SessionState::Starting);
    let ExportOutcome::Aborted { report } = outcome else {
        panic!("expected abort");
    };
    assert_eq!(report.frames_rendered, 0);
    assert_eq!(backend.inner.recorders_created(), 1);
    assert_eq!(backend.log.discarded.load(Ordering::SeqCst), 1);
    assert_eq!(backend.log.stopped.load(Ordering::SeqCst), 0);
    assert!(sink.delivered().is_empty());
}

#[tokio::test]
async fn abort_during_tail_delay_skips_finalizer() {
    let (backend, sink, stalled_in, outcome) = abort_at_stalled_delay(1).await;

    assert_eq!(stalled_in, SessionState::Recording);
    let ExportOutcome::Aborted { report } = outcome else {
        panic!("expected abort");
    };
    assert!(report.frames_rendered >= 55, "frames {}", report.frames_rendered);
    assert_eq!(backend.inner.recorders_created(), 1);
    assert_eq!(backend.log.discarded.load(Ordering::SeqCst), 1);
    assert_eq!(backend.log.stopped.load(Ordering::SeqCst), 0);
    assert!(sink.delivered().is_empty());
}
