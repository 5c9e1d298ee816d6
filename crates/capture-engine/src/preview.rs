//! Preview playback: the render loop without a recorder or mixer.

use std::sync::Arc;

use lyricap_common::config::CaptureDefaults;
use lyricap_common::error::{LyricapError, LyricapResult};
use lyricap_project_model::project::ProjectSnapshot;
use lyricap_render_engine::compositor::Surface;
use lyricap_render_engine::renderer::FrameRenderer;
use tokio_util::sync::CancellationToken;

use crate::backend::{MediaBackend, MediaKind};
use crate::preload::{PreloadReport, Preloader};
use crate::render_loop::{LoopConfig, LoopExit, PreviewSink, RenderLoop};

/// Playback window and rate for a preview run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewOptions {
    pub from_secs: f64,
    pub to_secs: Option<f64>,
    pub fps: u32,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            from_secs: 0.0,
            to_secs: None,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewReport {
    pub exit: LoopExit,
    pub preload: PreloadReport,
    pub start_secs: f64,
    pub end_secs: f64,
    pub frames_rendered: u64,
    pub frames_skipped: u64,
    pub corrective_seeks: u64,
    pub loop_wraps: u64,
    pub last_frame_digest: Option<u64>,
}

/// Play `snapshot` from `options.from_secs` with the preview drift
/// tolerance. Sources keep their device output; nothing is recorded.
pub async fn run_preview(
    backend: Arc<dyn MediaBackend>,
    defaults: &CaptureDefaults,
    snapshot: Arc<ProjectSnapshot>,
    renderer: &mut dyn FrameRenderer,
    surface: &mut Surface,
    options: PreviewOptions,
    cancel: &CancellationToken,
) -> LyricapResult<PreviewReport> {
    let track = snapshot
        .primary_track
        .as_ref()
        .filter(|t| !t.source_ref.is_empty())
        .ok_or_else(|| LyricapError::precondition("Project has no primary track"))?;

    let preloader = Preloader::from_defaults(backend.clone(), defaults);
    let (mut assets, preload) = preloader.preload(&snapshot).await;

    let primary = backend.open_media(&track.source_ref, MediaKind::Audio)?;
    match tokio::time::timeout(defaults.preload_timeout(), primary.wait_ready()).await {
        Ok(result) => result?,
        Err(_) => tracing::warn!(source = %track.source_ref, "Primary track not ready, playing anyway"),
    }

    let start_secs = options.from_secs.max(0.0);
    primary.seek(start_secs);
    primary.play()?;
    tracing::info!(from = start_secs, to = ?options.to_secs, "Preview started");

    let mut sink = PreviewSink::new();
    let mut scheduler = backend.scheduler();
    let (exit, report) = {
        let mut render_loop = RenderLoop::new(
            primary.clone(),
            snapshot.clone(),
            &mut assets,
            renderer,
            surface,
            LoopConfig {
                target_fps: options.fps,
                drift_tolerance_secs: defaults.preview_drift_tolerance_secs,
                end_at_secs: options.to_secs,
            },
        );
        let exit = render_loop
            .run(&mut *scheduler, &mut sink, cancel, None)
            .await;
        (exit, render_loop.report())
    };

    let end_secs = primary.current_time();
    primary.pause();
    assets.release();
    let exit = exit?;

    tracing::info!(
        frames = report.frames_rendered,
        skipped = report.frames_skipped,
        seeks = report.sync.corrective_seeks,
        "Preview finished"
    );

    Ok(PreviewReport {
        exit,
        preload,
        start_secs,
        end_secs,
        frames_rendered: report.frames_rendered,
        frames_skipped: report.frames_skipped,
        corrective_seeks: report.sync.corrective_seeks,
        loop_wraps: report.sync.loop_wraps,
        last_frame_digest: sink.last_digest(),
    })
}
