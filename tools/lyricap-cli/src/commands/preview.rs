//! Play a project through the sync loop without recording.

use std::path::PathBuf;
use std::sync::Arc;

use lyricap_capture_engine::backend::HeadlessClock;
use lyricap_capture_engine::{run_preview, LoopExit, PreviewOptions};
use lyricap_common::config::AppConfig;
use lyricap_project_model::ProjectDocument;
use lyricap_render_engine::compositor::Surface;
use lyricap_render_engine::renderer::LyricFrameRenderer;
use tokio_util::sync::CancellationToken;

use super::{export_params_from, headless_backend_for};

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    from: f64,
    to: Option<f64>,
    fps: Option<u32>,
) -> anyhow::Result<()> {
    let doc =
        ProjectDocument::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;
    if let Some(to) = to {
        if to <= from {
            anyhow::bail!("--to ({to}) must be after --from ({from})");
        }
    }

    let params = export_params_from(&config.capture, None, None, fps, None, None)?;
    let (width, height) = params.output_size();
    tracing::debug!(from, ?to, fps = params.target_fps, "Resolved preview window");
    let backend = headless_backend_for(&doc, HeadlessClock::virtual_clock())
        .with_refresh_hz(config.capture.display_refresh_hz);

    println!("Previewing project: {}", doc.name);
    println!(
        "  Window: {from:.2}s - {}",
        to.map(|t| format!("{t:.2}s")).unwrap_or_else(|| "end".to_string())
    );
    println!("  Surface: {width}x{height} @ {}fps", params.target_fps);

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut renderer = LyricFrameRenderer::new();
    let mut surface = Surface::new(width, height)?;
    let result = run_preview(
        Arc::new(backend),
        &config.capture,
        doc.snapshot(),
        &mut renderer,
        &mut surface,
        PreviewOptions {
            from_secs: from,
            to_secs: to,
            fps: params.target_fps,
        },
        &cancel,
    )
    .await;
    ctrl_c.abort();
    let report = result.map_err(|e| anyhow::anyhow!("Preview failed: {e}"))?;

    println!();
    match report.exit {
        LoopExit::Ended => println!("Preview finished"),
        LoopExit::Aborted => println!("Preview interrupted"),
    }
    println!(
        "  Played: {:.2}s - {:.2}s",
        report.start_secs, report.end_secs
    );
    println!(
        "  Frames: {} rendered, {} throttled",
        report.frames_rendered, report.frames_skipped
    );
    println!(
        "  Corrections: {} seeks, {} loop wraps",
        report.corrective_seeks, report.loop_wraps
    );
    println!(
        "  Assets: {} loaded, {} timed out, {} failed",
        report.preload.loaded.len(),
        report.preload.timed_out.len(),
        report.preload.failed.len()
    );
    for (key, reason) in &report.preload.failed {
        println!("  [WARN] {key}: {reason}");
    }
    if let Some(digest) = report.last_frame_digest {
        println!("  Last frame: {digest:016x}");
    }

    Ok(())
}
