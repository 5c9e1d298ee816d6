//! Export a project to video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use lyricap_capture_engine::backend::HeadlessClock;
use lyricap_capture_engine::{CaptureProgress, ExportOutcome, ExportRequest, Exporter};
use lyricap_common::config::AppConfig;
use lyricap_project_model::ProjectDocument;
use lyricap_render_engine::export::DirectorySink;

use super::{export_params_from, headless_backend_for, project_dir};

/// Command-line overrides for one export.
#[derive(Debug, Default)]
pub struct ExportArgs {
    pub resolution: Option<String>,
    pub aspect: Option<String>,
    pub fps: Option<u32>,
    pub quality: Option<String>,
    pub codec: Option<String>,
    pub output: Option<PathBuf>,
    pub realtime: bool,
}

fn print_progress(p: CaptureProgress) {
    let total = p
        .duration_secs
        .map(|d| format!("{d:.1}s"))
        .unwrap_or_else(|| "?".to_string());
    print!(
        "\r  Progress: {:.1}% ({:.1}s/{total}, {} frames, {})  ",
        p.progress * 100.0,
        p.playback_secs,
        p.frames_rendered,
        p.state,
    );
    std::io::stdout().flush().ok();
}

pub async fn run(config: &AppConfig, path: PathBuf, args: ExportArgs) -> anyhow::Result<()> {
    println!("Exporting project at: {}", path.display());

    let doc =
        ProjectDocument::load(&path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))?;
    for problem in doc.validate() {
        println!("  [WARN] {problem}");
    }

    let params = export_params_from(
        &config.capture,
        args.resolution.as_deref(),
        args.aspect.as_deref(),
        args.fps,
        args.quality.as_deref(),
        args.codec,
    )?;
    let output_dir = args
        .output
        .unwrap_or_else(|| project_dir(&path).join("exports"));
    tracing::debug!(
        ?params,
        output = %output_dir.display(),
        realtime = args.realtime,
        "Resolved export"
    );

    let clock = if args.realtime {
        HeadlessClock::wall()
    } else {
        HeadlessClock::virtual_clock()
    };
    let backend = headless_backend_for(&doc, clock)
        .with_refresh_hz(config.capture.display_refresh_hz);

    let exporter = Exporter::new(
        Arc::new(backend),
        config.capture.clone(),
        Arc::new(DirectorySink::new(&output_dir)),
    );
    let session = exporter
        .begin(ExportRequest::new(doc.snapshot(), params.clone()))
        .map_err(|e| anyhow::anyhow!("Cannot start export: {e}"))?
        .on_progress(print_progress);

    let (width, height) = params.output_size();
    println!("  Output: {}", output_dir.display());
    println!("  Codec: {}", session.profile().mime_type);
    println!(
        "  Resolution: {width}x{height} ({} {}) @ {}fps",
        params.resolution, params.aspect_ratio, params.target_fps
    );
    println!(
        "  Bitrate: {:.1} Mbps",
        session.profile().video_bits_per_second as f64 / 1_000_000.0
    );
    println!("  Press Ctrl-C to abort");

    let abort = session.abort_handle();
    let run = session.run();
    tokio::pin!(run);
    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() && abort.abort() {
                    println!("\n  Aborting...");
                }
            }
        }
    };
    println!();

    match result.map_err(|e| anyhow::anyhow!("Export failed: {e}"))? {
        ExportOutcome::Completed {
            artifact,
            location,
            report,
        } => {
            println!("Export complete: {}", location.display());
            println!(
                "  {} bytes, {}",
                artifact.bytes.len(),
                artifact.mime_type
            );
            if artifact.duration_repaired {
                println!("  Container duration repaired");
            }
            println!(
                "  {} frames rendered in {:.1}s, {} corrective seeks",
                report.frames_rendered, report.elapsed_secs, report.sync.corrective_seeks
            );
        }
        ExportOutcome::Aborted { report } => {
            println!(
                "Export aborted at {:.1}s. No file was written.",
                report.last_playback_secs
            );
        }
    }

    Ok(())
}
