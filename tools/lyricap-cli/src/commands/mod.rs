pub mod check;
pub mod export;
pub mod info;
pub mod init;
pub mod preview;

use std::path::{Path, PathBuf};

use lyricap_capture_engine::backend::headless::synthetic_color;
use lyricap_capture_engine::backend::{HeadlessBackend, HeadlessClock, HeadlessSource};
use lyricap_common::config::CaptureDefaults;
use lyricap_project_model::{
    AspectRatio, BackgroundKind, ExportParams, ProjectDocument, Quality, Resolution, SlideKind,
};
use lyricap_render_engine::compositor::ImageAsset;

/// Loop length used for a background video with no known duration.
const BACKGROUND_LOOP_SECS: f64 = 8.0;

/// Merge command-line overrides over the configured defaults.
pub fn export_params_from(
    defaults: &CaptureDefaults,
    resolution: Option<&str>,
    aspect: Option<&str>,
    fps: Option<u32>,
    quality: Option<&str>,
    codec: Option<String>,
) -> anyhow::Result<ExportParams> {
    let resolution: Resolution = resolution.unwrap_or(&defaults.resolution).parse()?;
    let aspect_ratio: AspectRatio = aspect.unwrap_or(&defaults.aspect_ratio).parse()?;
    let quality: Quality = quality.unwrap_or(&defaults.quality).parse()?;
    let target_fps = fps.unwrap_or(defaults.fps);
    if target_fps == 0 {
        anyhow::bail!("FPS must be at least 1");
    }

    Ok(ExportParams {
        resolution,
        aspect_ratio,
        target_fps,
        quality,
        codec,
    })
}

/// Directory that holds `project.json` for a directory or file argument.
pub fn project_dir(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Length the primary track is simulated with.
fn primary_duration(doc: &ProjectDocument) -> f64 {
    if let Some(d) = doc.primary_track.as_ref().and_then(|t| t.duration_secs) {
        return d;
    }
    let lyrics_end = doc
        .lyrics
        .iter()
        .map(|l| l.end_secs)
        .fold(0.0_f64, f64::max);
    doc.timeline.end_secs().max(lyrics_end).max(1.0)
}

fn still(source_ref: &str) -> HeadlessSource {
    HeadlessSource::image(ImageAsset::solid(64, 36, synthetic_color(source_ref)))
}

/// A headless backend with a synthetic source for every asset the
/// project references.
pub fn headless_backend_for(doc: &ProjectDocument, clock: HeadlessClock) -> HeadlessBackend {
    let mut backend = HeadlessBackend::new(clock);
    let mut registered = std::collections::HashSet::new();
    let mut add = |backend: &mut HeadlessBackend, source_ref: &str, source: HeadlessSource| {
        if !source_ref.trim().is_empty() && registered.insert(source_ref.to_string()) {
            backend.register(source_ref, source);
        }
    };

    if let Some(track) = &doc.primary_track {
        add(
            &mut backend,
            &track.source_ref,
            HeadlessSource::media(primary_duration(doc)),
        );
    }

    for slide in &doc.timeline.slides {
        let source = match slide.kind {
            SlideKind::Image => still(&slide.source_ref),
            SlideKind::Video | SlideKind::Audio => {
                HeadlessSource::media(slide.duration_secs().max(0.1))
            }
        };
        add(&mut backend, &slide.source_ref, source);
    }

    if let Some(cover) = &doc.metadata.cover_ref {
        add(&mut backend, cover, still(cover));
    }
    if let Some(background) = &doc.metadata.background_ref {
        let source = match doc.metadata.background_kind {
            BackgroundKind::Image => still(background),
            BackgroundKind::Video => HeadlessSource::media(BACKGROUND_LOOP_SECS),
        };
        add(&mut backend, background, source);
    }

    backend
}
