//! Report codec support and the resolved export defaults.

use lyricap_capture_engine::backend::{HeadlessBackend, MediaBackend};
use lyricap_capture_engine::stream::{compute_bitrate, select_codec};
use lyricap_common::config::AppConfig;
use serde::Serialize;

use super::export_params_from;

#[derive(Debug, Serialize)]
struct CodecSupport {
    mime_type: String,
    supported: bool,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    backend: String,
    codecs: Vec<CodecSupport>,
    selected_codec: Option<String>,
    resolution: String,
    aspect_ratio: String,
    width: u32,
    height: u32,
    fps: u32,
    quality: String,
    video_bits_per_second: u64,
    output_dir: String,
}

fn build_report(config: &AppConfig) -> anyhow::Result<CheckReport> {
    let backend = HeadlessBackend::virtual_time();
    let defaults = &config.capture;
    let params = export_params_from(defaults, None, None, None, None, None)?;
    let (width, height) = params.output_size();

    let codecs = defaults
        .codec_preferences
        .iter()
        .map(|mime| CodecSupport {
            mime_type: mime.clone(),
            supported: backend.is_type_supported(mime),
        })
        .collect();
    let selected_codec = select_codec(None, &defaults.codec_preferences, |m| {
        backend.is_type_supported(m)
    })
    .ok();

    Ok(CheckReport {
        backend: backend.name().to_string(),
        codecs,
        selected_codec,
        resolution: params.resolution.to_string(),
        aspect_ratio: params.aspect_ratio.to_string(),
        width,
        height,
        fps: params.target_fps,
        quality: format!("{:?}", params.quality).to_lowercase(),
        video_bits_per_second: compute_bitrate(
            params.resolution,
            params.target_fps,
            params.quality,
        ),
        output_dir: config.output_dir.display().to_string(),
    })
}

pub fn run(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let report = build_report(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Lyricap Check");
    println!("{}", "=".repeat(50));
    println!("Backend: {}", report.backend);
    println!();

    println!("Codec support (preference order):");
    for codec in &report.codecs {
        let tag = if codec.supported { "[OK]  " } else { "[--]  " };
        println!("  {tag}{}", codec.mime_type);
    }
    println!();

    match &report.selected_codec {
        Some(mime) => println!("[OK] Export codec: {mime}"),
        None => println!("[WARN] No supported codec. Exports will be rejected."),
    }
    println!(
        "[OK] Output: {}x{} ({} {}) @ {}fps, quality {}",
        report.width,
        report.height,
        report.resolution,
        report.aspect_ratio,
        report.fps,
        report.quality
    );
    println!(
        "[OK] Video bitrate: {:.1} Mbps",
        report.video_bits_per_second as f64 / 1_000_000.0
    );
    println!("[OK] Output directory: {}", report.output_dir);

    Ok(())
}
