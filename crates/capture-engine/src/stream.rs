//! Capture stream assembly: codec negotiation, bitrate, recorder setup.

use std::time::Duration;

use lyricap_common::error::{LyricapError, LyricapResult};
use lyricap_project_model::export::{ExportParams, Quality, Resolution};
use lyricap_render_engine::compositor::Surface;
use lyricap_render_engine::export::ContainerFamily;

use crate::backend::{MediaBackend, Recorder, RecorderConfig};

/// Video bitrate at 30 fps, medium quality.
pub fn base_bitrate(resolution: Resolution) -> u64 {
    match resolution {
        Resolution::P480 => 2_500_000,
        Resolution::P720 => 5_000_000,
        Resolution::P1080 => 8_000_000,
        Resolution::P1440 => 16_000_000,
        Resolution::P2160 => 35_000_000,
    }
}

pub fn fps_multiplier(fps: u32) -> f64 {
    if fps > 30 {
        1.5
    } else {
        1.0
    }
}

pub fn quality_multiplier(quality: Quality) -> f64 {
    match quality {
        Quality::Low => 0.5,
        Quality::Medium => 1.0,
        Quality::High => 2.0,
    }
}

/// Target video bits per second.
pub fn compute_bitrate(resolution: Resolution, fps: u32, quality: Quality) -> u64 {
    let bits = base_bitrate(resolution) as f64 * fps_multiplier(fps) * quality_multiplier(quality);
    bits.round() as u64
}

/// Pick the output mime type.
///
/// An explicitly requested codec wins when supported. Otherwise the first
/// supported entry of `preferences` is used.
pub fn select_codec(
    requested: Option<&str>,
    preferences: &[String],
    is_supported: impl Fn(&str) -> bool,
) -> LyricapResult<String> {
    if let Some(requested) = requested.map(str::trim).filter(|r| !r.is_empty()) {
        if is_supported(requested) {
            return Ok(requested.to_string());
        }
        tracing::warn!(codec = %requested, "Requested codec unsupported, falling back");
    }

    preferences
        .iter()
        .find(|mime| is_supported(mime))
        .cloned()
        .ok_or_else(|| {
            LyricapError::precondition(format!(
                "None of the codecs are supported: {}",
                preferences.join(", ")
            ))
        })
}

/// Negotiated encoder settings for one export.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecProfile {
    pub mime_type: String,
    pub family: ContainerFamily,
    pub video_bits_per_second: u64,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl CodecProfile {
    pub fn negotiate(
        params: &ExportParams,
        preferences: &[String],
        backend: &dyn MediaBackend,
    ) -> LyricapResult<Self> {
        let mime_type = select_codec(params.codec.as_deref(), preferences, |mime| {
            backend.is_type_supported(mime)
        })?;
        let (width, height) = params.output_size();
        let profile = Self {
            family: ContainerFamily::from_mime(&mime_type),
            video_bits_per_second: compute_bitrate(
                params.resolution,
                params.target_fps,
                params.quality,
            ),
            fps: params.target_fps.max(1),
            width,
            height,
            mime_type,
        };
        tracing::info!(
            mime = %profile.mime_type,
            bitrate = profile.video_bits_per_second,
            width,
            height,
            fps = profile.fps,
            "Codec negotiated"
        );
        Ok(profile)
    }

    pub fn recorder_config(&self, timeslice: Duration) -> RecorderConfig {
        RecorderConfig {
            mime_type: self.mime_type.clone(),
            video_bits_per_second: self.video_bits_per_second,
            width: self.width,
            height: self.height,
            fps: self.fps,
            timeslice,
        }
    }
}

/// Create the recorder that combines the surface stream with the mix.
///
/// The recorder samples whatever the surface holds; a surface sized
/// differently from the negotiated output is scaled by the encoder.
pub fn assemble(
    backend: &dyn MediaBackend,
    profile: &CodecProfile,
    surface: &Surface,
    timeslice: Duration,
) -> LyricapResult<Box<dyn Recorder>> {
    if (surface.width(), surface.height()) != (profile.width, profile.height) {
        tracing::warn!(
            surface_width = surface.width(),
            surface_height = surface.height(),
            output_width = profile.width,
            output_height = profile.height,
            "Surface size differs from export size"
        );
    }
    backend.create_recorder(profile.recorder_config(timeslice))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use lyricap_common::config::default_codec_preferences;
    use lyricap_project_model::export::AspectRatio;
    use proptest::prelude::*;

    #[test]
    fn test_bitrate_table() {
        assert_eq!(compute_bitrate(Resolution::P1080, 30, Quality::Medium), 8_000_000);
        assert_eq!(compute_bitrate(Resolution::P1080, 60, Quality::High), 24_000_000);
        assert_eq!(compute_bitrate(Resolution::P480, 24, Quality::Low), 1_250_000);
        assert_eq!(compute_bitrate(Resolution::P2160, 31, Quality::Medium), 52_500_000);
    }

    #[test]
    fn test_requested_codec_wins_when_supported() {
        let prefs = default_codec_preferences();
        let codec = select_codec(Some("video/webm;codecs=vp8,opus"), &prefs, |_| true).unwrap();
        assert_eq!(codec, "video/webm;codecs=vp8,opus");
    }

    #[test]
    fn test_first_supported_preference_is_chosen() {
        let prefs = default_codec_preferences();
        let codec = select_codec(None, &prefs, |m| m.starts_with("video/webm")).unwrap();
        assert_eq!(codec, "video/webm;codecs=vp9,opus");
    }

    #[test]
    fn test_nothing_supported_is_precondition_failure() {
        let prefs = default_codec_preferences();
        let err = select_codec(None, &prefs, |_| false).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_negotiate_against_headless_backend() {
        let backend = HeadlessBackend::virtual_time();
        let params = ExportParams {
            resolution: Resolution::P720,
            aspect_ratio: AspectRatio::Portrait,
            target_fps: 60,
            quality: Quality::Medium,
            codec: Some("video/mp4".to_string()),
        };
        let profile =
            CodecProfile::negotiate(&params, &default_codec_preferences(), &backend).unwrap();
        assert_eq!(profile.mime_type, "video/webm;codecs=vp9,opus");
        assert_eq!(profile.family, ContainerFamily::WebM);
        assert_eq!(profile.video_bits_per_second, 7_500_000);
        assert_eq!((profile.width, profile.height), (720, 1280));
    }

    proptest! {
        #[test]
        fn prop_bitrate_is_product_of_multipliers(
            res in 0usize..5,
            fps in 1u32..121,
            quality in 0usize..3,
        ) {
            let resolution = Resolution::ALL[res];
            let quality = [Quality::Low, Quality::Medium, Quality::High][quality];
            let first = compute_bitrate(resolution, fps, quality);
            prop_assert_eq!(first, compute_bitrate(resolution, fps, quality));

            let expected = base_bitrate(resolution) as f64
                * if fps > 30 { 1.5 } else { 1.0 }
                * quality_multiplier(quality);
            prop_assert_eq!(first, expected.round() as u64);
        }
    }
}
