//! Frame renderer contract and the reference lyric renderer.
//!
//! The capture loop calls [`FrameRenderer::render`] once per scheduled
//! frame. A renderer is a side-effecting painter: it draws onto the shared
//! [`Surface`] and returns nothing the loop consumes.

use lyricap_project_model::lyrics::active_line;
use lyricap_project_model::project::{BackgroundMode, LyricDisplay, Metadata, ProjectSnapshot};
use lyricap_project_model::slide::{AssetKey, Slide, SlideKind};
use lyricap_project_model::{LyricLine, RenderConfig};

use crate::compositor::{Fit, ImageAsset, Rect, Rgba, Surface};

/// Read access to preloaded assets, keyed like the asset registry.
pub trait AssetLookup {
    /// A loaded still image.
    fn image(&self, key: &AssetKey) -> Option<&ImageAsset>;

    /// The frame a video asset currently shows.
    fn video_frame(&self, key: &AssetKey) -> Option<&ImageAsset>;
}

/// Everything a renderer may read for one frame.
pub struct FrameInputs<'a> {
    pub width: u32,
    pub height: u32,
    /// Primary track position in seconds.
    pub playback_secs: f64,
    pub lyrics: &'a [LyricLine],
    pub metadata: &'a Metadata,
    pub slides: &'a [Slide],
    pub assets: &'a dyn AssetLookup,
    pub style_preset: &'a str,
    pub custom_font_name: Option<&'a str>,
    pub font_scale: f32,
    pub blur_enabled: bool,
    pub render_config: &'a RenderConfig,
}

impl<'a> FrameInputs<'a> {
    /// Assemble the inputs for `playback_secs` from a project snapshot.
    pub fn from_snapshot(
        surface: &Surface,
        playback_secs: f64,
        snapshot: &'a ProjectSnapshot,
        assets: &'a dyn AssetLookup,
    ) -> Self {
        let config = &snapshot.render_config;
        Self {
            width: surface.width(),
            height: surface.height(),
            playback_secs,
            lyrics: &snapshot.lyrics,
            metadata: &snapshot.metadata,
            slides: &snapshot.timeline.slides,
            assets,
            style_preset: &config.style_preset,
            custom_font_name: config.custom_font_name.as_deref(),
            font_scale: config.font_scale,
            blur_enabled: config.blur_enabled,
            render_config: config,
        }
    }

    /// The active primary-visual slide, if any.
    pub fn active_visual(&self) -> Option<&'a Slide> {
        self.slides
            .iter()
            .filter(|s| s.is_visual() && s.contains(self.playback_secs))
            .min_by(|a, b| a.start_secs.total_cmp(&b.start_secs))
    }
}

/// Paints one frame.
pub trait FrameRenderer: Send {
    fn render(&mut self, surface: &mut Surface, frame: &FrameInputs<'_>);
}

/// Reference renderer: background, active visual slide, and a lyric band.
///
/// Glyphs are not rasterized; the current line is drawn as a text-width
/// bar, with a karaoke highlight when that display mode is selected.
#[derive(Debug, Default)]
pub struct LyricFrameRenderer {
    frames: u64,
}

/// Pixel block size used when the background blur is enabled.
const BLUR_BLOCK: u32 = 16;

impl LyricFrameRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames painted so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn paint_background(&self, surface: &mut Surface, frame: &FrameInputs<'_>) {
        let config = frame.render_config;
        let base = Rgba::from_hex_or(&config.background_color, Rgba::BLACK);
        surface.fill(base);

        let image = match config.background_mode {
            BackgroundMode::Solid => None,
            BackgroundMode::Image => frame.assets.image(&AssetKey::Background),
            BackgroundMode::Video => frame.assets.video_frame(&AssetKey::Background),
            BackgroundMode::Cover => frame.assets.image(&AssetKey::Cover),
        };

        if let Some(image) = image {
            let block = if frame.blur_enabled { BLUR_BLOCK } else { 1 };
            let full = Rect::new(0, 0, frame.width, frame.height);
            surface.draw_image(image, full, Fit::Cover, block);
        }
    }

    fn paint_visual(&self, surface: &mut Surface, frame: &FrameInputs<'_>) {
        let Some(slide) = frame.active_visual() else {
            return;
        };
        let key = slide.asset_key();
        let image = match slide.kind {
            SlideKind::Image => frame.assets.image(&key),
            SlideKind::Video => frame.assets.video_frame(&key),
            SlideKind::Audio => None,
        };
        if let Some(image) = image {
            let area = Rect::new(0, 0, frame.width, frame.height * 3 / 4);
            surface.draw_image(image, area, Fit::Contain, 1);
        }
    }

    fn paint_lyrics(&self, surface: &mut Surface, frame: &FrameInputs<'_>) {
        let config = frame.render_config;
        if config.lyric_display == LyricDisplay::Hidden {
            return;
        }
        let Some((_, line)) = active_line(frame.lyrics, frame.playback_secs) else {
            return;
        };

        let band_h = ((frame.height as f32 / 14.0) * frame.font_scale.max(0.1)).round() as u32;
        let glyph_w = (band_h / 2).max(1);
        let chars = line.text.chars().count() as u32;
        let bar_w = (chars * glyph_w).min(frame.width * 9 / 10);
        let x = (frame.width as i32 - bar_w as i32) / 2;
        let y = (frame.height as i32 * 5 / 6) - band_h as i32 / 2;

        let text = Rgba::from_hex_or(&config.text_color, Rgba::WHITE);
        surface.fill_rect(Rect::new(x, y, bar_w, band_h), text, 0.9);

        if config.lyric_display == LyricDisplay::Karaoke {
            let highlight = Rgba::from_hex_or(&config.highlight_color, text);
            let done = (bar_w as f64 * line.progress_at(frame.playback_secs)) as u32;
            surface.fill_rect(Rect::new(x, y, done, band_h), highlight, 1.0);
        }
    }
}

impl FrameRenderer for LyricFrameRenderer {
    fn render(&mut self, surface: &mut Surface, frame: &FrameInputs<'_>) {
        self.paint_background(surface, frame);
        self.paint_visual(surface, frame);
        self.paint_lyrics(surface, frame);
        self.frames += 1;
    }
}
