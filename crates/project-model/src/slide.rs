//! Timeline slides and asset keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a slide contributes to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideKind {
    Image,
    Video,
    Audio,
}

/// A timed item on the timeline.
///
/// Image and video slides form the primary visual layer; audio slides are
/// incidental sounds that may overlap anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    /// Unique slide identifier.
    pub id: String,

    /// Slide kind.
    pub kind: SlideKind,

    /// Location of the media (path or URL).
    pub source_ref: String,

    /// Start of the active interval (inclusive).
    pub start_secs: f64,

    /// End of the active interval (exclusive).
    pub end_secs: f64,

    /// Playback volume in `[0.0, 1.0]`.
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Whether the slide's audio is muted.
    #[serde(default)]
    pub is_muted: bool,
}

fn default_volume() -> f32 {
    1.0
}

impl Slide {
    pub fn new(
        id: impl Into<String>,
        kind: SlideKind,
        source_ref: impl Into<String>,
        start_secs: f64,
        end_secs: f64,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            source_ref: source_ref.into(),
            start_secs,
            end_secs,
            volume: 1.0,
            is_muted: false,
        }
    }

    /// Whether `t` falls inside `[start, end)`.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_secs && t < self.end_secs
    }

    /// Position inside the slide's own media for timeline time `t`.
    pub fn relative_position(&self, t: f64) -> f64 {
        (t - self.start_secs).max(0.0)
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }

    /// Member of the primary visual layer.
    pub fn is_visual(&self) -> bool {
        matches!(self.kind, SlideKind::Image | SlideKind::Video)
    }

    /// Produces sound that must be routed through the mixer.
    pub fn is_sounding(&self) -> bool {
        matches!(self.kind, SlideKind::Video | SlideKind::Audio)
    }

    /// Whether two half-open intervals share any instant.
    pub fn overlaps(&self, other: &Slide) -> bool {
        self.start_secs < other.end_secs && other.start_secs < self.end_secs
    }

    /// Volume that actually reaches the mix.
    pub fn effective_gain(&self) -> f32 {
        if self.is_muted {
            0.0
        } else {
            self.volume.clamp(0.0, 1.0)
        }
    }

    pub fn asset_key(&self) -> AssetKey {
        AssetKey::Slide(self.id.clone())
    }
}

/// Registry key for a preloaded asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKey {
    /// Asset bound to the slide with this id.
    Slide(String),
    /// Background image or looping background video.
    Background,
    /// Cover art.
    Cover,
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slide(id) => write!(f, "slide:{id}"),
            Self::Background => f.write_str("background"),
            Self::Cover => f.write_str("cover"),
        }
    }
}
