//! Export parameters: resolution, aspect ratio, frame rate, quality.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target output resolution, named by the short edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "2160p")]
    P2160,
}

impl Resolution {
    pub const ALL: [Resolution; 5] = [
        Resolution::P480,
        Resolution::P720,
        Resolution::P1080,
        Resolution::P1440,
        Resolution::P2160,
    ];

    /// Length of the shorter output edge in pixels.
    pub fn short_edge(self) -> u32 {
        match self {
            Self::P480 => 480,
            Self::P720 => 720,
            Self::P1080 => 1080,
            Self::P1440 => 1440,
            Self::P2160 => 2160,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::P1440 => "1440p",
            Self::P2160 => "2160p",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Resolution {
    type Err = ParseParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "480" | "480p" => Ok(Self::P480),
            "720" | "720p" | "hd" => Ok(Self::P720),
            "1080" | "1080p" | "fullhd" => Ok(Self::P1080),
            "1440" | "1440p" | "2k" => Ok(Self::P1440),
            "2160" | "2160p" | "4k" => Ok(Self::P2160),
            _ => Err(ParseParamError::new("resolution", s)),
        }
    }
}

/// Output frame shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Classic,
    #[serde(rename = "4:5")]
    Social,
}

impl AspectRatio {
    /// `(width, height)` ratio terms.
    pub fn terms(self) -> (u32, u32) {
        match self {
            Self::Landscape => (16, 9),
            Self::Portrait => (9, 16),
            Self::Square => (1, 1),
            Self::Classic => (4, 3),
            Self::Social => (4, 5),
        }
    }

    /// Label safe for file names, e.g. `16x9`.
    pub fn file_label(self) -> String {
        let (w, h) = self.terms();
        format!("{w}x{h}")
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.terms();
        write!(f, "{w}:{h}")
    }
}

impl FromStr for AspectRatio {
    type Err = ParseParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace(['x', '-', '/'], ":");
        match normalized.as_str() {
            "16:9" | "landscape" => Ok(Self::Landscape),
            "9:16" | "portrait" => Ok(Self::Portrait),
            "1:1" | "square" => Ok(Self::Square),
            "4:3" => Ok(Self::Classic),
            "4:5" => Ok(Self::Social),
            _ => Err(ParseParamError::new("aspect ratio", s)),
        }
    }
}

/// Encoder quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl FromStr for Quality {
    type Err = ParseParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "med" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ParseParamError::new("quality", s)),
        }
    }
}

/// An export parameter string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseParamError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseParamError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Parameters chosen by the user for one export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportParams {
    pub resolution: Resolution,
    pub aspect_ratio: AspectRatio,
    pub target_fps: u32,
    pub quality: Quality,
    /// Explicit codec mime type; `None` probes the preference list.
    #[serde(default)]
    pub codec: Option<String>,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            resolution: Resolution::P1080,
            aspect_ratio: AspectRatio::Landscape,
            target_fps: 30,
            quality: Quality::Medium,
            codec: None,
        }
    }
}

impl ExportParams {
    /// Output frame size in pixels. The short edge equals the resolution;
    /// the long edge follows the aspect ratio, rounded to an even number.
    pub fn output_size(&self) -> (u32, u32) {
        let short = self.resolution.short_edge();
        let (w, h) = self.aspect_ratio.terms();
        if w >= h {
            (round_even(short as f64 * w as f64 / h as f64), short)
        } else {
            (short, round_even(short as f64 * h as f64 / w as f64))
        }
    }
}

fn round_even(value: f64) -> u32 {
    ((value / 2.0).round() * 2.0) as u32
}
