//! Project document, metadata, render style, and export snapshots.
//!
//! A project ties together the primary audio track, the slide timeline,
//! lyric lines, song metadata, and the visual style handed to the frame
//! renderer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::lyrics::LyricLine;
use crate::timeline::Timeline;

/// File name of the project document inside a project directory.
pub const PROJECT_FILE: &str = "project.json";

/// Song metadata and the background/cover asset references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    /// Cover art image.
    pub cover_ref: Option<String>,
    /// Background image or video.
    pub background_ref: Option<String>,
    pub background_kind: BackgroundKind,
}

/// Media type of the background asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundKind {
    #[default]
    Image,
    Video,
}

/// How the frame renderer fills the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundMode {
    #[default]
    Solid,
    Image,
    Video,
    Cover,
}

/// How lyrics are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LyricDisplay {
    /// Current line only.
    #[default]
    Line,
    /// Current line with a progress highlight.
    Karaoke,
    /// No lyrics.
    Hidden,
}

/// Visual style configuration. Opaque to the capture pipeline: it is
/// passed to the frame renderer verbatim. Unknown keys survive in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub background_mode: BackgroundMode,
    pub lyric_display: LyricDisplay,
    pub style_preset: String,
    pub custom_font_name: Option<String>,
    pub font_scale: f32,
    pub blur_enabled: bool,
    /// Hex colors (`#rrggbb`).
    pub background_color: String,
    pub text_color: String,
    pub highlight_color: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            background_mode: BackgroundMode::Solid,
            lyric_display: LyricDisplay::Line,
            style_preset: "classic".to_string(),
            custom_font_name: None,
            font_scale: 1.0,
            blur_enabled: false,
            background_color: "#101018".to_string(),
            text_color: "#ffffff".to_string(),
            highlight_color: "#ffcc33".to_string(),
            extra: serde_json::Map::new(),
        }
    }
}

/// The main song; its playback position is the export clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryTrack {
    pub source_ref: String,
    /// Known duration, when metadata extraction provided one.
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

/// Top-level project file (`project.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    /// Schema version.
    pub version: String,

    /// Human-readable project name.
    pub name: String,

    /// Creation timestamp (ISO 8601).
    pub created_at: String,

    /// Last modified timestamp (ISO 8601).
    pub modified_at: String,

    #[serde(default)]
    pub primary_track: Option<PrimaryTrack>,

    #[serde(default)]
    pub timeline: Timeline,

    #[serde(default)]
    pub lyrics: Vec<LyricLine>,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub render_config: RenderConfig,
}

/// Immutable copy of everything an export reads.
///
/// Taken once when an export starts; later edits to the
/// [`ProjectDocument`] are not observed by the running session.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSnapshot {
    /// When the snapshot was taken (ISO 8601).
    pub taken_at: String,
    pub name: String,
    pub primary_track: Option<PrimaryTrack>,
    pub timeline: Timeline,
    pub lyrics: Vec<LyricLine>,
    pub metadata: Metadata,
    pub render_config: RenderConfig,
}

impl ProjectDocument {
    /// Create a new empty project.
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        let name = name.into();
        Self {
            version: "1.0".to_string(),
            metadata: Metadata {
                title: name.clone(),
                ..Metadata::default()
            },
            name,
            created_at: now.clone(),
            modified_at: now,
            primary_track: None,
            timeline: Timeline::default(),
            lyrics: Vec::new(),
            render_config: RenderConfig::default(),
        }
    }

    /// Copy-on-start snapshot for an export session.
    pub fn snapshot(&self) -> Arc<ProjectSnapshot> {
        Arc::new(ProjectSnapshot {
            taken_at: chrono::Utc::now().to_rfc3339(),
            name: self.name.clone(),
            primary_track: self.primary_track.clone(),
            timeline: self.timeline.clone(),
            lyrics: self.lyrics.clone(),
            metadata: self.metadata.clone(),
            render_config: self.render_config.clone(),
        })
    }

    /// Load a project from a directory or a `project.json` path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let project_path = resolve_project_file(path.as_ref());

        let json = std::fs::read_to_string(&project_path).map_err(|e| ProjectError::IoError {
            path: project_path.clone(),
            source: e,
        })?;

        serde_json::from_str(&json).map_err(|e| ProjectError::ParseError {
            path: project_path,
            source: e,
        })
    }

    /// Save the project into `dir/project.json`.
    pub fn save(&mut self, dir: impl AsRef<Path>) -> Result<PathBuf, ProjectError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| ProjectError::IoError {
            path: dir.to_path_buf(),
            source: e,
        })?;

        self.modified_at = chrono::Utc::now().to_rfc3339();

        let project_path = dir.join(PROJECT_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| ProjectError::ParseError {
            path: project_path.clone(),
            source: e,
        })?;
        std::fs::write(&project_path, json).map_err(|e| ProjectError::IoError {
            path: project_path.clone(),
            source: e,
        })?;

        Ok(project_path)
    }

    /// Create a new project on disk with the standard directory structure.
    pub fn create(dir: impl AsRef<Path>, name: impl Into<String>) -> Result<Self, ProjectError> {
        let dir = dir.as_ref();
        for subdir in &["media", "exports"] {
            std::fs::create_dir_all(dir.join(subdir)).map_err(|e| ProjectError::IoError {
                path: dir.join(subdir),
                source: e,
            })?;
        }

        let mut project = Self::new(name);
        project.save(dir)?;
        Ok(project)
    }

    /// Human-readable list of problems that would block an export.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = vec![];

        match &self.primary_track {
            None => errors.push("No primary track set".to_string()),
            Some(track) if track.source_ref.trim().is_empty() => {
                errors.push("Primary track has an empty source".to_string())
            }
            Some(_) => {}
        }

        if let Err(e) = self.timeline.validate() {
            errors.push(format!("Timeline: {e}"));
        }

        for (i, line) in self.lyrics.iter().enumerate() {
            if line.end_secs < line.start_secs {
                errors.push(format!("Lyric line {i} ends before it starts"));
            }
        }

        errors
    }
}

fn resolve_project_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(PROJECT_FILE)
    } else {
        path.to_path_buf()
    }
}

/// Errors that can occur when working with projects.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}
