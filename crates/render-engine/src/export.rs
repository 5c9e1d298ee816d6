//! Output finalization and delivery.
//!
//! Turns the ordered chunks a recorder produced into one artifact, repairs
//! the container duration where the family needs it, and hands the result
//! to an [`ArtifactSink`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lyricap_common::error::{LyricapError, LyricapResult};
use lyricap_project_model::export::{AspectRatio, Resolution};

use crate::webm;

/// Title used when the project has none.
pub const FALLBACK_TITLE: &str = "lyric-video";

/// Container family of a recorder mime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFamily {
    /// Live WebM streams lack a Segment duration and must be repaired.
    WebM,
    Mp4,
    Other,
}

impl ContainerFamily {
    pub fn from_mime(mime: &str) -> Self {
        let base = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match base.as_str() {
            "video/webm" | "audio/webm" => Self::WebM,
            "video/mp4" | "audio/mp4" => Self::Mp4,
            _ => Self::Other,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::WebM => "webm",
            Self::Mp4 => "mp4",
            Self::Other => "bin",
        }
    }

    pub fn needs_duration_repair(self) -> bool {
        matches!(self, Self::WebM)
    }
}

/// Chunks emitted by a recorder, in emission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedOutput {
    pub chunks: Vec<Vec<u8>>,
    pub mime_type: String,
}

impl RecordedOutput {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            chunks: Vec::new(),
            mime_type: mime_type.into(),
        }
    }

    pub fn push(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// A finished, deliverable file.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalArtifact {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// Whether the container duration was rewritten.
    pub duration_repaired: bool,
}

/// Naming inputs for the delivered file.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactNaming {
    pub title: String,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
}

/// `<title>_<16x9>_<1080p>.<ext>` with the title reduced to file-safe
/// characters.
pub fn artifact_file_name(
    title: &str,
    aspect_ratio: AspectRatio,
    resolution: Resolution,
    extension: &str,
) -> String {
    format!(
        "{}_{}_{}.{}",
        sanitize_title(title),
        aspect_ratio.file_label(),
        resolution.label(),
        extension
    )
}

fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_sep = false;
    for c in title.trim().chars() {
        if c.is_alphanumeric() || c == '-' {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        out
    }
}

/// Where finished artifacts go.
pub trait ArtifactSink: Send + Sync {
    /// Deliver the artifact; returns where it ended up.
    fn deliver(&self, artifact: &FinalArtifact) -> LyricapResult<PathBuf>;
}

/// Writes artifacts into a directory, atomically.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for DirectorySink {
    fn deliver(&self, artifact: &FinalArtifact) -> LyricapResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;

        let target = self.dir.join(&artifact.file_name);
        let partial = self.dir.join(format!(".{}.partial", artifact.file_name));
        std::fs::write(&partial, &artifact.bytes)?;
        if let Err(e) = std::fs::rename(&partial, &target) {
            let _ = std::fs::remove_file(&partial);
            return Err(e.into());
        }

        tracing::info!(
            path = %target.display(),
            bytes = artifact.bytes.len(),
            "Artifact written"
        );
        Ok(target)
    }
}

/// Keeps delivered artifacts in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<FinalArtifact>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<FinalArtifact> {
        self.delivered
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }
}

impl ArtifactSink for MemorySink {
    fn deliver(&self, artifact: &FinalArtifact) -> LyricapResult<PathBuf> {
        self.delivered
            .lock()
            .map_err(|_| LyricapError::capture("Artifact sink lock poisoned"))?
            .push(artifact.clone());
        Ok(PathBuf::from(&artifact.file_name))
    }
}

/// Concatenates recorder output and repairs container metadata.
#[derive(Debug, Clone, Default)]
pub struct Finalizer;

impl Finalizer {
    pub fn new() -> Self {
        Self
    }

    /// Build the artifact. `duration_secs` is the primary track's known
    /// duration; a failed repair keeps the uncorrected bytes.
    pub fn finalize(
        &self,
        output: RecordedOutput,
        duration_secs: Option<f64>,
        naming: &ArtifactNaming,
    ) -> LyricapResult<FinalArtifact> {
        if output.is_empty() {
            return Err(LyricapError::capture("Recorder produced no data"));
        }

        let family = ContainerFamily::from_mime(&output.mime_type);
        let mut bytes = Vec::with_capacity(output.total_bytes());
        for chunk in &output.chunks {
            bytes.extend_from_slice(chunk);
        }

        let mut duration_repaired = false;
        if family.needs_duration_repair() {
            match duration_secs.filter(|d| d.is_finite() && *d > 0.0) {
                Some(duration) => {
                    let mut repaired = bytes.clone();
                    match webm::set_duration(&mut repaired, duration) {
                        Ok(()) => {
                            bytes = repaired;
                            duration_repaired = true;
                        }
                        Err(e) => tracing::warn!(
                            error = %e,
                            "WebM duration repair failed, delivering uncorrected file"
                        ),
                    }
                }
                None => tracing::warn!("Primary track duration unknown, skipping duration repair"),
            }
        }

        let file_name = artifact_file_name(
            &naming.title,
            naming.aspect_ratio,
            naming.resolution,
            family.extension(),
        );

        tracing::info!(
            file = %file_name,
            mime = %output.mime_type,
            chunks = output.chunks.len(),
            bytes = bytes.len(),
            duration_repaired,
            "Output finalized"
        );

        Ok(FinalArtifact {
            file_name,
            mime_type: output.mime_type,
            bytes,
            duration_repaired,
        })
    }

    /// Finalize and hand the artifact to `sink`.
    pub fn finalize_and_deliver(
        &self,
        output: RecordedOutput,
        duration_secs: Option<f64>,
        naming: &ArtifactNaming,
        sink: &dyn ArtifactSink,
    ) -> LyricapResult<(FinalArtifact, PathBuf)> {
        let artifact = self.finalize(output, duration_secs, naming)?;
        let location = sink.deliver(&artifact)?;
        Ok((artifact, location))
    }
}
