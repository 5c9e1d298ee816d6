//! Audio mixing graph.
//!
//! One aggregation node with one edge per sounding source. Every connected
//! element has its direct device output silenced first, so the aggregation
//! output is the only audible capture result.

use std::sync::Arc;

use lyricap_common::error::{LyricapError, LyricapResult};

use crate::assets::AssetRegistry;
use crate::backend::SharedElement;

/// Edge label of the primary track.
pub const PRIMARY_LABEL: &str = "primary";

/// What one source feeds into the aggregation node at an instant.
#[derive(Debug, Clone, PartialEq)]
pub struct MixContribution {
    pub source: String,
    pub gain: f32,
}

/// Per-edge gains at one instant, in edge order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MixSnapshot {
    pub contributions: Vec<MixContribution>,
}

impl MixSnapshot {
    /// Gain carried for `source`, or `None` when it is not connected.
    pub fn gain_of(&self, source: &str) -> Option<f32> {
        self.contributions
            .iter()
            .find(|c| c.source == source)
            .map(|c| c.gain)
    }

    /// Summed level of the aggregation output.
    pub fn output_level(&self) -> f32 {
        self.contributions.iter().map(|c| c.gain).sum()
    }
}

struct MixEdge {
    label: String,
    element: SharedElement,
}

/// The aggregation node and its edges.
pub struct MixerGraph {
    edges: Vec<MixEdge>,
}

impl MixerGraph {
    /// Connect the primary track and every playable asset.
    ///
    /// Fails with a precondition error when the primary track cannot expose
    /// a capturable audio output.
    pub fn build(primary: &SharedElement, assets: &AssetRegistry) -> LyricapResult<Self> {
        if !primary.supports_audio_capture() {
            return Err(LyricapError::precondition(format!(
                "Primary track {} has no capturable audio output",
                primary.source_ref()
            )));
        }

        let mut graph = Self { edges: Vec::new() };
        graph.connect(PRIMARY_LABEL.to_string(), primary.clone());
        for (key, element) in assets.media() {
            if !element.supports_audio_capture() {
                tracing::warn!(
                    asset = %key,
                    "Asset audio cannot be captured and will be silent in the export"
                );
            }
            graph.connect(key.to_string(), element.clone());
        }

        tracing::info!(edges = graph.edges.len(), "Mixer graph built");
        Ok(graph)
    }

    fn connect(&mut self, label: String, element: SharedElement) {
        if self.edges.iter().any(|e| Arc::ptr_eq(&e.element, &element)) {
            tracing::debug!(source = %label, "Source already connected, skipping");
            return;
        }
        element.set_device_output(false);
        self.edges.push(MixEdge { label, element });
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.edges.iter().any(|e| e.label == label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.edges.iter().map(|e| e.label.as_str())
    }

    /// Current gain of every edge.
    ///
    /// Gain is zero for muted or paused elements and for elements whose
    /// audio cannot be captured.
    pub fn snapshot(&self) -> MixSnapshot {
        let contributions = self
            .edges
            .iter()
            .map(|edge| {
                let element = &edge.element;
                let silent =
                    element.is_muted() || element.is_paused() || !element.supports_audio_capture();
                MixContribution {
                    source: edge.label.clone(),
                    gain: if silent { 0.0 } else { element.volume() },
                }
            })
            .collect();
        MixSnapshot { contributions }
    }

    /// Labels of edges whose element also plays to the device.
    pub fn verify_exclusive(&self) -> Vec<String> {
        self.edges
            .iter()
            .filter(|e| e.element.device_output())
            .map(|e| e.label.clone())
            .collect()
    }

    /// Silence any device output that came back; returns how many were fixed.
    pub fn enforce_exclusive(&self) -> usize {
        let violations = self.verify_exclusive();
        for edge in &self.edges {
            if edge.element.device_output() {
                edge.element.set_device_output(false);
            }
        }
        if !violations.is_empty() {
            tracing::warn!(
                sources = ?violations,
                "Sources were audible outside the mix, silenced"
            );
        }
        violations.len()
    }

    /// Disconnect every edge. Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.edges.is_empty() {
            return;
        }
        let count = self.edges.len();
        self.edges.clear();
        tracing::debug!(edges = count, "Mixer graph torn down");
    }
}

impl Drop for MixerGraph {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for MixerGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixerGraph")
            .field("edges", &self.labels().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetHandle;
    use crate::backend::headless::HeadlessMedia;
    use crate::backend::{HeadlessClock, HeadlessSource, MediaElement, MediaKind};
    use lyricap_project_model::slide::AssetKey;

    fn element(source_ref: &str, kind: MediaKind, source: HeadlessSource) -> SharedElement {
        Arc::new(HeadlessMedia::new(
            source_ref,
            kind,
            source,
            HeadlessClock::virtual_clock(),
        ))
    }

    fn registry() -> (AssetRegistry, SharedElement, SharedElement) {
        let clip = element("clip.mp4", MediaKind::Video, HeadlessSource::media(10.0));
        let vocal = element("vocal.mp3", MediaKind::Audio, HeadlessSource::media(2.0));
        let mut assets = AssetRegistry::new();
        assets.insert(AssetKey::Slide("clip".into()), AssetHandle::Media(clip.clone()));
        assets.insert(AssetKey::Slide("vocal".into()), AssetHandle::Media(vocal.clone()));
        (assets, clip, vocal)
    }

    #[test]
    fn test_build_silences_every_device_output() {
        let primary = element("song.mp3", MediaKind::Audio, HeadlessSource::media(10.0));
        let (assets, clip, vocal) = registry();

        let graph = MixerGraph::build(&primary, &assets).unwrap();

        assert_eq!(graph.edge_count(), 3);
        assert!(graph.contains(PRIMARY_LABEL));
        assert!(graph.contains("slide:clip"));
        assert!(!primary.device_output());
        assert!(!clip.device_output());
        assert!(!vocal.device_output());
        assert!(graph.verify_exclusive().is_empty());
    }

    #[test]
    fn test_primary_without_capture_is_rejected() {
        let primary = element(
            "song.mp3",
            MediaKind::Audio,
            HeadlessSource::media(10.0).without_audio_capture(),
        );
        let err = MixerGraph::build(&primary, &AssetRegistry::new()).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_enforce_repairs_reenabled_output() {
        let primary = element("song.mp3", MediaKind::Audio, HeadlessSource::media(10.0));
        let (assets, clip, _) = registry();
        let graph = MixerGraph::build(&primary, &assets).unwrap();

        clip.set_device_output(true);
        assert_eq!(graph.verify_exclusive(), vec!["slide:clip".to_string()]);
        assert_eq!(graph.enforce_exclusive(), 1);
        assert!(graph.verify_exclusive().is_empty());
    }

    #[test]
    fn test_snapshot_gains_follow_mute_and_pause() {
        let primary = element("song.mp3", MediaKind::Audio, HeadlessSource::media(10.0));
        let (assets, clip, vocal) = registry();
        let graph = MixerGraph::build(&primary, &assets).unwrap();

        primary.play().unwrap();
        clip.play().unwrap();
        clip.set_muted(true);
        vocal.play().unwrap();
        vocal.set_volume(0.5);

        let mix = graph.snapshot();
        assert_eq!(mix.gain_of(PRIMARY_LABEL), Some(1.0));
        assert_eq!(mix.gain_of("slide:clip"), Some(0.0));
        assert_eq!(mix.gain_of("slide:vocal"), Some(0.5));
        assert_eq!(mix.gain_of("background"), None);
        assert!((mix.output_level() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let primary = element("song.mp3", MediaKind::Audio, HeadlessSource::media(10.0));
        let mut graph = MixerGraph::build(&primary, &AssetRegistry::new()).unwrap();
        graph.teardown();
        graph.teardown();
        assert_eq!(graph.edge_count(), 0);
    }
}
