//! The slide timeline and its layering invariants.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::slide::{Slide, SlideKind};

/// Ordered list of slides making up the visual and incidental-audio layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub slides: Vec<Slide>,
}

/// Problems that make a timeline unusable for export.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimelineError {
    #[error("Duplicate slide id: {id}")]
    DuplicateId { id: String },

    #[error("Slide {id} has an empty or inverted interval [{start}, {end})")]
    EmptyInterval { id: String, start: f64, end: f64 },

    #[error("Slide {id} volume {volume} is outside [0, 1]")]
    VolumeOutOfRange { id: String, volume: f32 },

    #[error("Visual slides {first} and {second} overlap")]
    VisualOverlap { first: String, second: String },
}

impl Timeline {
    pub fn new(slides: Vec<Slide>) -> Self {
        Self { slides }
    }

    /// Check every invariant the capture pipeline relies on.
    ///
    /// At most one image/video slide may be active at any instant; audio
    /// slides are unconstrained.
    pub fn validate(&self) -> Result<(), TimelineError> {
        let mut seen = HashSet::new();
        for slide in &self.slides {
            if !seen.insert(slide.id.as_str()) {
                return Err(TimelineError::DuplicateId {
                    id: slide.id.clone(),
                });
            }
            if !(slide.start_secs < slide.end_secs) || slide.start_secs < 0.0 {
                return Err(TimelineError::EmptyInterval {
                    id: slide.id.clone(),
                    start: slide.start_secs,
                    end: slide.end_secs,
                });
            }
            if !(0.0..=1.0).contains(&slide.volume) {
                return Err(TimelineError::VolumeOutOfRange {
                    id: slide.id.clone(),
                    volume: slide.volume,
                });
            }
        }

        let mut visual: Vec<&Slide> = self.visual_slides().collect();
        visual.sort_by(|a, b| a.start_secs.total_cmp(&b.start_secs));
        for pair in visual.windows(2) {
            if pair[0].overlaps(pair[1]) {
                return Err(TimelineError::VisualOverlap {
                    first: pair[0].id.clone(),
                    second: pair[1].id.clone(),
                });
            }
        }

        Ok(())
    }

    /// Image and video slides.
    pub fn visual_slides(&self) -> impl Iterator<Item = &Slide> {
        self.slides.iter().filter(|s| s.is_visual())
    }

    pub fn video_slides(&self) -> impl Iterator<Item = &Slide> {
        self.slides.iter().filter(|s| s.kind == SlideKind::Video)
    }

    pub fn audio_slides(&self) -> impl Iterator<Item = &Slide> {
        self.slides.iter().filter(|s| s.kind == SlideKind::Audio)
    }

    /// The primary visual slide whose interval contains `t`, if any.
    ///
    /// On a timeline that fails [`Timeline::validate`] the earliest-starting
    /// match wins.
    pub fn active_visual_at(&self, t: f64) -> Option<&Slide> {
        self.visual_slides()
            .filter(|s| s.contains(t))
            .min_by(|a, b| a.start_secs.total_cmp(&b.start_secs))
    }

    /// Latest end time over all slides (0 when empty).
    pub fn end_secs(&self) -> f64 {
        self.slides
            .iter()
            .map(|s| s.end_secs)
            .fold(0.0_f64, f64::max)
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }
}
