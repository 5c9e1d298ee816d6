//! Clock and timing utilities for layer synchronization.
//!
//! The playback position of the primary track is the authoritative clock
//! during capture. This module provides the supporting pieces:
//! - A monotonic wall clock anchored at session start (for logs and pacing)
//! - Drift measurement between an expected and an actual media position
//! - A frame throttle that caps render work at a target FPS

use std::time::Instant;

/// A monotonic clock anchored to a fixed epoch (the moment it was started).
#[derive(Debug, Clone)]
pub struct WallClock {
    /// The instant the clock started.
    epoch: Instant,

    /// Wall-clock time at epoch (ISO 8601 string).
    epoch_wall: String,
}

impl WallClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Get seconds elapsed since the epoch.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at the epoch.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// Drift between where a media element should be and where it is.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Position the element should be at (seconds).
    pub expected_secs: f64,
    /// Position the element reports (seconds).
    pub actual_secs: f64,
}

impl DriftMeasurement {
    pub fn new(expected_secs: f64, actual_secs: f64) -> Self {
        Self {
            expected_secs,
            actual_secs,
        }
    }

    /// Drift in seconds (positive = element is ahead).
    pub fn drift_secs(&self) -> f64 {
        self.actual_secs - self.expected_secs
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_secs() * 1_000.0
    }

    /// Whether drift exceeds the tolerance (strictly greater).
    pub fn exceeds(&self, tolerance_secs: f64) -> bool {
        self.drift_secs().abs() > tolerance_secs
    }
}

/// Caps render work at a target frame rate while the driving callback may
/// fire faster.
///
/// The remainder of each elapsed interval is carried into the next one, so
/// a 60 Hz callback throttled to 30 FPS renders every second callback
/// instead of slipping to 20 FPS on rounding.
#[derive(Debug)]
pub struct FrameThrottle {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
    rendered: u64,
    skipped: u64,
}

impl FrameThrottle {
    /// Create a throttle targeting the given FPS.
    pub fn new(target_fps: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / target_fps.max(1) as u64,
            last_tick_ns: None,
            rendered: 0,
            skipped: 0,
        }
    }

    /// Check if enough time has passed for the next frame.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_render(&mut self, current_ns: u64) -> bool {
        let ready = match self.last_tick_ns {
            None => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            Some(last) if current_ns >= last.saturating_add(self.target_interval_ns) => {
                let elapsed = current_ns - last;
                self.last_tick_ns = Some(current_ns - elapsed % self.target_interval_ns);
                true
            }
            _ => false,
        };

        if ready {
            self.rendered += 1;
        } else {
            self.skipped += 1;
        }
        ready
    }

    /// Callbacks that produced a frame.
    pub fn frames_rendered(&self) -> u64 {
        self.rendered
    }

    /// Callbacks that were throttled away.
    pub fn frames_skipped(&self) -> u64 {
        self.skipped
    }
}
