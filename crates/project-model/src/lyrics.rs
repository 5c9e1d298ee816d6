//! Time-synchronized lyric lines.

use serde::{Deserialize, Serialize};

/// One lyric line with its display interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    /// Display start (inclusive).
    pub start_secs: f64,
    /// Display end (exclusive).
    pub end_secs: f64,
    /// Line text.
    pub text: String,
}

impl LyricLine {
    pub fn new(start_secs: f64, end_secs: f64, text: impl Into<String>) -> Self {
        Self {
            start_secs,
            end_secs,
            text: text.into(),
        }
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_secs && t < self.end_secs
    }

    /// How far through the line `t` is, in `[0.0, 1.0]`.
    pub fn progress_at(&self, t: f64) -> f64 {
        let span = self.end_secs - self.start_secs;
        if span <= 0.0 {
            return 1.0;
        }
        ((t - self.start_secs) / span).clamp(0.0, 1.0)
    }
}

/// The line displayed at `t`, with its index.
///
/// Lines may overlap when a parser emits overlapping timings; the latest
/// starting line wins so the newest lyric is shown.
pub fn active_line(lines: &[LyricLine], t: f64) -> Option<(usize, &LyricLine)> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.contains(t))
        .max_by(|(_, a), (_, b)| a.start_secs.total_cmp(&b.start_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<LyricLine> {
        vec![
            LyricLine::new(0.0, 2.0, "first"),
            LyricLine::new(2.0, 4.0, "second"),
            LyricLine::new(3.5, 6.0, "third"),
        ]
    }

    #[test]
    fn test_active_line_lookup() {
        let lines = sample();
        assert_eq!(active_line(&lines, 1.0).unwrap().1.text, "first");
        assert_eq!(active_line(&lines, 2.0).unwrap().0, 1);
        assert!(active_line(&lines, 6.0).is_none());
    }

    #[test]
    fn test_overlap_prefers_latest_start() {
        let lines = sample();
        assert_eq!(active_line(&lines, 3.75).unwrap().1.text, "third");
    }

    #[test]
    fn test_progress_is_clamped() {
        let line = LyricLine::new(2.0, 4.0, "x");
        assert_eq!(line.progress_at(1.0), 0.0);
        assert!((line.progress_at(3.0) - 0.5).abs() < 1e-9);
        assert_eq!(line.progress_at(9.0), 1.0);
    }
}
