//! Lyricap Project Model
//!
//! Defines the core data contracts for Lyricap projects:
//! - **Slides:** Timed image, video, and incidental-audio layer items
//! - **Timeline:** The ordered slide list and its layering invariants
//! - **Lyrics:** Time-synchronized lyric lines
//! - **Project:** Metadata, render style, primary track, and snapshots
//! - **Export:** Resolution, aspect ratio, frame rate, and quality parameters
//!
//! All times are in seconds on the primary track's timeline. Intervals are
//! half-open: a slide covering `[start, end)` is not active at `end`.

pub mod export;
pub mod lyrics;
pub mod project;
pub mod slide;
pub mod timeline;

pub use export::*;
pub use lyrics::*;
pub use project::*;
pub use slide::*;
pub use timeline::*;
