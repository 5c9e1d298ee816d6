//! Lyricap Render Engine
//!
//! Everything on the output side of a capture session: the drawing
//! surface the frame renderer paints, the renderer contract itself, the
//! WebM container writer and duration repair, and the finalizer that turns
//! recorded chunks into a delivered file.
//!
//! # Output Path
//!
//! ```text
//! FrameRenderer ──paints──▶ Surface ──sampled per frame──▶ Recorder
//!                                                              │
//!                                              ordered chunks  ▼
//!                                                   ┌────────────────────┐
//!                                                   │ Finalizer          │
//!                                                   │  concat            │
//!                                                   │  WebM duration fix │
//!                                                   └─────────┬──────────┘
//!                                                             ▼
//!                                              ArtifactSink (title_16x9_1080p.webm)
//! ```

pub mod compositor;
pub mod export;
pub mod renderer;
pub mod webm;

pub use compositor::*;
pub use export::*;
pub use renderer::*;
