//! Lyricap Capture Engine
//!
//! Drives a real-time playback pass of a lyric-video project and records
//! it. The primary track's playback position is the single clock every
//! layer is synchronized to.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    CaptureSession                      │
//! │  ┌───────────┐  ┌────────────┐  ┌───────────────────┐  │
//! │  │ Preloader │─▶│ MixerGraph │─▶│ Stream assembler  │  │
//! │  └───────────┘  └────────────┘  │ (codec, bitrate)  │  │
//! │                                 └─────────┬─────────┘  │
//! │                                           ▼            │
//! │  ┌──────────────────────────────────────────────────┐  │
//! │  │ RenderLoop: sync layers → paint → record frame   │  │
//! │  └──────────────────────────────────────────────────┘  │
//! └───────────────────────────┬────────────────────────────┘
//!                             ▼
//!                  Finalizer → ArtifactSink
//! ```
//!
//! Host capabilities (media elements, recorder, frame callback) sit behind
//! the traits in [`backend`]; [`backend::HeadlessBackend`] implements them
//! against a virtual clock.

pub mod assets;
pub mod backend;
pub mod mixer;
pub mod preload;
pub mod preview;
pub mod render_loop;
pub mod session;
pub mod stream;
pub mod sync;

pub use assets::{AssetHandle, AssetRegistry};
pub use mixer::{MixContribution, MixSnapshot, MixerGraph};
pub use preload::{PreloadReport, Preloader};
pub use preview::{run_preview, PreviewOptions, PreviewReport};
pub use render_loop::{CaptureProgress, LoopExit, ProgressCallback};
pub use session::*;
pub use stream::CodecProfile;
