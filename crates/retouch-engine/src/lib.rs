//! retouch-engine — Per-frame face retouching over retouch-core.
//!
//! Wraps host images as [`Frame`]s, loads the feature map and effect
//! settings once, and runs mask building, region analysis, compositing,
//! and layer merging for each frame through a [`FrameProcessor`].

pub mod config;
pub mod frame;
pub mod processor;

pub use config::{ComposeMode, RetouchConfig};
pub use frame::Frame;
pub use processor::{EngineError, FrameProcessor, FrameReport, REQUIRED_FEATURES};
