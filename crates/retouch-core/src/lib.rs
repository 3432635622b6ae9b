//! retouch-core — Facial-region masks and alpha compositing.
//!
//! Turns named groups of face landmarks into coverage masks, derives the
//! face box and an adaptive forehead skin mask from them, and composites
//! localized edits (smoothing, lip tint, whitening) back into the source
//! image. Independently masked edit layers can be merged over a background.

pub mod color;
pub mod composite;
pub mod features;
pub mod filter;
pub mod mask;
pub mod merge;
pub mod region;
pub mod types;

pub use composite::{
    apply_channel_adjustment, apply_smoothing, apply_tint, EditOutcome, SkipReason,
    SmoothingParams, TintParams, WhitenParams,
};
pub use features::{ConfigError, FeatureIndexSet, FeatureMap};
pub use mask::{build_all_masks, build_mask, build_masks, Mask};
pub use merge::merge_layers;
pub use region::{compute_face_box, predict_forehead_mask};
pub use types::{CoordinateSpace, FaceBox, Landmark, LandmarkError, Landmarks, PixelRect};
