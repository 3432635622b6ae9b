use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upward padding bias applied to the face box's top edge.
pub const FACE_BOX_TOP_BIAS: f32 = 0.9;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("invalid landmark payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coordinate convention of a landmark sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSpace {
    /// x and y in [0, 1], relative to image width and height.
    Normalized,
    /// x and y already in pixels.
    Pixel,
}

/// A single facial keypoint as produced by the upstream landmark detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    /// Visibility confidence in [0, 1], if the detector reports it.
    #[serde(default)]
    pub visibility: Option<f32>,
    /// Presence confidence in [0, 1], if the detector reports it.
    #[serde(default)]
    pub presence: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            visibility: None,
            presence: None,
        }
    }
}

/// Ordered landmark sequence for one detected face.
///
/// Index positions follow the upstream detector's convention; the sequence
/// is never reordered or mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmarks {
    pub space: CoordinateSpace,
    pub points: Vec<Landmark>,
}

impl Landmarks {
    pub fn new(space: CoordinateSpace, points: Vec<Landmark>) -> Self {
        Self { space, points }
    }

    pub fn normalized(points: Vec<Landmark>) -> Self {
        Self::new(CoordinateSpace::Normalized, points)
    }

    pub fn pixel(points: Vec<Landmark>) -> Self {
        Self::new(CoordinateSpace::Pixel, points)
    }

    /// Parse a `{"space": "...", "points": [...]}` payload.
    pub fn from_json(payload: &str) -> Result<Self, LandmarkError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Landmark `index` in (unrounded) pixel coordinates for a `width`×`height` image.
    pub fn pixel_position(&self, index: usize, width: u32, height: u32) -> Option<(f32, f32)> {
        let lm = self.points.get(index)?;
        Some(match self.space {
            CoordinateSpace::Normalized => (lm.x * width as f32, lm.y * height as f32),
            CoordinateSpace::Pixel => (lm.x, lm.y),
        })
    }

    /// Landmark `index` as an integer pixel coordinate.
    ///
    /// Normalized inputs outside [0, 1] yield coordinates outside the image;
    /// that is not an error here.
    pub fn pixel_point(&self, index: usize, width: u32, height: u32) -> Option<(i32, i32)> {
        self.pixel_position(index, width, height)
            .map(|(x, y)| (x.round() as i32, y.round() as i32))
    }
}

/// Axis-aligned face bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    /// False for empty or zero-area boxes; dependent edits must skip.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.width() > 0.0
            && self.height() > 0.0
    }

    /// `(min_x, min_y, max_x, max_y)`.
    pub fn as_tuple(&self) -> (f32, f32, f32, f32) {
        (self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

/// Integer rectangle inside an image, used for cropped edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Grow by `fraction` of the width/height on every side, clamped to
    /// a `bound_width`×`bound_height` image.
    pub fn expand(&self, fraction: f32, bound_width: u32, bound_height: u32) -> PixelRect {
        let dx = (self.width as f32 * fraction).round() as u32;
        let dy = (self.height as f32 * fraction).round() as u32;
        let x0 = self.x.saturating_sub(dx).min(bound_width);
        let y0 = self.y.saturating_sub(dy).min(bound_height);
        let x1 = (self.x + self.width + dx).min(bound_width);
        let y1 = (self.y + self.height + dy).min(bound_height);
        PixelRect {
            x: x0,
            y: y0,
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
        }
    }
}
