//! Mask Builder: rasterizes landmark polygons into coverage masks.
//!
//! A feature's landmarks are converted to integer pixel points and filled as
//! one closed polygon (even-odd rule) with anti-aliased edges. Coverage is
//! quantised to 8 bits, 255 meaning fully inside.

use crate::features::{ConfigError, FeatureIndexSet, FeatureMap};
use crate::types::{Landmarks, PixelRect};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Vertical sub-scanlines per pixel row for edge anti-aliasing.
const SUBSAMPLES: usize = 4;

/// Single-channel coverage buffer: 0 = excluded, 255 = fully included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    buf: GrayImage,
}

impl Mask {
    /// All-zero mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: GrayImage::new(width, height),
        }
    }

    pub fn from_gray(buf: GrayImage) -> Self {
        Self { buf }
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.buf
    }

    pub fn into_gray(self) -> GrayImage {
        self.buf
    }

    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buf.dimensions()
    }

    /// Coverage at `(x, y)`; 0 outside the buffer.
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.buf.get_pixel_checked(x, y).map_or(0, |p| p.0[0])
    }

    /// True when no pixel has any coverage ("feature not present").
    pub fn is_empty(&self) -> bool {
        self.buf.as_raw().iter().all(|&v| v == 0)
    }

    /// Number of pixels with nonzero coverage.
    pub fn coverage(&self) -> usize {
        self.buf.as_raw().iter().filter(|&&v| v > 0).count()
    }

    /// Tight bounding rectangle of nonzero pixels, or `None` when empty.
    pub fn bounding_rect(&self) -> Option<PixelRect> {
        let mut min = (u32::MAX, u32::MAX);
        let mut max = (0u32, 0u32);
        let mut found = false;
        for (x, y, p) in self.buf.enumerate_pixels() {
            if p.0[0] == 0 {
                continue;
            }
            found = true;
            min = (min.0.min(x), min.1.min(y));
            max = (max.0.max(x), max.1.max(y));
        }
        found.then(|| PixelRect {
            x: min.0,
            y: min.1,
            width: max.0 - min.0 + 1,
            height: max.1 - min.1 + 1,
        })
    }

    /// This mask at `width`×`height`, bilinearly resized only when the size differs.
    pub fn fitted_to(&self, width: u32, height: u32) -> Cow<'_, Mask> {
        if self.dimensions() == (width, height) {
            Cow::Borrowed(self)
        } else {
            tracing::debug!(
                from = ?self.dimensions(),
                to = ?(width, height),
                "resizing mask to match image"
            );
            Cow::Owned(Mask::from_gray(imageops::resize(
                &self.buf,
                width,
                height,
                FilterType::Triangle,
            )))
        }
    }

    /// Per-pixel maximum of both masks. `other` is resized to match if needed.
    pub fn union(&self, other: &Mask) -> Mask {
        self.combine(other, |a, b| a.max(b))
    }

    /// Remove `other`'s coverage from this mask (saturating).
    pub fn subtract(&self, other: &Mask) -> Mask {
        self.combine(other, |a, b| a.saturating_sub(b))
    }

    fn combine(&self, other: &Mask, op: impl Fn(u8, u8) -> u8) -> Mask {
        let other = other.fitted_to(self.width(), self.height());
        let mut out = self.buf.clone();
        for (dst, &src) in out.iter_mut().zip(other.buf.as_raw().iter()) {
            *dst = op(*dst, src);
        }
        Mask::from_gray(out)
    }

    /// Copy of the pixels inside `rect`.
    pub fn crop(&self, rect: PixelRect) -> GrayImage {
        imageops::crop_imm(&self.buf, rect.x, rect.y, rect.width, rect.height).to_image()
    }
}

/// Rasterize one feature polygon into a `width`×`height` mask.
///
/// Returns an all-zero mask when any index is missing from `landmarks`.
pub fn build_mask(
    feature: &FeatureIndexSet,
    landmarks: &Landmarks,
    width: u32,
    height: u32,
) -> Mask {
    let points: Vec<(i32, i32)> = feature
        .indices
        .iter()
        .filter_map(|&i| landmarks.pixel_point(i, width, height))
        .collect();

    let mut mask = Mask::new(width, height);
    if points.len() != feature.indices.len() {
        tracing::debug!(
            feature = %feature.name,
            visited = points.len(),
            expected = feature.indices.len(),
            landmarks = landmarks.len(),
            "landmark count mismatch; feature treated as absent"
        );
        return mask;
    }

    fill_polygon(&mut mask.buf, &points);
    mask
}

/// Build several named masks in one pass.
pub fn build_masks(
    features: &FeatureMap,
    names: &[&str],
    landmarks: &Landmarks,
    width: u32,
    height: u32,
) -> Result<BTreeMap<String, Mask>, ConfigError> {
    names
        .iter()
        .map(|&name| {
            let feature = features.feature(name)?;
            Ok((name.to_string(), build_mask(feature, landmarks, width, height)))
        })
        .collect()
}

/// Build a mask for every feature in the map.
pub fn build_all_masks(
    features: &FeatureMap,
    landmarks: &Landmarks,
    width: u32,
    height: u32,
) -> BTreeMap<String, Mask> {
    features
        .names()
        .filter_map(|name| features.get(name))
        .map(|f| (f.name.clone(), build_mask(f, landmarks, width, height)))
        .collect()
}

/// Even-odd scan fill with fractional horizontal coverage and
/// [`SUBSAMPLES`] sub-scanlines per row.
fn fill_polygon(buf: &mut GrayImage, poly: &[(i32, i32)]) {
    let (w, h) = buf.dimensions();
    if poly.len() < 3 || w == 0 || h == 0 {
        return;
    }

    let min_y = poly.iter().map(|p| p.1).min().unwrap_or(0).max(0);
    let max_y = poly.iter().map(|p| p.1).max().unwrap_or(0).min(h as i32);

    let mut row = vec![0.0f32; w as usize];
    let mut crossings: Vec<f32> = Vec::with_capacity(poly.len());
    let weight = 1.0 / SUBSAMPLES as f32;

    for y in min_y..max_y {
        row.fill(0.0);

        for s in 0..SUBSAMPLES {
            let sy = y as f32 + (s as f32 + 0.5) * weight;
            crossings.clear();

            for (i, &(x0, y0)) in poly.iter().enumerate() {
                let (x1, y1) = poly[(i + 1) % poly.len()];
                let (x0, y0, x1, y1) = (x0 as f32, y0 as f32, x1 as f32, y1 as f32);
                if (y0 <= sy && sy < y1) || (y1 <= sy && sy < y0) {
                    crossings.push(x0 + (sy - y0) * (x1 - x0) / (y1 - y0));
                }
            }
            crossings.sort_by(|a, b| a.total_cmp(b));

            for span in crossings.chunks_exact(2) {
                accumulate_span(&mut row, span[0], span[1], weight);
            }
        }

        for (x, &c) in row.iter().enumerate() {
            if c > 0.0 {
                let v = (c * 255.0).round().clamp(0.0, 255.0) as u8;
                buf.put_pixel(x as u32, y as u32, Luma([v]));
            }
        }
    }
}

/// Add `weight` × the covered fraction of each pixel in `[xa, xb)`.
fn accumulate_span(row: &mut [f32], xa: f32, xb: f32, weight: f32) {
    let width = row.len() as f32;
    let xa = xa.clamp(0.0, width);
    let xb = xb.clamp(0.0, width);
    if xb <= xa {
        return;
    }

    let ia = xa.floor() as usize;
    let ib = xb.floor() as usize;
    if ia == ib {
        row[ia] += (xb - xa) * weight;
        return;
    }

    row[ia] += (ia as f32 + 1.0 - xa) * weight;
    for v in &mut row[ia + 1..ib] {
        *v += weight;
    }
    if ib < row.len() {
        row[ib] += (xb - ib as f32) * weight;
    }
}
