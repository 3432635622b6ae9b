//! Region Analyzer: face bounding box and adaptive forehead skin mask.

use crate::color;
use crate::filter;
use crate::mask::Mask;
use crate::types::{FaceBox, Landmarks, FACE_BOX_TOP_BIAS};
use image::{GrayImage, Luma, RgbImage};

/// Square neighbourhood radius for speckle removal (3×3).
const CLEANUP_RADIUS: u8 = 1;
/// Erode and dilate passes for speckle removal.
const CLEANUP_ITERATIONS: u8 = 2;

/// Bounding box over every landmark, with the top edge biased upward.
///
/// An empty landmark set yields an invalid box (min > max); check
/// [`FaceBox::is_valid`] before using it.
pub fn compute_face_box(landmarks: &Landmarks, width: u32, height: u32) -> FaceBox {
    let mut face_box = FaceBox {
        min_x: f32::INFINITY,
        min_y: f32::INFINITY,
        max_x: f32::NEG_INFINITY,
        max_y: f32::NEG_INFINITY,
    };
    for i in 0..landmarks.len() {
        if let Some((x, y)) = landmarks.pixel_position(i, width, height) {
            face_box.min_x = face_box.min_x.min(x);
            face_box.min_y = face_box.min_y.min(y);
            face_box.max_x = face_box.max_x.max(x);
            face_box.max_y = face_box.max_y.max(y);
        }
    }
    face_box.min_y *= FACE_BOX_TOP_BIAS;
    face_box
}

/// Inclusive per-channel colour bounds.
type ColorRange = ([u8; 3], [u8; 3]);

/// Skin-coloured region of the forehead, grown from a coarse seed polygon.
///
/// The HSV colour range of the pixels under `seed` is measured row by row,
/// the rows are reduced to one global range, and the whole image is
/// thresholded against it. After speckle cleanup the result is kept only
/// inside `[face_box_min_y, max_y] × [min_x, max_x]` of the cleaned mask's
/// extent. An empty seed or an empty threshold result yields an all-zero mask.
pub fn predict_forehead_mask(image: &RgbImage, seed: &Mask, face_box_min_y: f32) -> Mask {
    let (w, h) = image.dimensions();
    let seed = seed.fitted_to(w, h);
    let hsv = color::hsv8_image(image);

    let row_ranges: Vec<Option<ColorRange>> = (0..h).map(|y| row_range(&hsv, &seed, y)).collect();

    let Some((lower, upper)) = row_ranges.iter().flatten().copied().reduce(merge_ranges) else {
        tracing::debug!("forehead seed mask is empty; skipping skin prediction");
        return Mask::new(w, h);
    };
    tracing::trace!(?lower, ?upper, "forehead skin colour range");

    let candidate = GrayImage::from_fn(w, h, |x, y| {
        let px = hsv.get_pixel(x, y).0;
        let inside = (0..3).all(|c| lower[c] <= px[c] && px[c] <= upper[c]);
        Luma([if inside { 255 } else { 0 }])
    });
    let cleaned = filter::dilate(
        &filter::erode(&candidate, CLEANUP_RADIUS, CLEANUP_ITERATIONS),
        CLEANUP_RADIUS,
        CLEANUP_ITERATIONS,
    );

    let Some((min_x, max_x, max_y)) = extent(&cleaned) else {
        tracing::debug!("no skin pixels left after cleanup");
        return Mask::new(w, h);
    };

    let top = face_box_min_y.max(0.0).floor() as u32;
    let mut out = GrayImage::new(w, h);
    for y in top..=max_y.min(h.saturating_sub(1)) {
        for x in min_x..=max_x {
            out.put_pixel(x, y, *cleaned.get_pixel(x, y));
        }
    }
    Mask::from_gray(out)
}

/// Per-channel min/max of row `y` over pixels where the seed is nonzero.
fn row_range(hsv: &RgbImage, seed: &Mask, y: u32) -> Option<ColorRange> {
    (0..hsv.width())
        .filter(|&x| seed.get(x, y) > 0)
        .map(|x| {
            let px = hsv.get_pixel(x, y).0;
            (px, px)
        })
        .reduce(merge_ranges)
}

fn merge_ranges(a: ColorRange, b: ColorRange) -> ColorRange {
    (
        std::array::from_fn(|c| a.0[c].min(b.0[c])),
        std::array::from_fn(|c| a.1[c].max(b.1[c])),
    )
}

/// `(min_x, max_x, max_y)` of nonzero pixels.
fn extent(mask: &GrayImage) -> Option<(u32, u32, u32)> {
    mask.enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 0)
        .fold(None, |acc, (x, y, _)| match acc {
            None => Some((x, x, y)),
            Some((lo, hi, my)) => Some((lo.min(x), hi.max(x), my.max(y))),
        })
}
