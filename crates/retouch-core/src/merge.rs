//! Layer Merger: combines independently masked edit layers over a background.
//!
//! Each layer contributes `image · mask`; masks accumulate additively and are
//! clamped to full coverage once, after every layer is summed. The background
//! fills whatever coverage remains: `background · (1 − min(Σmask, 1))`.

use crate::mask::Mask;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::{Array2, Array3, Axis};
use std::borrow::Cow;

/// Merge `(image, mask)` layers over `background`.
///
/// Layers and masks whose size differs from the background are resized to
/// match. With no layers the background is returned unchanged. The result
/// does not depend on layer order.
pub fn merge_layers(layers: &[(RgbImage, Mask)], background: &RgbImage) -> RgbImage {
    if layers.is_empty() {
        return background.clone();
    }

    let (w, h) = background.dimensions();
    let mut weighted = Array3::<f32>::zeros((h as usize, w as usize, 3));
    let mut coverage = Array2::<f32>::zeros((h as usize, w as usize));

    for (image, mask) in layers {
        let image = fit_image(image, w, h);
        let mask = mask.fitted_to(w, h);

        let alpha = Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
            mask.get(x as u32, y as u32) as f32 / 255.0
        });
        let pixels = to_array(&image);

        weighted += &(&pixels * &alpha.view().insert_axis(Axis(2)));
        coverage += &alpha;
    }

    coverage.mapv_inplace(|m| m.min(1.0));
    let residual = coverage.mapv(|m| 1.0 - m).insert_axis(Axis(2));
    let merged = weighted + &(to_array(background) * &residual);

    RgbImage::from_fn(w, h, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb(std::array::from_fn(|c| {
            merged[[y, x, c]].round().clamp(0.0, 255.0) as u8
        }))
    })
}

fn fit_image(image: &RgbImage, width: u32, height: u32) -> Cow<'_, RgbImage> {
    if image.dimensions() == (width, height) {
        Cow::Borrowed(image)
    } else {
        tracing::debug!(
            from = ?image.dimensions(),
            to = ?(width, height),
            "resizing layer to match background"
        );
        Cow::Owned(imageops::resize(image, width, height, FilterType::Triangle))
    }
}

/// `(height, width, channel)` float view of an RGB image.
fn to_array(image: &RgbImage) -> Array3<f32> {
    let (w, h) = image.dimensions();
    Array3::from_shape_fn((h as usize, w as usize, 3), |(y, x, c)| {
        image.get_pixel(x as u32, y as u32)[c] as f32
    })
}
