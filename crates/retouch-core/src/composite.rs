//! Feature Compositor: localized edits written back into the source image.
//!
//! Every edit crops to the bounding rectangle of its mask (the whitening
//! edit adds a margin), works on that crop, and writes the result back
//! through a mutable sub-image view. Pixels outside the crop are never
//! touched. An empty mask or a degenerate region makes the edit a no-op.

use crate::color;
use crate::filter;
use crate::mask::Mask;
use crate::types::PixelRect;
use image::{GenericImage, GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};
use serde::Serialize;

// --- Named constants ---
const SMOOTHING_DIAMETER: u32 = 12;
const SMOOTHING_SIGMA: f32 = 50.0;
/// Weight of the smoothed pixels; the original keeps the remainder.
const SMOOTHING_BLEND: f32 = 0.85;
const TINT_INTENSITY: f32 = 20.0;
const WHITEN_STRENGTH: f32 = 0.3;
/// Regions flatter than this height/width ratio are not whitened.
const WHITEN_MIN_ASPECT: f32 = 0.17;
const WHITEN_MARGIN: f32 = 0.1;
/// 7×7 neighbourhood.
const WHITEN_ERODE_RADIUS: u8 = 3;
const WHITEN_ERODE_ITERATIONS: u8 = 3;
const WHITEN_BLUR_KERNEL: u32 = 51;

/// Why an edit left the image untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// The mask has no coverage.
    EmptyMask,
    /// The crop rectangle has no area.
    DegenerateRegion,
    /// The region is too flat (height/width at or below the threshold).
    FlatRegion,
    /// Nothing survived the interior erosion.
    ErodedAway,
}

/// Result of one compositing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EditOutcome {
    Applied { region: PixelRect },
    Skipped(SkipReason),
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied { .. })
    }
}

/// Bilateral smoothing blend parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    pub diameter: u32,
    pub sigma_color: f32,
    pub sigma_space: f32,
    /// Share of the smoothed image in the blend, in [0, 1].
    pub blend: f32,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            diameter: SMOOTHING_DIAMETER,
            sigma_color: SMOOTHING_SIGMA,
            sigma_space: SMOOTHING_SIGMA,
            blend: SMOOTHING_BLEND,
        }
    }
}

/// Colour-tint blend parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TintParams {
    pub color: Rgb<u8>,
    /// Scale applied to the coverage before the alpha is normalised to [0, 1].
    pub intensity: f32,
}

impl Default for TintParams {
    fn default() -> Self {
        Self {
            color: Rgb([200, 30, 60]),
            intensity: TINT_INTENSITY,
        }
    }
}

/// Desaturate-then-lighten parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhitenParams {
    /// Fraction of the soft mask removed from saturation and added to lightness.
    pub strength: f32,
    pub min_aspect: f32,
    /// Margin added on every side of the mask's bounding box, as a fraction of its size.
    pub margin: f32,
}

impl Default for WhitenParams {
    fn default() -> Self {
        Self {
            strength: WHITEN_STRENGTH,
            min_aspect: WHITEN_MIN_ASPECT,
            margin: WHITEN_MARGIN,
        }
    }
}

/// Bounding rectangle of `mask`, or the reason there is none.
fn mask_region(mask: &Mask) -> Result<PixelRect, SkipReason> {
    let rect = mask.bounding_rect().ok_or(SkipReason::EmptyMask)?;
    if rect.is_empty() {
        return Err(SkipReason::DegenerateRegion);
    }
    Ok(rect)
}

/// Blend a bilateral-smoothed copy into every pixel under `mask`:
/// `blend · smoothed + (1 − blend) · original`.
pub fn apply_smoothing(image: &mut RgbImage, mask: &Mask, params: &SmoothingParams) -> EditOutcome {
    let (w, h) = image.dimensions();
    let mask = mask.fitted_to(w, h);
    let rect = match mask_region(&mask) {
        Ok(rect) => rect,
        Err(reason) => return EditOutcome::Skipped(reason),
    };

    let mut view = image.sub_image(rect.x, rect.y, rect.width, rect.height);
    let original = view.to_image();
    let smoothed = filter::bilateral_filter(
        &original,
        params.diameter,
        params.sigma_color,
        params.sigma_space,
    );

    let keep = 1.0 - params.blend;
    for (x, y, px) in original.enumerate_pixels() {
        if mask.get(rect.x + x, rect.y + y) == 0 {
            continue;
        }
        let s = smoothed.get_pixel(x, y);
        let blended = Rgb(std::array::from_fn(|c| {
            (params.blend * s[c] as f32 + keep * px[c] as f32)
                .round()
                .min(255.0) as u8
        }));
        view.put_pixel(x, y, blended);
    }

    tracing::debug!(?rect, "smoothing applied");
    EditOutcome::Applied { region: rect }
}

/// Tint the pixels under `mask` toward `params.color`.
///
/// The tint layer's alpha is `coverage · intensity`, normalised to [0, 1],
/// and composited "over" the original. Only pixels inside the mask whose
/// tinted luminance is nonzero are written. The edit compounds: applying it
/// twice tints twice as far.
pub fn apply_tint(image: &mut RgbImage, mask: &Mask, params: &TintParams) -> EditOutcome {
    let (w, h) = image.dimensions();
    let mask = mask.fitted_to(w, h);
    let rect = match mask_region(&mask) {
        Ok(rect) => rect,
        Err(reason) => return EditOutcome::Skipped(reason),
    };

    let [r, g, b] = params.color.0;
    let layer = RgbaImage::from_fn(rect.width, rect.height, |x, y| {
        let coverage = mask.get(rect.x + x, rect.y + y) as f32 / 255.0;
        let alpha = (coverage * params.intensity).round().clamp(0.0, 255.0) as u8;
        Rgba([r, g, b, alpha])
    });

    let mut view = image.sub_image(rect.x, rect.y, rect.width, rect.height);
    for (x, y, tint) in layer.enumerate_pixels() {
        if mask.get(rect.x + x, rect.y + y) == 0 {
            continue;
        }
        let alpha = tint[3] as f32 / 255.0;
        let original = view.get_pixel(x, y);
        let tinted = Rgb(std::array::from_fn(|c| {
            (tint[c] as f32 * alpha + original[c] as f32 * (1.0 - alpha))
                .round()
                .clamp(0.0, 255.0) as u8
        }));
        if color::luminance(tinted) == 0 {
            continue;
        }
        view.put_pixel(x, y, tinted);
    }

    tracing::debug!(?rect, color = ?params.color.0, "tint applied");
    EditOutcome::Applied { region: rect }
}

/// Whiten the region under `mask`: lower saturation, then raise lightness,
/// both by `strength` × a soft interior mask.
///
/// Works on the mask's bounding box grown by `margin` on every side. Skipped
/// when the box is too flat to edit safely.
pub fn apply_channel_adjustment(
    image: &mut RgbImage,
    mask: &Mask,
    params: &WhitenParams,
) -> EditOutcome {
    let (w, h) = image.dimensions();
    let mask = mask.fitted_to(w, h);
    let bounds = match mask_region(&mask) {
        Ok(rect) => rect,
        Err(reason) => return EditOutcome::Skipped(reason),
    };

    let aspect = bounds.height as f32 / bounds.width as f32;
    if aspect <= params.min_aspect {
        tracing::debug!(aspect, "region too flat for whitening");
        return EditOutcome::Skipped(SkipReason::FlatRegion);
    }

    let rect = bounds.expand(params.margin, w, h);
    if rect.is_empty() {
        return EditOutcome::Skipped(SkipReason::DegenerateRegion);
    }

    let eroded = filter::erode(&mask.crop(rect), WHITEN_ERODE_RADIUS, WHITEN_ERODE_ITERATIONS);
    let soft = filter::gaussian_blur(&eroded, WHITEN_BLUR_KERNEL);

    let mut view = image.sub_image(rect.x, rect.y, rect.width, rect.height);
    let mut touched = 0usize;
    for (x, y, m) in soft.enumerate_pixels() {
        if m.0[0] == 0 {
            continue;
        }
        let amount = m.0[0] as f32 / 255.0 * params.strength;

        let [hue, sat, val] = color::rgb_to_hsv(color::to_unit(view.get_pixel(x, y)));
        let desaturated = color::hsv_to_rgb([hue, (sat - amount).clamp(0.0, 1.0), val]);

        let [hue, light, sat] = color::rgb_to_hls(desaturated);
        let lightened = color::hls_to_rgb([hue, (light + amount).clamp(0.0, 1.0), sat]);

        view.put_pixel(x, y, color::from_unit(lightened));
        touched += 1;
    }

    if touched == 0 {
        tracing::debug!(?rect, "whitening mask eroded away");
        return EditOutcome::Skipped(SkipReason::ErodedAway);
    }
    tracing::debug!(?rect, touched, "whitening applied");
    EditOutcome::Applied { region: rect }
}
