//! Colour-space conversions used by the region analyzer and compositor.
//!
//! Float variants work on channels in [0, 1] with hue in degrees [0, 360).
//! The 8-bit HSV variant packs hue as degrees / 2 so it fits in a byte.

use image::{Rgb, RgbImage};

/// Rec. 601 luma weights.
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// RGB → (hue°, saturation, value).
pub fn rgb_to_hsv(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max } else { 0.0 };
    [hue(r, g, b, max, delta), s, max]
}

/// (hue°, saturation, value) → RGB.
pub fn hsv_to_rgb(hsv: [f32; 3]) -> [f32; 3] {
    let [h, s, v] = hsv;
    let c = v * s;
    from_chroma(h, c, v - c)
}

/// RGB → (hue°, lightness, saturation).
pub fn rgb_to_hls(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let l = (max + min) / 2.0;

    let s = if delta == 0.0 {
        0.0
    } else if l < 0.5 {
        delta / (max + min)
    } else {
        delta / (2.0 - max - min)
    };
    [hue(r, g, b, max, delta), l, s]
}

/// (hue°, lightness, saturation) → RGB.
pub fn hls_to_rgb(hls: [f32; 3]) -> [f32; 3] {
    let [h, l, s] = hls;
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    from_chroma(h, c, l - c / 2.0)
}

fn hue(r: f32, g: f32, b: f32, max: f32, delta: f32) -> f32 {
    if delta == 0.0 {
        return 0.0;
    }
    let h = if max == r {
        60.0 * ((g - b) / delta)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    if h < 0.0 { h + 360.0 } else { h }
}

fn from_chroma(h: f32, c: f32, m: f32) -> [f32; 3] {
    let hp = (h.rem_euclid(360.0)) / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [r + m, g + m, b + m]
}

/// Normalise an 8-bit pixel to [0, 1] floats.
pub fn to_unit(px: Rgb<u8>) -> [f32; 3] {
    px.0.map(|c| c as f32 / 255.0)
}

/// Quantise [0, 1] floats back to an 8-bit pixel.
pub fn from_unit(rgb: [f32; 3]) -> Rgb<u8> {
    Rgb(rgb.map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8))
}

/// 8-bit HSV of one pixel: `[hue / 2, saturation * 255, value * 255]`.
pub fn hsv8(px: Rgb<u8>) -> [u8; 3] {
    let [h, s, v] = rgb_to_hsv(to_unit(px));
    [
        ((h / 2.0).round() as u32 % 180) as u8,
        (s * 255.0).round().clamp(0.0, 255.0) as u8,
        (v * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}

/// Convert a whole RGB image to packed 8-bit HSV.
pub fn hsv8_image(image: &RgbImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        Rgb(hsv8(*image.get_pixel(x, y)))
    })
}

/// Grayscale luminance of one pixel.
pub fn luminance(px: Rgb<u8>) -> u8 {
    let y: f32 = px
        .0
        .iter()
        .zip(LUMA_WEIGHTS)
        .map(|(&c, w)| c as f32 * w)
        .sum();
    y.round().clamp(0.0, 255.0) as u8
}
