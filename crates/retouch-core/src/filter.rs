//! Pixel filters: edge-preserving bilateral smoothing, square-neighbourhood
//! morphology, and kernel-sized Gaussian blur.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology;

/// Edge-preserving bilateral filter over an RGB image.
///
/// `diameter` is the neighbourhood width; pixels farther than `diameter / 2`
/// from the centre do not contribute. Colour distance is the sum of absolute
/// channel differences. Neighbours outside the image are skipped.
pub fn bilateral_filter(
    image: &RgbImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> RgbImage {
    let radius = (diameter / 2).max(1) as i32;
    let (w, h) = (image.width() as i32, image.height() as i32);

    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let color_coeff = -0.5 / (sigma_color * sigma_color);

    // Circular window with precomputed spatial weights
    let mut window = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f32;
            if r2.sqrt() <= radius as f32 {
                window.push((dx, dy, (r2 * space_coeff).exp()));
            }
        }
    }

    // Colour weight lookup indexed by L1 distance (0..=765)
    let color_lut: Vec<f32> = (0..=255 * 3)
        .map(|d| {
            let d = d as f32;
            (d * d * color_coeff).exp()
        })
        .collect();

    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let center = image.get_pixel(x, y).0;
        let mut sum = [0.0f32; 3];
        let mut weight_sum = 0.0f32;

        for &(dx, dy, spatial) in &window {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            let px = image.get_pixel(nx as u32, ny as u32).0;
            let dist: usize = px
                .iter()
                .zip(center.iter())
                .map(|(&a, &b)| a.abs_diff(b) as usize)
                .sum();
            let weight = spatial * color_lut[dist];
            for c in 0..3 {
                sum[c] += px[c] as f32 * weight;
            }
            weight_sum += weight;
        }

        if weight_sum > 0.0 {
            Rgb(sum.map(|s| (s / weight_sum).round().clamp(0.0, 255.0) as u8))
        } else {
            Rgb(center)
        }
    })
}

/// Erode a binary mask with a square `(2·radius+1)²` neighbourhood, `iterations` times.
///
/// Any nonzero pixel is treated as foreground; output is 0/255.
pub fn erode(mask: &GrayImage, radius: u8, iterations: u8) -> GrayImage {
    morphology::erode(mask, Norm::LInf, radius.saturating_mul(iterations))
}

/// Dilate a binary mask with a square `(2·radius+1)²` neighbourhood, `iterations` times.
pub fn dilate(mask: &GrayImage, radius: u8, iterations: u8) -> GrayImage {
    morphology::dilate(mask, Norm::LInf, radius.saturating_mul(iterations))
}

/// Sigma for a Gaussian kernel of the given odd size (the usual
/// `0.3·((k − 1)/2 − 1) + 0.8` rule).
pub fn kernel_sigma(kernel_size: u32) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Gaussian blur sized by kernel width rather than sigma.
pub fn gaussian_blur(mask: &GrayImage, kernel_size: u32) -> GrayImage {
    image::imageops::blur(mask, kernel_sigma(kernel_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_bilateral_uniform_is_identity() {
        let img = RgbImage::from_pixel(20, 20, Rgb([200, 150, 130]));
        let out = bilateral_filter(&img, 12, 50.0, 50.0);
        assert_eq!(out, img);
    }

    #[test]
    fn test_bilateral_reduces_noise() {
        // Checkerboard of ±6 around 128 should flatten toward 128.
        let img = RgbImage::from_fn(16, 16, |x, y| {
            if (x + y) % 2 == 0 { Rgb([134; 3]) } else { Rgb([122; 3]) }
        });
        let out = bilateral_filter(&img, 12, 50.0, 50.0);
        let px = out.get_pixel(8, 8).0[0];
        assert!((126..=130).contains(&px), "smoothed value {px}");
    }

    #[test]
    fn test_bilateral_preserves_strong_edge() {
        let img = RgbImage::from_fn(20, 20, |x, _| {
            if x < 10 { Rgb([20; 3]) } else { Rgb([230; 3]) }
        });
        let out = bilateral_filter(&img, 12, 50.0, 50.0);
        assert!(out.get_pixel(9, 10).0[0] < 40);
        assert!(out.get_pixel(10, 10).0[0] > 210);
    }

    #[test]
    fn test_erode_then_dilate_removes_speckle() {
        let mut mask = GrayImage::new(30, 30);
        for y in 5..25 {
            for x in 5..25 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask.put_pixel(1, 1, Luma([255]));

        let cleaned = dilate(&erode(&mask, 1, 2), 1, 2);
        assert_eq!(cleaned.get_pixel(1, 1).0[0], 0, "speckle survived");
        assert_eq!(cleaned.get_pixel(15, 15).0[0], 255);
        assert_eq!(cleaned.get_pixel(5, 5).0[0], 255);
    }

    #[test]
    fn test_kernel_sigma() {
        assert!((kernel_sigma(51) - 8.0).abs() < 1e-5);
        assert!((kernel_sigma(3) - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_gaussian_blur_softens_edge() {
        let mask = GrayImage::from_fn(64, 64, |x, _| Luma([if x < 32 { 255 } else { 0 }]));
        let soft = gaussian_blur(&mask, 51);
        let edge = soft.get_pixel(32, 32).0[0];
        assert!(edge > 30 && edge < 225, "edge value {edge}");
    }
}
