//! Frame type — host image ↔ working RGB buffer conversion.

use crate::EngineError;
use image::{
    ColorType, DynamicImage, GrayImage, ImageBuffer, Luma, Pixel, Rgb, RgbImage, Rgba, RgbaImage,
};

/// Float host pixels kept aside while edits run on the 8-bit working buffer.
#[derive(Clone)]
struct FloatSource {
    /// The host image exactly as it arrived (`Rgb32F` or `Rgba32F`).
    original: DynamicImage,
    /// 8-bit quantization the working buffer started from.
    baseline: RgbImage,
}

/// One video frame or photo, held as an 8-bit RGB working buffer.
///
/// The original colour type and alpha channel are kept aside so that
/// [`Frame::into_dynamic`] returns the same format the host handed in.
/// Float frames keep their full-precision pixels; only pixels an edit
/// changed are replaced on the way back.
#[derive(Clone)]
pub struct Frame {
    /// Working RGB pixels; edits mutate this buffer in place.
    pub image: RgbImage,
    /// Alpha channel of 4-channel inputs.
    pub alpha: Option<GrayImage>,
    pub color_type: ColorType,
    pub sequence: u64,
    float: Option<FloatSource>,
}

impl Frame {
    pub fn from_rgb(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            alpha: None,
            color_type: ColorType::Rgb8,
            sequence,
            float: None,
        }
    }

    /// Wrap a host image. Accepts 8-bit and 32-bit float RGB/RGBA.
    pub fn from_dynamic(image: DynamicImage, sequence: u64) -> Result<Self, EngineError> {
        let color_type = image.color();
        let (rgb, alpha, float) = match image {
            DynamicImage::ImageRgb8(rgb) => (rgb, None, None),
            DynamicImage::ImageRgba8(rgba) => {
                let (rgb, alpha) = split_alpha(&rgba);
                (rgb, Some(alpha), None)
            }
            DynamicImage::ImageRgb32F(_) => {
                let rgb = image.to_rgb8();
                let float = FloatSource {
                    baseline: rgb.clone(),
                    original: image,
                };
                (rgb, None, Some(float))
            }
            DynamicImage::ImageRgba32F(_) => {
                let (rgb, alpha) = split_alpha(&image.to_rgba8());
                let float = FloatSource {
                    baseline: rgb.clone(),
                    original: image,
                };
                (rgb, Some(alpha), Some(float))
            }
            other => {
                return Err(EngineError::UnsupportedColorType(format!("{:?}", other.color())));
            }
        };

        Ok(Self {
            image: rgb,
            alpha,
            color_type,
            sequence,
            float,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Convert back to the colour type the frame was created from.
    pub fn into_dynamic(self) -> DynamicImage {
        if let Some(float) = self.float {
            return float.restore(&self.image);
        }

        match self.color_type {
            ColorType::Rgba8 => {
                let alpha = self.alpha.as_ref();
                DynamicImage::ImageRgba8(ImageBuffer::from_fn(
                    self.image.width(),
                    self.image.height(),
                    |x, y| {
                        let [r, g, b] = self.image.get_pixel(x, y).0;
                        let a = alpha.map_or(255, |a| a.get_pixel(x, y)[0]);
                        Rgba([r, g, b, a])
                    },
                ))
            }
            _ => DynamicImage::ImageRgb8(self.image),
        }
    }
}

impl FloatSource {
    /// Write the working pixels that differ from the baseline over the
    /// untouched float original. Alpha and unedited pixels keep full precision.
    fn restore(self, edited: &RgbImage) -> DynamicImage {
        let changed = |x: u32, y: u32| {
            let px = edited.get_pixel(x, y);
            (px != self.baseline.get_pixel(x, y)).then(|| px.0.map(|c| c as f32 / 255.0))
        };

        match self.original {
            DynamicImage::ImageRgb32F(mut float) => {
                for (x, y, px) in float.enumerate_pixels_mut() {
                    if let Some(rgb) = changed(x, y) {
                        *px = Rgb(rgb);
                    }
                }
                DynamicImage::ImageRgb32F(float)
            }
            DynamicImage::ImageRgba32F(mut float) => {
                for (x, y, px) in float.enumerate_pixels_mut() {
                    if let Some([r, g, b]) = changed(x, y) {
                        *px = Rgba([r, g, b, px[3]]);
                    }
                }
                DynamicImage::ImageRgba32F(float)
            }
            other => other,
        }
    }
}

fn split_alpha(rgba: &RgbaImage) -> (RgbImage, GrayImage) {
    let rgb = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        rgba.get_pixel(x, y).to_rgb()
    });
    let alpha = GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        Luma([rgba.get_pixel(x, y)[3]])
    });
    (rgb, alpha)
}
