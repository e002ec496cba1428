//! Luminance-preserving grayscale conversion.
//!
//! Uses the Rec. 601 weights `0.299 R + 0.587 G + 0.114 B` in 16.16 fixed
//! point so that results are bit-identical on every platform.

use image::{DynamicImage, GrayImage, Luma};

use crate::codec::DecodedImage;

const RED_WEIGHT: u32 = 19_595;
const GREEN_WEIGHT: u32 = 38_470;
const BLUE_WEIGHT: u32 = 7_471;
const ROUNDING: u32 = 1 << 15;

/// Luminance of one 8-bit RGB pixel.
///
/// The weights sum to `1 << 16`, so equal channels map to themselves.
#[must_use]
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
  let y = RED_WEIGHT * u32::from(r) + GREEN_WEIGHT * u32::from(g) + BLUE_WEIGHT * u32::from(b);
  ((y + ROUNDING) >> 16) as u8
}

/// Produce a new single-channel image with the luminance of every pixel.
///
/// Alpha is discarded and 16-bit or float inputs are reduced to 8 bits
/// first. The input is left untouched.
#[must_use = "returns the grayscale image"]
pub fn transform(image: &DecodedImage) -> DecodedImage {
  let gray = match image.as_dynamic() {
    DynamicImage::ImageLuma8(gray) => gray.clone(),
    other => {
      let rgb = other.to_rgb8();
      GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        Luma([luminance(r, g, b)])
      })
    }
  };

  DecodedImage::new(DynamicImage::ImageLuma8(gray))
}
