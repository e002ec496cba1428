//! Decoding byte buffers into pixel grids and encoding them back.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use tracing::debug;

use crate::error::CodecError;
use crate::format::ImageFormat;

/// Default quality for lossy targets when the caller passes none.
const DEFAULT_QUALITY: u8 = 90;

/// Valid quality range for lossy targets.
const QUALITY_RANGE: std::ops::RangeInclusive<u8> = 1..=100;

/// A decoded, owned pixel grid.
///
/// Pixels are either color (red/green/blue, possibly with alpha) or a single
/// intensity channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
  image: DynamicImage,
  source_format: Option<ImageFormat>,
}

impl DecodedImage {
  /// Wrap an in-memory image that did not come from a decoded buffer.
  pub fn new(image: DynamicImage) -> Self {
    Self {
      image,
      source_format: None,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// Format this image was decoded from, if any.
  pub fn source_format(&self) -> Option<ImageFormat> {
    self.source_format
  }

  /// Whether pixels carry a single intensity channel.
  pub fn is_grayscale(&self) -> bool {
    !self.image.color().has_color()
  }

  /// Red, green and blue components of a pixel.
  ///
  /// For grayscale images all three components carry the intensity.
  ///
  /// # Panics
  ///
  /// Panics if `(x, y)` is outside the image bounds.
  pub fn pixel_rgb(&self, x: u32, y: u32) -> [u8; 3] {
    match &self.image {
      DynamicImage::ImageLuma8(gray) => {
        let v = gray.get_pixel(x, y).0[0];
        [v, v, v]
      }
      DynamicImage::ImageRgb8(rgb) => rgb.get_pixel(x, y).0,
      other => {
        let [r, g, b, _] = image::GenericImageView::get_pixel(other, x, y).0;
        [r, g, b]
      }
    }
  }

  /// Borrow the underlying image.
  pub fn as_dynamic(&self) -> &DynamicImage {
    &self.image
  }

  /// Take ownership of the underlying image.
  pub fn into_dynamic(self) -> DynamicImage {
    self.image
  }
}

impl From<DynamicImage> for DecodedImage {
  fn from(image: DynamicImage) -> Self {
    Self::new(image)
  }
}

/// Decode a fully buffered image.
///
/// The format is always sniffed from the buffer. A `hint` that disagrees with
/// the sniffed format is logged and ignored.
///
/// # Errors
///
/// Returns [`CodecError::UnsupportedFormat`] if the signature is not one of the
/// supported formats, and [`CodecError::CorruptData`] if the signature matches
/// but the body fails to decode.
pub fn decode(bytes: &[u8], hint: Option<ImageFormat>) -> Result<DecodedImage, CodecError> {
  let format = ImageFormat::sniff(bytes)?;

  if let Some(hint) = hint.filter(|h| *h != format) {
    debug!(hinted = %hint, sniffed = %format, "format hint does not match contents");
  }

  // Second pass over the same buffer; sniffing only looked at the header.
  let image = image::load_from_memory_with_format(bytes, format.to_image_format()).map_err(
    |e| CodecError::CorruptData {
      format: format.to_string(),
      message: e.to_string(),
    },
  )?;

  debug!(
    format = %format,
    width = image.width(),
    height = image.height(),
    "decoded image"
  );

  Ok(DecodedImage {
    image,
    source_format: Some(format),
  })
}

/// Encode a pixel grid into `target`.
///
/// `quality` only affects lossy targets. It is clamped to `1..=100` and
/// defaults to 90.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the encoder rejects the pixel data.
pub fn encode(
  image: &DecodedImage,
  target: ImageFormat,
  quality: Option<u8>,
) -> Result<Vec<u8>, CodecError> {
  let pixels = prepare_for(target, &image.image);
  let (width, height) = (pixels.width(), pixels.height());
  let color: ExtendedColorType = pixels.color().into();
  let mut buf = Vec::new();

  let result = match target {
    ImageFormat::Jpeg => {
      let quality = clamp_quality(quality);
      JpegEncoder::new_with_quality(&mut buf, quality).write_image(
        pixels.as_bytes(),
        width,
        height,
        color,
      )
    }
    ImageFormat::Png => PngEncoder::new(&mut buf).write_image(pixels.as_bytes(), width, height, color),
    ImageFormat::Webp => {
      WebPEncoder::new_lossless(&mut buf).write_image(pixels.as_bytes(), width, height, color)
    }
  };

  result.map_err(|e| CodecError::Encode {
    format: target.to_string(),
    message: e.to_string(),
  })?;

  debug!(format = %target, bytes = buf.len(), "encoded image");
  Ok(buf)
}

fn clamp_quality(quality: Option<u8>) -> u8 {
  quality
    .unwrap_or(DEFAULT_QUALITY)
    .clamp(*QUALITY_RANGE.start(), *QUALITY_RANGE.end())
}

/// Convert pixels into a layout the target encoder accepts.
///
/// JPEG takes 8-bit gray or RGB without alpha. WebP takes 8-bit data. PNG
/// takes everything as is.
fn prepare_for(target: ImageFormat, image: &DynamicImage) -> std::borrow::Cow<'_, DynamicImage> {
  use std::borrow::Cow;

  let color = image.color();
  match target {
    ImageFormat::Png => Cow::Borrowed(image),
    ImageFormat::Jpeg => match image {
      DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => Cow::Borrowed(image),
      _ if color.has_color() => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
      _ => Cow::Owned(DynamicImage::ImageLuma8(image.to_luma8())),
    },
    ImageFormat::Webp => match image {
      DynamicImage::ImageLuma8(_)
      | DynamicImage::ImageLumaA8(_)
      | DynamicImage::ImageRgb8(_)
      | DynamicImage::ImageRgba8(_) => Cow::Borrowed(image),
      _ => match (color.has_color(), color.has_alpha()) {
        (true, true) => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
        (true, false) => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        (false, true) => Cow::Owned(DynamicImage::ImageLumaA8(image.to_luma_alpha8())),
        (false, false) => Cow::Owned(DynamicImage::ImageLuma8(image.to_luma8())),
      },
    },
  }
}

#[cfg(test)]
mod tests {
  use image::{Rgb, RgbImage, Rgba, RgbaImage};

  use super::*;

  fn gradient(width: u32, height: u32) -> DecodedImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
      Rgb([(x * 17 % 256) as u8, (y * 29 % 256) as u8, ((x + y) * 7 % 256) as u8])
    });
    DecodedImage::new(DynamicImage::ImageRgb8(img))
  }

  fn assert_same_pixels(a: &DecodedImage, b: &DecodedImage) {
    assert_eq!((a.width(), a.height()), (b.width(), b.height()));
    for y in 0..a.height() {
      for x in 0..a.width() {
        assert_eq!(a.pixel_rgb(x, y), b.pixel_rgb(x, y), "pixel ({x}, {y})");
      }
    }
  }

  #[test]
  fn test_png_round_trip_preserves_pixels() {
    let original = gradient(13, 7);
    let bytes = encode(&original, ImageFormat::Png, None).unwrap();

    let decoded = decode(&bytes, None).unwrap();
    assert_eq!(decoded.source_format(), Some(ImageFormat::Png));
    assert_same_pixels(&original, &decoded);

    let again = decode(&encode(&decoded, ImageFormat::Png, None).unwrap(), None).unwrap();
    assert_same_pixels(&decoded, &again);
  }

  #[test]
  fn test_webp_round_trip_is_lossless() {
    let original = gradient(9, 11);
    let bytes = encode(&original, ImageFormat::Webp, Some(10)).unwrap();

    let decoded = decode(&bytes, None).unwrap();
    assert_eq!(decoded.source_format(), Some(ImageFormat::Webp));
    assert_same_pixels(&original, &decoded);
  }

  #[test]
  fn test_jpeg_round_trip_keeps_dimensions() {
    let original = gradient(32, 24);
    let bytes = encode(&original, ImageFormat::Jpeg, Some(90)).unwrap();

    let decoded = decode(&bytes, None).unwrap();
    assert_eq!(decoded.source_format(), Some(ImageFormat::Jpeg));
    assert_eq!((decoded.width(), decoded.height()), (32, 24));

    let again = encode(&decoded, ImageFormat::Jpeg, Some(90)).unwrap();
    assert_eq!(ImageFormat::sniff(&again).unwrap(), ImageFormat::Jpeg);
  }

  #[test]
  fn test_jpeg_drops_alpha() {
    let img = RgbaImage::from_pixel(4, 4, Rgba([200, 100, 50, 128]));
    let bytes = encode(&DecodedImage::new(DynamicImage::ImageRgba8(img)), ImageFormat::Jpeg, None)
      .unwrap();
    let decoded = decode(&bytes, None).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (4, 4));
  }

  #[test]
  fn test_quality_is_clamped() {
    assert_eq!(clamp_quality(None), 90);
    assert_eq!(clamp_quality(Some(0)), 1);
    assert_eq!(clamp_quality(Some(255)), 100);
    assert_eq!(clamp_quality(Some(42)), 42);

    // Out-of-range values still produce a valid file.
    let bytes = encode(&gradient(8, 8), ImageFormat::Jpeg, Some(0)).unwrap();
    assert!(decode(&bytes, None).is_ok());
  }

  #[test]
  fn test_truncated_png_is_corrupt() {
    let bytes = encode(&gradient(16, 16), ImageFormat::Png, None).unwrap();
    let truncated = &bytes[..bytes.len() / 2];

    let result = decode(truncated, None);
    assert!(matches!(result, Err(CodecError::CorruptData { ref format, .. }) if format == "png"));
  }

  #[test]
  fn test_signature_only_png_is_corrupt() {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(b"definitely not chunks");

    let result = decode(&bytes, None);
    assert!(matches!(result, Err(CodecError::CorruptData { .. })));
  }

  #[test]
  fn test_unknown_bytes_are_unsupported() {
    let result = decode(&[0x00, 0x01, 0x02, 0x03, 0x04, 0x05], None);
    assert!(matches!(result, Err(CodecError::UnsupportedFormat { .. })));
  }

  #[test]
  fn test_mismatched_hint_is_ignored() {
    let bytes = encode(&gradient(3, 3), ImageFormat::Png, None).unwrap();
    let decoded = decode(&bytes, Some(ImageFormat::Jpeg)).unwrap();
    assert_eq!(decoded.source_format(), Some(ImageFormat::Png));
  }
}
