use std::fmt;

use crate::error::CodecError;

/// Image encodings the pipeline accepts.
///
/// Detection goes through [`ImageFormat::sniff`], which looks at the buffer
/// contents and ignores any file name or extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
  Jpeg,
  Png,
  Webp,
}

impl ImageFormat {
  /// Detect the format of a buffer from its leading signature bytes.
  ///
  /// # Errors
  ///
  /// Returns [`CodecError::UnsupportedFormat`] for empty buffers, unknown
  /// signatures and formats that are recognised but not supported.
  pub fn sniff(bytes: &[u8]) -> Result<Self, CodecError> {
    if bytes.is_empty() {
      return Err(CodecError::unsupported("empty input"));
    }

    let guessed =
      image::guess_format(bytes).map_err(|_| CodecError::unsupported("unknown signature"))?;
    Self::from_image_format(guessed)
  }

  /// Map the `image` crate's open format list onto the supported set.
  fn from_image_format(format: image::ImageFormat) -> Result<Self, CodecError> {
    match format {
      image::ImageFormat::Jpeg => Ok(Self::Jpeg),
      image::ImageFormat::Png => Ok(Self::Png),
      image::ImageFormat::WebP => Ok(Self::Webp),
      other => Err(CodecError::unsupported(format!("{:?}", other).to_lowercase())),
    }
  }

  pub(crate) fn to_image_format(self) -> image::ImageFormat {
    match self {
      Self::Jpeg => image::ImageFormat::Jpeg,
      Self::Png => image::ImageFormat::Png,
      Self::Webp => image::ImageFormat::WebP,
    }
  }

  /// Whether encoding to this format discards information.
  pub fn is_lossy(self) -> bool {
    matches!(self, Self::Jpeg)
  }

  /// Canonical lowercase name.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Jpeg => "jpeg",
      Self::Png => "png",
      Self::Webp => "webp",
    }
  }

  /// MIME type for serving encoded output.
  pub fn mime_type(self) -> &'static str {
    match self {
      Self::Jpeg => "image/jpeg",
      Self::Png => "image/png",
      Self::Webp => "image/webp",
    }
  }
}

impl fmt::Display for ImageFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

  #[test]
  fn test_sniff_png_signature() {
    assert_eq!(ImageFormat::sniff(PNG_SIGNATURE).unwrap(), ImageFormat::Png);
  }

  #[test]
  fn test_sniff_jpeg_signature() {
    let bytes = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    assert_eq!(ImageFormat::sniff(&bytes).unwrap(), ImageFormat::Jpeg);
  }

  #[test]
  fn test_sniff_webp_signature() {
    let bytes = b"RIFF\x24\x00\x00\x00WEBPVP8L";
    assert_eq!(ImageFormat::sniff(bytes).unwrap(), ImageFormat::Webp);
  }

  #[test]
  fn test_sniff_empty_is_unsupported() {
    let result = ImageFormat::sniff(&[]);
    assert!(matches!(result, Err(CodecError::UnsupportedFormat { .. })));
  }

  #[test]
  fn test_sniff_text_is_unsupported() {
    let result = ImageFormat::sniff(b"hello, this is not an image");
    assert!(matches!(result, Err(CodecError::UnsupportedFormat { .. })));
  }

  #[test]
  fn test_sniff_recognised_but_unsupported_format() {
    // GIF is known to the decoder library but outside the supported set.
    let result = ImageFormat::sniff(b"GIF89a\x01\x00\x01\x00");
    match result {
      Err(CodecError::UnsupportedFormat { detected }) => assert_eq!(detected, "gif"),
      other => panic!("expected unsupported format, got {:?}", other),
    }
  }

  #[test]
  fn test_only_jpeg_is_lossy() {
    assert!(ImageFormat::Jpeg.is_lossy());
    assert!(!ImageFormat::Png.is_lossy());
    assert!(!ImageFormat::Webp.is_lossy());
  }
}
