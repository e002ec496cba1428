use thiserror::Error;

/// Errors that can occur while decoding or encoding images.
#[derive(Debug, Error)]
pub enum CodecError {
  /// The buffer does not start with the signature of a supported format.
  #[error("unsupported image format: {detected}")]
  UnsupportedFormat { detected: String },

  /// The buffer claims a supported format but its contents are malformed.
  #[error("corrupt {format} data: {message}")]
  CorruptData { format: String, message: String },

  /// Serializing a pixel grid failed.
  ///
  /// Well-formed images never hit this; treat it as a defect.
  #[error("failed to encode {format}: {message}")]
  Encode { format: String, message: String },
}

impl CodecError {
  pub(crate) fn unsupported(detected: impl Into<String>) -> Self {
    Self::UnsupportedFormat {
      detected: detected.into(),
    }
  }
}
