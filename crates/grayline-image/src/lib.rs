//! Grayline Image
//!
//! This crate provides the image side of the Grayline pipeline:
//! - [`ImageFormat`]: the closed set of supported encodings, detected by
//!   sniffing the leading bytes of a buffer
//! - [`decode`] / [`encode`]: conversion between byte buffers and
//!   [`DecodedImage`] pixel grids
//! - [`grayscale::transform`]: luminance-preserving gray conversion
//!
//! Everything here is sans-IO. Callers hand in fully buffered bytes and get
//! owned values back.

mod codec;
mod error;
mod format;
pub mod grayscale;

pub use codec::{DecodedImage, decode, encode};
pub use error::CodecError;
pub use format::ImageFormat;

/// Encoding used for published pipeline output.
pub const OUTPUT_FORMAT: ImageFormat = ImageFormat::Jpeg;

/// Quality used for published pipeline output.
pub const OUTPUT_QUALITY: u8 = 90;
