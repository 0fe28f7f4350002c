//! # Image codec
//!
//! Decodes fetched bytes into an [`Image`] and encodes images for the disk
//! tier.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageError};

use crate::error::CodecError;
use crate::image::Image;

/// Codec capability consumed by the fetch pipeline and the disk tier.
///
/// Both methods are CPU bound and are always invoked on the blocking pool.
pub trait ImageCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Image, CodecError>;

    /// Encode an image into the persisted form read back by [`decode`](Self::decode).
    fn encode(&self, image: &Image) -> Result<Vec<u8>, CodecError>;
}

/// Default codec backed by the `image` crate. Decodes any enabled raster
/// format into RGBA8 and persists as PNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterCodec;

impl ImageCodec for RasterCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Image, CodecError> {
        let decoded = image::load_from_memory(bytes).map_err(|e| match e {
            ImageError::Unsupported(e) => CodecError::Unsupported(e.to_string()),
            other => CodecError::Malformed(other.to_string()),
        })?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Image::new(width, height, rgba.into_raw()))
    }

    fn encode(&self, image: &Image) -> Result<Vec<u8>, CodecError> {
        let expected = image.width() as u64 * image.height() as u64 * 4;
        if image.pixels().len() as u64 != expected {
            return Err(CodecError::Encode(format!(
                "pixel buffer holds {} bytes, expected {expected}",
                image.pixels().len()
            )));
        }

        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(
                image.pixels(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(out)
    }
}
