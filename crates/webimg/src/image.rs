//! # Image resource
//!
//! The canonical decoded representation handed to listeners and stored in
//! the memory tier, plus the transformation capability applied after
//! decoding.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// Fixed per-entry overhead added to the pixel buffer when estimating the
/// memory footprint of an image.
const IMAGE_OVERHEAD_BYTES: u64 = 64;

/// A decoded image: tightly packed RGBA8 pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Bytes,
}

impl Image {
    /// Create an image from RGBA8 pixel data.
    pub fn new(width: u32, height: u32, pixels: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &Bytes {
        &self.pixels
    }

    /// Approximate in-memory footprint, used by the memory tier's byte budget.
    pub fn size_estimate(&self) -> u64 {
        self.pixels.len() as u64 + IMAGE_OVERHEAD_BYTES
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// A pure, deterministic image-to-image function.
///
/// The identifier takes part in the request key, so two transformations with
/// the same identifier must produce the same output for the same input.
pub trait Transformation: Send + Sync {
    /// Stable identifier, persisted as part of disk cache keys.
    fn identifier(&self) -> &str;

    fn apply(&self, image: Image) -> Image;
}

/// Adapter turning a closure into a [`Transformation`].
pub struct FnTransformation<F> {
    identifier: String,
    f: F,
}

impl<F> FnTransformation<F>
where
    F: Fn(Image) -> Image + Send + Sync,
{
    pub fn new(identifier: impl Into<String>, f: F) -> Self {
        Self {
            identifier: identifier.into(),
            f,
        }
    }

    pub fn shared(identifier: impl Into<String>, f: F) -> Arc<dyn Transformation>
    where
        F: 'static,
    {
        Arc::new(Self::new(identifier, f))
    }
}

impl<F> Transformation for FnTransformation<F>
where
    F: Fn(Image) -> Image + Send + Sync,
{
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn apply(&self, image: Image) -> Image {
        (self.f)(image)
    }
}
