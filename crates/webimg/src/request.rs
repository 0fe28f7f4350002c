//! # Requests and request keys
//!
//! A [`Request`] names a source, an optional transformation and a set of
//! cache flags. Its [`RequestKey`] is what caching and coalescing are keyed
//! by; flags never take part in it.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::image::Transformation;

bitflags::bitflags! {
    /// Per-request cache policy flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RequestFlags: u8 {
        /// Never write the result to any cache tier.
        const NO_CACHE = 1 << 0;
        /// Never read from any cache tier; the result is still written.
        const IGNORE_CACHE = 1 << 1;
    }
}

/// Caller supplied handle used to group and cancel requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(Arc<str>);

impl Tag {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Tag {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<u64> for Tag {
    fn from(value: u64) -> Self {
        Self::new(value.to_string())
    }
}

/// A load request.
#[derive(Clone)]
pub struct Request {
    source: String,
    transformation: Option<Arc<dyn Transformation>>,
    flags: RequestFlags,
}

impl Request {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            transformation: None,
            flags: RequestFlags::empty(),
        }
    }

    pub fn with_transformation(mut self, transformation: Arc<dyn Transformation>) -> Self {
        self.transformation = Some(transformation);
        self
    }

    pub fn with_flags(mut self, flags: RequestFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn add_flag(&mut self, flag: RequestFlags) {
        self.flags |= flag;
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn transformation(&self) -> Option<&Arc<dyn Transformation>> {
        self.transformation.as_ref()
    }

    pub fn flags(&self) -> RequestFlags {
        self.flags
    }

    /// Derive the identity used for caching and coalescing.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(
            &self.source,
            self.transformation.as_ref().map(|t| t.identifier()),
        )
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("source", &self.source)
            .field(
                "transformation",
                &self.transformation.as_ref().map(|t| t.identifier()),
            )
            .field("flags", &self.flags)
            .finish()
    }
}

impl From<&str> for Request {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Request {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Identity of a request: source identifier plus transformation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    source: Arc<str>,
    transformation: Option<Arc<str>>,
}

impl RequestKey {
    pub fn new(source: &str, transformation: Option<&str>) -> Self {
        Self {
            source: Arc::from(source),
            transformation: transformation.map(Arc::from),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn transformation(&self) -> Option<&str> {
        self.transformation.as_deref()
    }

    /// Stable hex digest, used as the disk tier's file name.
    ///
    /// Each component is length-prefixed so distinct (source, transformation)
    /// pairs never serialise to the same byte sequence.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.source.len() as u64).to_le_bytes());
        hasher.update(self.source.as_bytes());
        match &self.transformation {
            Some(id) => {
                hasher.update([1u8]);
                hasher.update((id.len() as u64).to_le_bytes());
                hasher.update(id.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.transformation {
            Some(id) => write!(f, "{}#{}", self.source, id),
            None => f.write_str(&self.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{FnTransformation, Image};

    fn identity(id: &str) -> Arc<dyn Transformation> {
        FnTransformation::shared(id, |img: Image| img)
    }

    #[test]
    fn test_flags_do_not_affect_key() {
        let plain = Request::new("mock://a.png");
        let flagged = Request::new("mock://a.png")
            .with_flags(RequestFlags::NO_CACHE | RequestFlags::IGNORE_CACHE);
        assert_eq!(plain.key(), flagged.key());
        assert_eq!(plain.key().digest(), flagged.key().digest());
    }

    #[test]
    fn test_transformation_changes_key() {
        let plain = Request::new("mock://a.png");
        let transformed = Request::new("mock://a.png").with_transformation(identity("identity"));
        assert_ne!(plain.key(), transformed.key());
        assert_ne!(plain.key().digest(), transformed.key().digest());
    }

    #[test]
    fn test_same_transformation_identifier_shares_key() {
        let a = Request::new("mock://a.png").with_transformation(identity("thumb"));
        let b = Request::new("mock://a.png").with_transformation(identity("thumb"));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_digest_is_stable_and_unambiguous() {
        let key = RequestKey::new("a", Some("b"));
        assert_eq!(key.digest(), RequestKey::new("a", Some("b")).digest());
        assert_eq!(key.digest().len(), 64);

        // Concatenation-style ambiguities must not collide.
        assert_ne!(
            RequestKey::new("ab", None).digest(),
            RequestKey::new("a", Some("b")).digest()
        );
        assert_ne!(
            RequestKey::new("a", Some("")).digest(),
            RequestKey::new("a", None).digest()
        );
    }

    #[test]
    fn test_key_display() {
        assert_eq!(RequestKey::new("x.png", None).to_string(), "x.png");
        assert_eq!(RequestKey::new("x.png", Some("t")).to_string(), "x.png#t");
    }

    #[test]
    fn test_add_flag_accumulates() {
        let mut request = Request::from("a.png");
        request.add_flag(RequestFlags::NO_CACHE);
        request.add_flag(RequestFlags::IGNORE_CACHE);
        assert!(request.flags().contains(RequestFlags::NO_CACHE));
        assert!(request.flags().contains(RequestFlags::IGNORE_CACHE));
    }
}
