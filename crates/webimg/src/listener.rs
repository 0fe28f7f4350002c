use std::sync::Arc;

use crate::error::LoadError;
use crate::image::Image;
use crate::request::Tag;

/// A callback for download progress, called with values in `0.0..=1.0`.
pub type OnProgress = Arc<dyn Fn(f32) + Send + Sync>;

/// Receives the outcome of an asynchronous load. Exactly one of the two
/// methods is called per load, unless the load is cancelled, in which case
/// neither is.
pub trait Listener: Send + Sync {
    fn on_success(&self, tag: Option<&Tag>, image: Arc<Image>);

    fn on_error(&self, tag: Option<&Tag>, error: LoadError);
}

/// [`Listener`] backed by a single closure receiving the result.
pub struct FnListener<F> {
    f: F,
}

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> FnListener<F>
where
    F: Fn(Option<&Tag>, Result<Arc<Image>, LoadError>) + Send + Sync,
{
    FnListener { f }
}

impl<F> Listener for FnListener<F>
where
    F: Fn(Option<&Tag>, Result<Arc<Image>, LoadError>) + Send + Sync,
{
    fn on_success(&self, tag: Option<&Tag>, image: Arc<Image>) {
        (self.f)(tag, Ok(image))
    }

    fn on_error(&self, tag: Option<&Tag>, error: LoadError) {
        (self.f)(tag, Err(error))
    }
}

/// Listener that ignores every outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl Listener for NoopListener {
    fn on_success(&self, _tag: Option<&Tag>, _image: Arc<Image>) {}

    fn on_error(&self, _tag: Option<&Tag>, _error: LoadError) {}
}
