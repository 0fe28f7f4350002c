//! # Loader
//!
//! Public entry point. Requests for the same [`RequestKey`] are coalesced
//! into one pending operation; tags let callers rebind or cancel their
//! interest; results flow through the cache chain.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::cache::CacheChain;
use crate::codec::ImageCodec;
use crate::error::LoadError;
use crate::fetcher::ContentFetcher;
use crate::image::Image;
use crate::listener::{Listener, OnProgress};
use crate::pipeline::{self, PipelineContext, PipelineJob, PipelineScheduler};
use crate::registry::{Registry, Sink, Subscription, TagBinding};
use crate::request::{Request, RequestFlags, Tag};

/// Snapshot of loader activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Operations currently in flight
    pub pending: usize,
    /// Tags bound to an in-flight operation
    pub tags: usize,
    /// Fetches started since the loader was built
    pub fetches: u64,
    /// Requests that joined an existing operation instead of starting one
    pub coalesced: u64,
}

/// Coordinates loads across callers. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Loader {
    ctx: Arc<PipelineContext>,
    jobs: mpsc::UnboundedSender<PipelineJob>,
    handle: Handle,
}

impl Loader {
    pub(crate) fn start(
        handle: Handle,
        chain: CacheChain,
        fetcher: Arc<dyn ContentFetcher>,
        codec: Arc<dyn ImageCodec>,
        workers: usize,
    ) -> Self {
        let ctx = Arc::new(PipelineContext::new(chain, fetcher, codec));
        let (jobs, rx) = mpsc::unbounded_channel();
        handle.spawn(PipelineScheduler::new(ctx.clone(), rx, workers).run());
        info!(workers, tiers = ?ctx.chain.tier_names(), "Loader started");
        Self { ctx, jobs, handle }
    }

    /// Start or join a load.
    ///
    /// A memory-tier hit is returned immediately and `listener` is not
    /// called. Otherwise `None` is returned and `listener` receives exactly
    /// one outcome, unless the load is cancelled first. Binding `tag`
    /// detaches whatever subscription the tag held before.
    pub fn load(
        &self,
        tag: Option<Tag>,
        request: Request,
        listener: impl Listener + 'static,
        progress: Option<OnProgress>,
    ) -> Option<Arc<Image>> {
        self.load_shared(tag, request, Arc::new(listener), progress)
    }

    /// [`load`](Self::load) for a bare source string.
    pub fn load_url(
        &self,
        tag: Option<Tag>,
        source: &str,
        listener: impl Listener + 'static,
    ) -> Option<Arc<Image>> {
        self.load(tag, Request::new(source), listener, None)
    }

    pub fn load_shared(
        &self,
        tag: Option<Tag>,
        request: Request,
        listener: Arc<dyn Listener>,
        progress: Option<OnProgress>,
    ) -> Option<Arc<Image>> {
        let key = request.key();
        let flags = request.flags();
        let mut registry = self.ctx.registry.lock();

        if registry.is_closed() {
            drop(registry);
            debug!(key = %key, "Load requested after shutdown");
            listener.on_error(tag.as_ref(), LoadError::Shutdown);
            return None;
        }

        if let Some(tag) = &tag {
            registry.cancel_tag(tag);
        }

        let subscription = Subscription {
            id: registry.next_subscription_id(),
            tag: tag.clone(),
            flags,
            sink: Sink::Listener(listener),
            progress,
        };
        let subscription_id = subscription.id;

        let operation = match registry.pending.attach(&key, subscription) {
            Ok(operation) => {
                self.ctx.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, tag = ?tag, "Joined pending operation");
                operation
            }
            Err(subscription) => {
                if let Some(image) = self.peek(&registry, &request) {
                    debug!(key = %key, tag = ?tag, "Memory cache hit");
                    return Some(image);
                }

                let job = self.begin(&mut registry, &request, subscription);
                let operation = job.operation;

                if self.jobs.send(job).is_err() {
                    let op = registry.complete(&key, operation);
                    drop(registry);
                    warn!(key = %key, "Worker pool stopped, rejecting load");
                    if let Some(op) = op {
                        for subscription in op.subscribers {
                            subscription.deliver(&Err(LoadError::Shutdown));
                        }
                    }
                    return None;
                }
                debug!(key = %key, tag = ?tag, operation, "Queued new operation");
                operation
            }
        };

        if let Some(tag) = tag {
            registry.tags.bind(
                tag,
                TagBinding {
                    key,
                    operation,
                    subscription: subscription_id,
                },
            );
        }
        None
    }

    /// Load on the calling thread and wait for the result.
    ///
    /// Joins an operation already in flight for the same key; otherwise the
    /// pipeline runs inline, outside the worker pool.
    ///
    /// Works from any thread of a multi-threaded runtime as well as from
    /// plain threads. Inside a current-thread runtime the call would starve
    /// the runtime it waits on, so it fails with
    /// [`LoadError::BlockingInRuntime`] instead.
    pub fn load_blocking(
        &self,
        request: Request,
        progress: Option<OnProgress>,
    ) -> Result<Arc<Image>, LoadError> {
        match Handle::try_current() {
            Err(_) => self.handle.block_on(self.load_inline(request, progress)),
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                warn!("Blocking load rejected on a current-thread runtime");
                Err(LoadError::BlockingInRuntime)
            }
            Ok(_) => tokio::task::block_in_place(|| {
                self.handle.block_on(self.load_inline(request, progress))
            }),
        }
    }

    /// [`load_blocking`](Self::load_blocking) for a bare source string.
    pub fn load_blocking_url(&self, source: &str) -> Result<Arc<Image>, LoadError> {
        self.load_blocking(Request::new(source), None)
    }

    async fn load_inline(
        &self,
        request: Request,
        progress: Option<OnProgress>,
    ) -> Result<Arc<Image>, LoadError> {
        let key = request.key();
        let flags = request.flags();
        let (tx, rx) = oneshot::channel();

        let job = {
            let mut registry = self.ctx.registry.lock();
            if registry.is_closed() {
                return Err(LoadError::Shutdown);
            }

            let subscription = Subscription {
                id: registry.next_subscription_id(),
                tag: None,
                flags,
                sink: Sink::Waiter(tx),
                progress,
            };

            match registry.pending.attach(&key, subscription) {
                Ok(_) => {
                    self.ctx.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Blocking load joined pending operation");
                    None
                }
                Err(subscription) => {
                    if let Some(image) = self.peek(&registry, &request) {
                        return Ok(image);
                    }
                    Some(self.begin(&mut registry, &request, subscription))
                }
            }
        };

        if let Some(job) = job {
            debug!(key = %key, "Running blocking load inline");
            pipeline::execute(self.ctx.clone(), job).await;
        }

        rx.await.map_err(|_| LoadError::Shutdown)?
    }

    /// Synchronous memory lookup. Skipped while an aborted operation for the
    /// key is still stopping, since its cache write may yet be rolled back.
    fn peek(&self, registry: &Registry, request: &Request) -> Option<Arc<Image>> {
        let key = request.key();
        if registry.pending.draining(&key).is_some() {
            return None;
        }
        self.ctx.chain.peek(&key, request.flags())
    }

    /// Register a new operation for `request` and build the job that runs it.
    fn begin(
        &self,
        registry: &mut Registry,
        request: &Request,
        subscription: Subscription,
    ) -> PipelineJob {
        let key = request.key();
        let cancel = self.ctx.shutdown.child_token();
        let reservation = registry
            .pending
            .create(key.clone(), subscription, cancel.clone());
        PipelineJob {
            key,
            operation: reservation.id,
            transformation: request.transformation().cloned(),
            read_cache: !request.flags().contains(RequestFlags::IGNORE_CACHE),
            cancel,
            finished: reservation.finished.drop_guard(),
            after: reservation.after,
        }
    }

    /// Detach the subscription bound to `tag`. Its listener is never called,
    /// and the operation is aborted if nobody else is waiting on it.
    pub fn cancel(&self, tag: &Tag) {
        let aborted = self.ctx.registry.lock().cancel_tag(tag);
        debug!(tag = %tag, aborted, "Cancelled tag");
    }

    /// Abort every operation without notifying listeners and stop the worker
    /// pool. Later loads fail with [`LoadError::Shutdown`].
    pub fn shutdown(&self) {
        let aborted = self.ctx.registry.lock().close();
        self.ctx.shutdown.cancel();
        info!(aborted = aborted.len(), "Loader shut down");
        // Dropping the operations here releases blocking waiters
        drop(aborted);
    }

    pub fn is_shut_down(&self) -> bool {
        self.ctx.registry.lock().is_closed()
    }

    /// Remove the entry for `request` from every cache tier.
    pub async fn invalidate(&self, request: &Request) {
        self.ctx.chain.remove(&request.key()).await;
    }

    pub async fn clear_cache(&self) {
        self.ctx.chain.clear().await;
    }

    pub fn stats(&self) -> LoaderStats {
        let (pending, tags) = {
            let registry = self.ctx.registry.lock();
            (registry.pending.len(), registry.tags.len())
        };
        LoaderStats {
            pending,
            tags,
            fetches: self.ctx.fetches.load(Ordering::Relaxed),
            coalesced: self.ctx.coalesced.load(Ordering::Relaxed),
        }
    }

    /// Names of the active cache tiers, fastest first
    pub fn cache_tiers(&self) -> Vec<&'static str> {
        self.ctx.chain.tier_names()
    }
}
