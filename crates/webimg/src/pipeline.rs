//! # Fetch Pipeline
//!
//! Produces the final image for one pending operation: cache probe, fetch
//! with progress, decode and transform, cache write, then delivery to every
//! subscriber still attached. Jobs are run by a [`PipelineScheduler`] with
//! bounded concurrency, or inline by blocking loads.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::cache::CacheChain;
use crate::codec::ImageCodec;
use crate::error::LoadError;
use crate::fetcher::ContentFetcher;
use crate::image::{Image, Transformation};
use crate::registry::{LoadResult, OperationId, Registry};
use crate::request::{RequestFlags, RequestKey};

/// State shared by the loader façade and every running job.
pub(crate) struct PipelineContext {
    pub registry: Mutex<Registry>,
    pub chain: CacheChain,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub codec: Arc<dyn ImageCodec>,
    /// Parent of every operation token; cancelled on shutdown
    pub shutdown: CancellationToken,
    pub fetches: AtomicU64,
    pub coalesced: AtomicU64,
}

impl PipelineContext {
    pub fn new(
        chain: CacheChain,
        fetcher: Arc<dyn ContentFetcher>,
        codec: Arc<dyn ImageCodec>,
    ) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            chain,
            fetcher,
            codec,
            shutdown: CancellationToken::new(),
            fetches: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    fn report_progress(&self, key: &RequestKey, operation: OperationId, value: f32) {
        let listeners = self.registry.lock().pending.progress_listeners(key, operation);
        for listener in listeners {
            listener(value);
        }
    }
}

/// Unit of work handed to the scheduler.
pub(crate) struct PipelineJob {
    pub key: RequestKey,
    pub operation: OperationId,
    pub transformation: Option<Arc<dyn Transformation>>,
    /// Probe the cache chain before fetching
    pub read_cache: bool,
    pub cancel: CancellationToken,
    /// Releases the key reservation when the job is dropped, run or not
    pub finished: DropGuard,
    /// Aborted job for the same key that must stop before this one starts
    pub after: Option<CancellationToken>,
}

struct Produced {
    image: Arc<Image>,
    from_cache: bool,
}

enum Interrupted {
    Cancelled,
    Failed(LoadError),
}

/// Run one job to completion and notify its subscribers.
///
/// Returns only once no work for the job is left running, so an aborted
/// job keeps its key reserved until its decode has stopped.
pub(crate) async fn execute(ctx: Arc<PipelineContext>, job: PipelineJob) {
    if let Some(prior) = &job.after {
        debug!(key = %job.key, "Waiting for aborted operation to stop");
        prior.cancelled().await;
    }

    match produce(&ctx, &job).await {
        Ok(produced) => succeed(&ctx, &job, produced).await,
        Err(Interrupted::Cancelled) => {
            debug!(key = %job.key, "Operation cancelled, result discarded");
        }
        Err(Interrupted::Failed(e)) => {
            warn!(key = %job.key, error = %e, "Load failed");
            let op = ctx.registry.lock().complete(&job.key, job.operation);
            if let Some(op) = op {
                let outcome: LoadResult = Err(e);
                for subscription in op.subscribers {
                    subscription.deliver(&outcome);
                }
            }
        }
    }

    ctx.registry.lock().pending.settle(&job.key, job.operation);
}

enum Fetched {
    Cached(Arc<Image>),
    Bytes(bytes::Bytes),
}

async fn produce(ctx: &PipelineContext, job: &PipelineJob) -> Result<Produced, Interrupted> {
    let fetched = tokio::select! {
        biased;
        _ = job.cancel.cancelled() => return Err(Interrupted::Cancelled),
        result = lookup_or_fetch(ctx, job) => result.map_err(Interrupted::Failed)?,
    };
    let data = match fetched {
        Fetched::Cached(image) => {
            return Ok(Produced {
                image,
                from_cache: true,
            });
        }
        Fetched::Bytes(data) => data,
    };

    // Awaited even when cancelled: the key stays reserved until decoding stops
    let codec = ctx.codec.clone();
    let transformation = job.transformation.clone();
    let cancel = job.cancel.clone();
    let image = tokio::task::spawn_blocking(move || -> Result<Option<Image>, LoadError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let image = codec
            .decode(&data)
            .map_err(|e| LoadError::Decode(e.to_string()))?;
        match transformation {
            Some(_) if cancel.is_cancelled() => Ok(None),
            Some(t) => Ok(Some(t.apply(image))),
            None => Ok(Some(image)),
        }
    })
    .await
    .map_err(|e| Interrupted::Failed(LoadError::Decode(format!("decode task failed: {e}"))))?
    .map_err(Interrupted::Failed)?;

    match image {
        Some(image) if !job.cancel.is_cancelled() => Ok(Produced {
            image: Arc::new(image),
            from_cache: false,
        }),
        _ => Err(Interrupted::Cancelled),
    }
}

async fn lookup_or_fetch(ctx: &PipelineContext, job: &PipelineJob) -> Result<Fetched, LoadError> {
    if job.read_cache {
        if let Some(image) = ctx.chain.get(&job.key, RequestFlags::empty()).await {
            return Ok(Fetched::Cached(image));
        }
    }
    fetch(ctx, job).await.map(Fetched::Bytes)
}

async fn fetch(ctx: &PipelineContext, job: &PipelineJob) -> Result<bytes::Bytes, LoadError> {
    let source = job.key.source();
    let not_found = |reason: String| LoadError::NotFound {
        source_id: source.to_string(),
        reason,
    };

    ctx.fetches.fetch_add(1, Ordering::Relaxed);
    debug!(source, "Fetching");
    let response = ctx
        .fetcher
        .open(source)
        .await
        .map_err(|e| not_found(e.to_string()))?;

    let total = response.content_length.filter(|len| *len > 0);
    let mut buffer = BytesMut::with_capacity(total.unwrap_or(0).min(16 * 1024 * 1024) as usize);
    let mut stream = response.stream;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| not_found(e.to_string()))?;
        buffer.extend_from_slice(&chunk);
        if let Some(total) = total {
            let progress = (buffer.len() as f64 / total as f64).min(1.0) as f32;
            ctx.report_progress(&job.key, job.operation, progress);
        }
    }

    debug!(source, bytes = buffer.len(), "Fetch complete");
    Ok(buffer.freeze())
}

async fn succeed(ctx: &PipelineContext, job: &PipelineJob, produced: Produced) {
    // Still registered, so requests arriving during the write keep coalescing
    let flags = ctx.registry.lock().pending.write_flags(&job.key, job.operation);
    let Some(flags) = flags else {
        debug!(key = %job.key, "Operation no longer pending, result discarded");
        return;
    };

    if !produced.from_cache
        && !ctx
            .chain
            .put_unless_cancelled(&job.key, produced.image.clone(), flags, &job.cancel)
            .await
    {
        debug!(key = %job.key, "Operation cancelled during cache write");
        return;
    }

    ctx.report_progress(&job.key, job.operation, 1.0);

    let op = ctx.registry.lock().complete(&job.key, job.operation);
    let Some(op) = op else {
        // Aborted after the write finished
        if !produced.from_cache && !flags.contains(RequestFlags::NO_CACHE) {
            ctx.chain.remove(&job.key).await;
        }
        return;
    };

    debug!(
        key = %job.key,
        subscribers = op.subscribers.len(),
        from_cache = produced.from_cache,
        "Delivering image"
    );
    let outcome: LoadResult = Ok(produced.image);
    for subscription in op.subscribers {
        subscription.deliver(&outcome);
    }
}

/// Runs queued jobs with at most `concurrency` in flight.
pub(crate) struct PipelineScheduler {
    ctx: Arc<PipelineContext>,
    jobs: mpsc::UnboundedReceiver<PipelineJob>,
    concurrency: usize,
}

impl PipelineScheduler {
    pub fn new(
        ctx: Arc<PipelineContext>,
        jobs: mpsc::UnboundedReceiver<PipelineJob>,
        concurrency: usize,
    ) -> Self {
        Self {
            ctx,
            jobs,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(mut self) {
        info!(workers = self.concurrency, "Pipeline scheduler started");
        let mut futures = FuturesUnordered::new();
        let mut accepting = true;
        let shutdown = self.ctx.shutdown.clone();

        loop {
            let in_progress = futures.len();
            if !accepting && in_progress == 0 {
                debug!("Job queue drained");
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!(in_progress, "Shutdown requested, dropping in-flight jobs");
                    break;
                }

                maybe_job = self.jobs.recv(), if accepting && in_progress < self.concurrency => {
                    match maybe_job {
                        Some(job) => {
                            debug!(key = %job.key, "Starting job");
                            futures.push(execute(self.ctx.clone(), job));
                        }
                        None => {
                            debug!("Job channel closed");
                            accepting = false;
                        }
                    }
                }

                Some(()) = futures.next(), if in_progress > 0 => {}

                else => break,
            }
        }
        info!("Pipeline scheduler finished");
    }
}
