use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use indicatif::MultiProgress;
use tokio::sync::mpsc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use webimg_engine::{
    Image, ImageCodec, LoadError, LoaderBuilder, RasterCodec, Request, RequestFlags, Tag, listener,
};

mod cli;
mod error;
mod utils;

use cli::CliArgs;
use error::AppError;
use utils::progress::ProgressManager;
use utils::{create_dirs, format_bytes, output_name, parse_size};

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    info!("Webimg image loader - part of the rust-srec project");

    let memory_cache = parse_size(&args.memory_cache)?;
    let disk_cache = parse_size(&args.disk_cache)?;

    let mut builder = LoaderBuilder::new()
        .with_memory_cache_size(memory_cache)
        .with_worker_count(args.workers);
    if let Some(dir) = &args.cache_dir {
        info!(
            dir = %dir.display(),
            budget = %format_bytes(disk_cache),
            "Using disk cache"
        );
        builder = builder.with_disk_cache(dir.clone(), disk_cache);
    }
    let loader = builder.build().await?;
    info!(
        tiers = ?loader.cache_tiers(),
        memory = %format_bytes(memory_cache),
        workers = args.workers,
        "Loader ready"
    );

    if let Some(dir) = &args.output_dir {
        create_dirs(dir).await?;
    }

    let mut flags = RequestFlags::empty();
    if args.ignore_cache {
        flags |= RequestFlags::IGNORE_CACHE;
    }
    if args.no_cache {
        flags |= RequestFlags::NO_CACHE;
    }

    let multi = MultiProgress::new();
    let progress_manager = if args.no_progress {
        ProgressManager::new_disabled(multi.clone())
    } else {
        ProgressManager::new(multi.clone())
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<(Tag, Result<Arc<Image>, LoadError>)>();
    let mut bars = Vec::with_capacity(args.sources.len());

    for (index, source) in args.sources.iter().enumerate() {
        let tag = Tag::from(index as u64);
        let (bar, progress) = match progress_manager.track(source) {
            Some((bar, progress)) => (Some(bar), Some(progress)),
            None => (None, None),
        };
        bars.push(bar);

        let sender = tx.clone();
        let hit = loader.load(
            Some(tag.clone()),
            Request::new(source.as_str()).with_flags(flags),
            listener(move |tag, result| {
                if let Some(tag) = tag {
                    let _ = sender.send((tag.clone(), result));
                }
            }),
            progress,
        );
        if let Some(image) = hit {
            let _ = tx.send((tag, Ok(image)));
        }
    }
    drop(tx);

    let total = args.sources.len();
    let mut failures = 0;
    while let Some((tag, result)) = rx.recv().await {
        let Some(index) = tag.as_str().parse::<usize>().ok().filter(|i| *i < total) else {
            continue;
        };
        let source = &args.sources[index];
        if let Some(bar) = &bars[index] {
            bar.finish_and_clear();
        }

        match result {
            Ok(image) => {
                info!(
                    source = %source,
                    width = image.width(),
                    height = image.height(),
                    size = %format_bytes(image.size_estimate()),
                    "Loaded"
                );
                if let Some(dir) = &args.output_dir {
                    match write_png(&image, dir, &output_name(source, index)).await {
                        Ok(path) => info!(path = %path.display(), "Saved"),
                        Err(e) => {
                            warn!(source = %source, error = %e, "Failed to save image");
                            failures += 1;
                        }
                    }
                }
            }
            Err(e) => {
                error!(source = %source, error = %e, "Load failed");
                failures += 1;
            }
        }
    }

    let stats = loader.stats();
    info!(
        fetches = stats.fetches,
        coalesced = stats.coalesced,
        "Finished"
    );
    loader.shutdown();

    if failures > 0 {
        return Err(AppError::Failed(failures, total));
    }
    Ok(())
}

async fn write_png(image: &Image, dir: &Path, name: &str) -> Result<PathBuf, AppError> {
    let bytes = RasterCodec.encode(image)?;
    let path = dir.join(name);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}
