use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "Image fetch, decode and cache tool",
    long_about = "Loads images from URLs or local paths through the webimg engine.\n\
                  \n\
                  Concurrent requests for the same image share one download, results\n\
                  are kept in a memory cache and optionally a persistent disk cache,\n\
                  and decoded images can be written out as PNG files."
)]
pub struct CliArgs {
    /// Sources to load
    #[arg(
        required = true,
        help = "URL(s) or path(s) of the images to load (http, https, file or plain paths)"
    )]
    pub sources: Vec<String>,

    /// Directory for the persistent cache
    #[arg(
        short = 'c',
        long,
        help = "Directory used for the disk cache (disabled when omitted)"
    )]
    pub cache_dir: Option<PathBuf>,

    /// Memory cache budget with optional unit (B, KB, MB, GB)
    #[arg(
        long,
        default_value = "30MB",
        help = "Memory cache budget with optional unit (B, KB, MB, GB). Use 0 to disable."
    )]
    pub memory_cache: String,

    /// Disk cache budget with optional unit (B, KB, MB, GB)
    #[arg(
        long,
        default_value = "256MB",
        help = "Disk cache budget with optional unit (B, KB, MB, GB). Only used with --cache-dir."
    )]
    pub disk_cache: String,

    /// Number of concurrent loads
    #[arg(
        short = 'w',
        long,
        default_value = "4",
        help = "Maximum number of images fetched and decoded at once"
    )]
    pub workers: usize,

    /// Output directory for decoded images
    #[arg(
        short,
        long,
        help = "Write every decoded image as PNG into this directory"
    )]
    pub output_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Hide progress bars
    #[arg(long, help = "Do not show download progress bars")]
    pub no_progress: bool,

    /// Bypass cache reads
    #[arg(long, help = "Skip cache lookups; results are still written to the cache")]
    pub ignore_cache: bool,

    /// Bypass cache writes
    #[arg(long, help = "Do not store results in any cache")]
    pub no_cache: bool,
}
