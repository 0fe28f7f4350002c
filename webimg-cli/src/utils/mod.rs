mod files;
pub mod progress;
mod size;

// Export utility functions
pub use self::files::{create_dirs, output_name};
pub use self::size::{format_bytes, parse_size};
