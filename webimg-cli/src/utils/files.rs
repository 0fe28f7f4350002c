use std::path::Path;

use url::Url;

use crate::error::AppError;

/// Creates all directories in the given path, including parent directories if they don't exist.
#[inline]
pub async fn create_dirs(path: &Path) -> Result<(), AppError> {
    tokio::fs::create_dir_all(path).await.map_err(AppError::Io)
}

/// Output file name for a source: its last path segment without extension,
/// restricted to filesystem-safe characters and suffixed with the source index.
pub fn output_name(source: &str, index: usize) -> String {
    let segment = match Url::parse(source) {
        Ok(url) if url.scheme().len() > 1 => url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or_default()
            .to_string(),
        _ => Path::new(source)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let stem = match segment.rfind('.') {
        Some(pos) if pos > 0 => &segment[..pos],
        _ => segment.as_str(),
    };

    let mut name: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(30)
        .collect();
    if name.is_empty() {
        name.push_str("image");
    }

    format!("{name}_{index}.png")
}
