use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

use webimg_engine::OnProgress;

const BAR_LENGTH: u64 = 1000;

fn download_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {percent}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

#[derive(Clone)]
pub struct ProgressManager {
    multi: MultiProgress,
    disabled: bool,
}

impl ProgressManager {
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            disabled: false,
        }
    }

    pub fn new_disabled(multi: MultiProgress) -> Self {
        Self {
            multi,
            disabled: true,
        }
    }

    /// Add a bar for `source`, returning it with a progress callback driving it.
    pub fn track(&self, source: &str) -> Option<(ProgressBar, OnProgress)> {
        if self.disabled {
            return None;
        }

        let bar = self.multi.add(ProgressBar::new(BAR_LENGTH));
        bar.set_style(download_style());
        bar.set_message(format!("Loading {source}"));
        bar.enable_steady_tick(Duration::from_millis(500));

        let handle = bar.clone();
        let callback: OnProgress = std::sync::Arc::new(move |fraction: f32| {
            handle.set_position((fraction.clamp(0.0, 1.0) as f64 * BAR_LENGTH as f64) as u64);
        });
        Some((bar, callback))
    }
}
