use indicatif::{ProgressBar, ProgressStyle};

/// Receives `(processed, total, elapsed_ms)` while the text scanner walks files
pub trait ProgressSink: Send + Sync {
    fn progress(&self, processed: usize, total: usize, elapsed_ms: u64);

    fn finish(&self) {}
}

/// Discards progress updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn progress(&self, _processed: usize, _total: usize, _elapsed_ms: u64) {}
}

/// Terminal progress bar
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn progress(&self, processed: usize, total: usize, _elapsed_ms: u64) {
        self.bar.set_length(total as u64);
        self.bar.set_position(processed as u64);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
