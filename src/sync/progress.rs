use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};

/// Receives byte-level download progress. Purely observational.
pub trait ProgressSink: Send + Sync {
    fn start(&self, name: &str, total_bytes: u64);
    fn advance(&self, bytes: u64);
    fn finish(&self);
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&self, _name: &str, _total_bytes: u64) {}
    fn advance(&self, _bytes: u64) {}
    fn finish(&self) {}
}

/// Per-item byte bar rendered by `indicatif`.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::hidden();
        // The template is a literal; fall back to the default style if
        // indicatif ever rejects it.
        let style = ProgressStyle::with_template(
            "{msg:30!} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .map(|s| s.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn start(&self, name: &str, total_bytes: u64) {
        self.bar.reset();
        self.bar.set_length(total_bytes);
        self.bar.set_message(name.to_string());
        self.bar
            .set_draw_target(indicatif::ProgressDrawTarget::stderr());
    }

    fn advance(&self, bytes: u64) {
        self.bar.inc(bytes);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
}

/// Returns `NoProgress` when the user passed `--no-progress-bar` or stderr is
/// not a TTY (e.g. cron jobs), which keeps log output uncorrupted.
pub fn create_progress_sink(no_progress_bar: bool) -> Box<dyn ProgressSink> {
    if no_progress_bar || !std::io::stderr().is_terminal() {
        return Box::new(NoProgress);
    }
    Box::new(BarProgress::new())
}
