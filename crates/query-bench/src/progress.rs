//! Progress reporting for dispatch runs.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Observer notified as the dispatcher consumes tasks.
///
/// Purely informational: nothing reported here feeds back into scheduling.
pub trait ProgressObserver: Send + Sync {
    /// Called once before the first task, with the expected item count if known.
    fn start(&self, _total: Option<u64>) {}

    /// Called once per fully completed (consumed) task.
    fn advance(&self);

    /// Called when the run ends, successfully or not.
    fn finish(&self) {}
}

/// Discards all progress updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn advance(&self) {}
}

/// Terminal progress bar.
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(message: impl Into<String>) -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        bar.set_message(message.into());
        Self { bar }
    }

    /// A reporter that counts but never draws.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl ProgressObserver for ProgressReporter {
    fn start(&self, total: Option<u64>) {
        let style = match total {
            Some(total) => {
                self.bar.set_length(total);
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} requests {per_sec} {msg}")
            }
            None => ProgressStyle::default_spinner()
                .template("[{elapsed_precise}] {spinner} {pos} requests {per_sec} {msg}"),
        };
        if let Ok(style) = style {
            self.bar.set_style(style.progress_chars("##-"));
        }
    }

    fn advance(&self) {
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_reporter_tracks_position() {
        let reporter = ProgressReporter::hidden();
        reporter.start(Some(3));
        reporter.advance();
        reporter.advance();
        assert_eq!(reporter.bar.position(), 2);
        reporter.finish();
    }
}
