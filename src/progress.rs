//! Batch sync progress and a log writer that keeps the bar pinned.
//!
//! Log lines go through the same `MultiProgress` as the bar, so `tracing`
//! output scrolls above it instead of tearing it.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

fn multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        mp
    })
}

fn emit_line(line: &str) {
    let _ = multi_progress().println(line.trim_end_matches('\r'));
}

/// Progress over a batch of sources; a no-op when there is nothing to show
pub struct SyncProgress {
    bar: Option<ProgressBar>,
}

impl SyncProgress {
    /// Start a bar for `len` sources. Hidden when `len < 2` or `quiet`.
    pub fn start(len: usize, quiet: bool) -> Self {
        if quiet || len < 2 {
            return Self { bar: None };
        }

        let bar = multi_progress().add(ProgressBar::new(len as u64));
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(style);
        bar.set_message("syncing");
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar: Some(bar) }
    }

    /// Note the source about to run
    pub fn begin(&self, source_name: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(source_name.to_string());
        }
    }

    pub fn advance(&self) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    pub fn finish(self, succeeded: usize, failed: usize) {
        if let Some(bar) = self.bar {
            bar.finish_with_message(format!("{} synced, {} failed", succeeded, failed));
        }
    }
}

#[derive(Default, Clone)]
pub struct LogWriterFactory;

/// Line-buffered writer handed to the fmt layer
pub struct LogWriter {
    pending: String,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.push_str(&String::from_utf8_lossy(buf));

        while let Some(idx) = self.pending.find('\n') {
            emit_line(&self.pending[..idx]);
            self.pending.drain(..=idx);
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            emit_line(&self.pending);
            self.pending.clear();
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            pending: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_progress_is_noop() {
        let progress = SyncProgress::start(1, false);
        assert!(progress.bar.is_none());
        progress.begin("only");
        progress.advance();
        progress.finish(1, 0);

        assert!(SyncProgress::start(10, true).bar.is_none());
    }

    #[test]
    fn test_log_writer_buffers_partial_lines() {
        let factory = LogWriterFactory;
        let mut writer = factory.make_writer();
        writer.write_all(b"first line\nsecond ").unwrap();
        assert_eq!(writer.pending, "second ");
        writer.write_all(b"half\n").unwrap();
        assert!(writer.pending.is_empty());
    }
}
