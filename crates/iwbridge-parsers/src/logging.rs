//! Structured logging for iwbridge
//!
//! Log lines go to stderr so that `--format json` output on stdout stays
//! machine readable. `RUST_LOG` overrides the configured filter.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Include the module path of each event
    pub targets: bool,
    /// Include the worker thread name, useful with `--workers > 1`
    pub thread_names: bool,
    /// Include file and line of each event
    pub source_locations: bool,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from_verbosity(1)
    }
}

impl LogConfig {
    /// Map a `-v` count onto a filter and output detail
    pub fn from_verbosity(verbosity: u8) -> Self {
        let filter = match verbosity {
            0 => "warn",
            1 => "warn,iwbridge=info",
            2 => "info,iwbridge=debug",
            _ => "trace",
        };
        Self {
            filter: filter.to_string(),
            targets: verbosity >= 2,
            thread_names: verbosity >= 2,
            source_locations: verbosity >= 3,
            ansi: true,
        }
    }
}

/// Install the global subscriber
///
/// Returns `false` when a subscriber was already installed, either by an
/// earlier call or by the embedding application.
pub fn init(config: &LogConfig) -> bool {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return false;
    }

    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_target(config.targets)
        .with_thread_names(config.thread_names)
        .with_file(config.source_locations)
        .with_line_number(config.source_locations);

    tracing_subscriber::registry().with(filter).with(layer).try_init().is_ok()
}

#[macro_export]
macro_rules! log_parse_start {
    ($parser:expr, $source:expr) => {
        tracing::trace!(parser = %$parser, source = %$source, "Reading container");
    };
}

#[macro_export]
macro_rules! log_parse_complete {
    ($parser:expr, $duration:expr, $items:expr) => {
        tracing::debug!(
            parser = %$parser,
            elapsed_us = $duration.as_micros() as u64,
            chunks = $items,
            "Container read"
        );
    };
}

#[macro_export]
macro_rules! log_parse_error {
    ($parser:expr, $error:expr) => {
        tracing::warn!(parser = %$parser, error = %$error, "Container rejected");
    };
}

/// Run `f` inside a `parse` span tagged with the parser and asset
pub fn instrument_parse<T>(parser: &str, asset: &str, f: impl FnOnce() -> T) -> T {
    let span = tracing::debug_span!("parse", parser, asset);
    let _entered = span.enter();
    f()
}

/// Span covering one batch
pub fn batch_span(total: usize, workers: usize) -> tracing::Span {
    tracing::info_span!("batch", total, workers)
}

/// Completion counter shared by the workers of one batch
///
/// Logs roughly every five percent and always on the last asset.
#[derive(Debug)]
pub struct BatchProgress {
    done: AtomicUsize,
    total: usize,
    step: usize,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self::starting_at(0, total)
    }

    /// Counter that already includes `done` finished assets
    pub fn starting_at(done: usize, total: usize) -> Self {
        Self {
            done: AtomicUsize::new(done),
            total,
            step: (total / 20).max(1),
        }
    }

    /// Record one finished asset and return the new count
    pub fn finish_one(&self) -> usize {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.step == 0 || done == self.total {
            tracing::info!(done, total = self.total, percent = self.percent_of(done), "Batch progress");
        }
        done
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    fn percent_of(&self, done: usize) -> u32 {
        if self.total == 0 {
            100
        } else {
            (done * 100 / self.total) as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_widens_the_filter() {
        assert_eq!(LogConfig::from_verbosity(0).filter, "warn");
        assert!(LogConfig::default().filter.contains("iwbridge=info"));
        assert_eq!(LogConfig::from_verbosity(7).filter, "trace");
        assert!(LogConfig::from_verbosity(3).source_locations);
        assert!(!LogConfig::from_verbosity(1).thread_names);
    }

    #[test]
    fn instrument_parse_returns_the_closure_value() {
        assert_eq!(instrument_parse("container", "props/rock", || 42), 42);
    }

    #[test]
    fn second_init_is_refused() {
        init(&LogConfig::from_verbosity(0));
        assert!(!init(&LogConfig::from_verbosity(0)));
    }

    #[test]
    fn progress_counts_every_asset() {
        let progress = BatchProgress::starting_at(2, 5);
        assert_eq!(progress.finish_one(), 3);
        assert_eq!(progress.finish_one(), 4);
        assert_eq!(progress.done(), 4);
        assert_eq!(progress.percent_of(5), 100);
        assert_eq!(BatchProgress::new(0).percent_of(0), 100);
    }
}
