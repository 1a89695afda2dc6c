//! Structured logging setup, grounded on the `slog`/`sloggers` pairing used throughout the
//! corpus: a root `slog::Logger` is built once at process start and cloned/child-loggers are
//! handed down to each component so every log line carries its own `context`/`channel_id`/
//! `endpoint` key-values.

pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Builds the process-wide root logger. `verbose` maps to `debug` level, otherwise `info`.
pub fn root_logger(verbose: bool) -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(if verbose { Severity::Debug } else { Severity::Info });
    builder.destination(Destination::Stderr);

    builder
        .build()
        .unwrap_or_else(|_| Logger::root(Discard, o!()))
}

/// A logger that discards everything. Used in tests and by collaborators that were not handed
/// a real logger.
pub fn null_logger() -> Logger {
    Logger::root(Discard, o!())
}
