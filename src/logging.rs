//! Tracing subscriber setup: stderr output filtered by `RUST_LOG` or `-v` levels.

use std::io;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::{TARGET_LLM_REQUEST, TARGET_WEB_REQUEST};

/// Default filter directives for a verbosity level (number of `-v` flags)
pub fn default_directives(verbosity: u8) -> String {
    match verbosity {
        0 => format!("warn,{}=warn,{}=warn", TARGET_LLM_REQUEST, TARGET_WEB_REQUEST),
        1 => format!("info,{}=info,{}=warn", TARGET_LLM_REQUEST, TARGET_WEB_REQUEST),
        _ => format!("debug,{}=debug,{}=debug", TARGET_LLM_REQUEST, TARGET_WEB_REQUEST),
    }
}

/// Install the stderr subscriber. `RUST_LOG` takes precedence over `verbosity`.
pub fn configure_logging(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

    // Stdout carries the report, so logs go to stderr
    let stderr_log = fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .with_filter(filter);

    tracing_subscriber::Registry::default()
        .with(stderr_log)
        .init();
}
