//! Tracing setup for redline binaries.
//!
//! Logs go to stderr so stdout stays free for run summaries and
//! `--report-json` output. In JSON mode the `event` field from [`crate::obs`]
//! sits at the top level of each line next to the enclosing run span, so
//! lines can be filtered by `event` and grouped by `run_id` directly.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "REDLINE_LOG";

/// Pick the filter directives: `REDLINE_LOG`, then `RUST_LOG`, then `level`.
fn directives(redline_log: Option<String>, rust_log: Option<String>, level: Level) -> String {
    redline_log
        .into_iter()
        .chain(rust_log)
        .find(|d| !d.trim().is_empty())
        .unwrap_or_else(|| level.as_str().to_ascii_lowercase())
}

fn env_filter(level: Level) -> EnvFilter {
    let wanted = directives(
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        level,
    );
    EnvFilter::try_new(&wanted).unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing(json: bool, level: Level) {
    let registry = tracing_subscriber::registry().with(env_filter(level));

    if json {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
            .ok();
    }
}
