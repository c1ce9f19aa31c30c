//! Logging setup.
//!
//! All components log through `tracing`. The binary installs one global
//! `tracing-subscriber` at startup from [`LoggingSettings`]. `RUST_LOG`, when
//! set, takes precedence over the configured level.
//!
//! With `json: true` each line is a JSON object, e.g.
//!
//! ```json
//! {"timestamp":"...","level":"DEBUG","target":"rspolicy_domain::cache::policy","fields":{"message":"Invalidating enforcer","policy_id":"com.example:p1"}}
//! ```
//!
//! At `debug` and `trace` the close event of every span is logged with its
//! busy and idle time, which covers cache loads and owner commands.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;

/// Builds the filter: `RUST_LOG` if set, else the configured level.
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.level.to_lowercase()))
}

fn span_events(settings: &LoggingSettings) -> FmtSpan {
    match settings.level.to_lowercase().as_str() {
        "trace" | "debug" => FmtSpan::CLOSE,
        _ => FmtSpan::NONE,
    }
}

/// Installs the global subscriber.
///
/// Returns false if a subscriber was already installed, in which case the
/// existing one stays in place.
pub fn init_logging(settings: &LoggingSettings) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(settings));
    let layer = fmt::layer()
        .with_target(true)
        .with_span_events(span_events(settings));

    let installed = if settings.json {
        registry.with(layer.json().with_current_span(true)).try_init()
    } else {
        registry.with(layer).try_init()
    };
    installed.is_ok()
}
