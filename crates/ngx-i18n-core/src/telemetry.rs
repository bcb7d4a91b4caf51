//! Tracing initialisation for the ngx-xlf-xlsx binary.
//!
//! Call [`init_tracing`] once per process, after dispatch, with the
//! `RUST_LOG` value taken from the capability context. The process
//! environment is never consulted. Log lines go to stderr so stdout stays
//! reserved for command output.
//!
//! Safe to call more than once; only the first call installs a subscriber.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Name of the context variable holding filter directives.
pub const LOG_FILTER_VAR: &str = "RUST_LOG";

/// Filter from `directives` when they parse, else `level` for everything.
pub fn build_filter(directives: Option<&str>, level: Level) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()))
}

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON log lines.
/// * `level`: verbosity when `directives` is absent or invalid.
/// * `directives`: `RUST_LOG`-style filter from the context env.
pub fn init_tracing(json: bool, level: Level, directives: Option<&str>) {
    let env_filter = build_filter(directives, level);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_win_over_level() {
        let filter = build_filter(Some("ngx_i18n_core=trace"), Level::WARN);
        assert_eq!(filter.to_string(), "ngx_i18n_core=trace");
    }

    #[test]
    fn test_fallback_to_level() {
        assert_eq!(build_filter(None, Level::WARN).to_string(), "warn");
        assert_eq!(build_filter(Some("  "), Level::DEBUG).to_string(), "debug");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false, Level::ERROR, None);
        init_tracing(true, Level::ERROR, Some("off"));
    }
}
