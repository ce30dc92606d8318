//! Builds the root `slog::Logger` used throughout the channel runtime.
//!
//! Components take a `&slog::Logger` at construction time and derive their
//! own child logger via `log.new(o!(...))`, matching the rest of the crate.

use serdeconv;
use slog;
use sloggers::{self, Config, LoggerConfig};

// Re-exported so call sites write `logging::Logger`, `logging::debug!(...)`,
// `logging::o!(...)` against this module rather than reaching for `slog`
// directly everywhere a channel logs.
pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

/// Terminal logging destination, mirrored from `sloggers::types::Destination`
/// so callers configuring a [`LogSettings`] don't need the `sloggers` crate
/// directly in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    Stderr,
}

impl Destination {
    fn as_str(self) -> &'static str {
        match self {
            Destination::Stdout => "stdout",
            Destination::Stderr => "stderr",
        }
    }
}

/// Minimal logging configuration. Defaults match what the channel runtime
/// used during development: terminal output on stderr at debug level.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: String,
    pub destination: Destination,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            level: "debug".to_owned(),
            destination: Destination::Stderr,
        }
    }
}

/// Builds the root logger from the supplied settings.
///
/// Panics if the generated config is malformed — this only happens if
/// `LogSettings::level` is not a level `sloggers` recognizes, which is a
/// startup bug, not a recoverable condition.
pub fn build(settings: &LogSettings) -> slog::Logger {
    let toml = format!(
        r#"
type = "terminal"
level = "{}"
destination = "{}"
"#,
        settings.level,
        settings.destination.as_str()
    );

    let config: LoggerConfig =
        serdeconv::from_toml_str(&toml).expect("invalid logging configuration");

    config.build_logger().expect("failed to build logger")
}

/// Convenience constructor for the common case: debug level, stderr.
pub fn init() -> slog::Logger {
    build(&LogSettings::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_build_a_logger() {
        let _log = init();
    }

    #[test]
    fn custom_destination_builds() {
        let settings = LogSettings {
            level: "info".to_owned(),
            destination: Destination::Stdout,
        };
        let _log = build(&settings);
    }
}
