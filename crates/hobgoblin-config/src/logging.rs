//! Root logger bootstrap (spec.md §3 AMBIENT: logging).
//!
//! Grounded directly on `flux::logging::init`: an embedded-TOML
//! `sloggers::LoggerConfig` parsed with `serdeconv` and built into a
//! `slog::Logger`. Unlike the teacher, the logger is returned rather than
//! discarded, since every crate downstream takes a `Logger` (or a child of
//! one) as an explicit argument instead of reaching for a process-global.

use sloggers::Config;

use crate::error::LoggingError;

const DEFAULT_LOGGER_TOML: &str = r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#;

/// Build the root logger from the embedded default config, mirroring
/// `flux::logging::init`'s unconditional terminal/stderr/debug setup.
pub fn init() -> Result<slog::Logger, LoggingError> {
    init_from_toml(DEFAULT_LOGGER_TOML)
}

/// Build the root logger from a caller-supplied TOML document, for hosts
/// that want to route logs elsewhere (file, syslog) without touching this
/// crate.
pub fn init_from_toml(toml: &str) -> Result<slog::Logger, LoggingError> {
    let config: sloggers::LoggerConfig = serdeconv::from_toml_str(toml).map_err(LoggingError::Parse)?;
    config.build_logger().map_err(LoggingError::Build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_logger_config_builds_successfully() {
        init().expect("default logger config should build");
    }

    #[test]
    fn malformed_toml_surfaces_a_parse_error() {
        let result = init_from_toml("not valid toml {{{");
        assert!(matches!(result, Err(LoggingError::Parse(_))));
    }
}
