//! Structured logging for the shell.
//!
//! Log lines go to stderr so they never interleave with program output on
//! stdout. `JOLT_LOG` wins over the `--log-level` flag, which wins over the
//! `[log] level` config key.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "JOLT_LOG";
pub const DEFAULT_LEVEL: &str = "warn";

/// The filter directive to install.
pub fn directive(env: Option<&str>, flag: Option<&str>, configured: Option<&str>) -> String {
    [env, flag, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|d| !d.is_empty())
        .unwrap_or(DEFAULT_LEVEL)
        .to_string()
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(flag: Option<&str>, configured: Option<&str>) {
    let env = std::env::var(LOG_ENV).ok();
    let directive = directive(env.as_deref(), flag, configured);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("warning: invalid log filter '{}': {}", directive, err);
        EnvFilter::new(DEFAULT_LEVEL)
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_env_then_flag_then_config() {
        assert_eq!(directive(Some("trace"), Some("info"), Some("debug")), "trace");
        assert_eq!(directive(None, Some("info"), Some("debug")), "info");
        assert_eq!(directive(Some("  "), None, Some("debug")), "debug");
        assert_eq!(directive(None, None, None), DEFAULT_LEVEL);
    }
}
