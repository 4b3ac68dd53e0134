//! Tracing setup.
//!
//! Logs go to stderr so stdout stays parseable for scripts.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable overriding the configured filter,
/// e.g. `SCOUT_LOG=repo_scout::explorer=debug,repo_scout=info`.
pub const LOG_ENV: &str = "SCOUT_LOG";

static INIT: Once = Once::new();

/// Filter directive for a bare level such as `"debug"`.
fn directive_for(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') {
        return level.to_string();
    }
    format!("repo_scout={level},repo_scout_core={level}")
}

/// Install the global subscriber. Idempotent.
///
/// `SCOUT_LOG` wins over `level`; an invalid `level` falls back to `info`.
pub fn init_logging(level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_new(directive_for(level)))
            .unwrap_or_else(|_| EnvFilter::new(directive_for("info")));

        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .with(filter)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_levels_expand_to_crate_targets() {
        assert_eq!(
            directive_for("debug"),
            "repo_scout=debug,repo_scout_core=debug"
        );
        assert_eq!(directive_for("repo_scout=warn"), "repo_scout=warn");
    }

    #[test]
    fn init_is_idempotent() {
        init_logging("info");
        init_logging("debug");
    }
}
