//! Tracing initialisation for histpurge binaries.
//!
//! Logs go to stderr so stdout stays free for the purge report.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "HISTPURGE_LOG";

/// Install the global subscriber.
///
/// `HISTPURGE_LOG` wins over `level` when set. With `json`, each line is a
/// JSON object. Only the first call in a process has any effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    result.ok();
}
