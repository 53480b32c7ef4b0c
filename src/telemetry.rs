use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding an `EnvFilter` directive, e.g.
/// `BOARDSYNC_LOG=boardsync::sync=trace`.
pub const LOG_ENV: &str = "BOARDSYNC_LOG";

fn default_directive(verbose: bool) -> &'static str {
    if verbose { "boardsync=debug,info" } else { "warn" }
}

/// Build the filter: `BOARDSYNC_LOG` when set and valid, otherwise the
/// default for the verbosity.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays clean. Calling this twice is harmless.
pub fn init_logging(verbose: bool, json: bool) {
    let filter = env_filter(verbose);
    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
