//! Logging utilities

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when neither `RUST_LOG` nor `JOEY_LOG_LEVEL` is set
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `JOEY_LOG_LEVEL`. Output goes to stderr so it never
/// mixes with streamed reply text on stdout. Calling this twice is harmless.
pub fn init_logging() {
    let level = std::env::var("JOEY_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
