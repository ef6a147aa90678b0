// src/logging.rs
//
// Diagnostic logging setup for binaries and harnesses.
//
// Library code only emits `tracing` events; installing a subscriber is the
// caller's choice. `RUST_LOG` wins over the verbosity flag.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter for a given `-v` count.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "dctwin=info",
        1 => "dctwin=debug",
        _ => "dctwin=trace",
    }
}

/// Install a stderr fmt subscriber. A second call is a no-op.
pub fn init_tracing(verbosity: u8) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(verbosity).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
