//! Logging setup.

/// Installs a stderr `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies. Safe to
/// call more than once: later calls are ignored.
pub fn init_logging(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
