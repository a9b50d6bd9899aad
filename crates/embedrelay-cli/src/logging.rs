use tracing_subscriber::EnvFilter;

/// Initialize structured logging for the relay CLI.
///
/// `RUST_LOG` wins when set. Otherwise the `--log-level` flag drives the
/// default directive, with the HTTP client internals held at `warn` so a
/// debug run shows pipeline activity rather than connection chatter.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{log_level},hyper=warn,reqwest=warn,rustls=warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
