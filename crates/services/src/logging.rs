use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber writing to stderr.
///
/// `directives` uses `EnvFilter` syntax (`info`, `services=debug,warn`);
/// invalid directives fall back to `info`. Calling this twice is a no-op.
pub fn init_tracing(directives: &str) {
    let env_filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}
