use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber, writing to stderr.
///
/// `JOYTASK_LOG` wins over `RUST_LOG`, which wins over the configured level.
/// Defaults to `warn` so command output stays readable.
pub fn init(configured: Option<&str>) {
    let filter = std::env::var("JOYTASK_LOG")
        .ok()
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .or_else(|| configured.map(EnvFilter::new))
        .unwrap_or_else(|| EnvFilter::new("warn"));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
