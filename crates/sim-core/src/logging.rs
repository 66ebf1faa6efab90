//! Log output for the binary.

use tracing_subscriber::EnvFilter;

/// Picks the filter directive: an explicit command line level, then
/// `RUST_LOG`, then the configured level.
pub fn filter_directive(
    config_level: &str,
    cli_level: Option<&str>,
    env: Option<&str>,
) -> String {
    cli_level
        .or(env.filter(|v| !v.trim().is_empty()))
        .unwrap_or(config_level)
        .to_string()
}

/// Installs a stderr `tracing` subscriber.
///
/// Calling this more than once keeps the first subscriber.
pub fn init_logging(config_level: &str, cli_level: Option<&str>) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = filter_directive(config_level, cli_level, env.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("invalid log filter '{}': {}; using '{}'", directive, e, config_level);
        EnvFilter::new(config_level)
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
