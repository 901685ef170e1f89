use tracing_subscriber::EnvFilter;

/// Install the log subscriber for the command-line front end.
///
/// `log` records from every module are forwarded to a `tracing-subscriber` fmt layer.
/// Level is Debug in development builds and Info in production builds; `RUST_LOG`
/// overrides either.
pub fn init() {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
