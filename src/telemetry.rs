use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` controls verbosity; raw model responses and dispatched tool
/// calls are emitted at `debug`, so `RUST_LOG=nimbus=debug` reproduces the
/// original's debug traces.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nimbus=info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
