use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing. `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}
