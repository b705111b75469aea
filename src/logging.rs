use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install the global subscriber. `RUST_LOG` takes precedence over the default level.
pub fn init_tracing(verbose: bool) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let default_level = if verbose { "creditbook=debug" } else { "creditbook=info" };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    });
}
