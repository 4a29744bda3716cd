use env_logger::{Builder, Env};

/// Initialise the global logger. Writes to stderr, `RUST_LOG` wins over the defaults.
pub fn setup_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .format_target(false)
        .init();
}
