//! Logging setup
//!
//! `RUST_LOG` takes precedence over the configured level.

/// Initialize the global logger
///
/// # Parameters
///
/// * `level` - Default filter used when `RUST_LOG` is not set
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialization (tests, embedding) keeps the first logger.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
