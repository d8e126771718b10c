//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system
///
/// Honours `RUST_LOG` when it is set; defaults to `info` otherwise.
pub fn init() {
    init_with_level("info");
}

/// Initialize the logging system with a default filter (e.g. `"debug"`,
/// `"scene_engine=trace"`). `RUST_LOG` still takes precedence.
///
/// Safe to call more than once; only the first call installs the logger.
pub fn init_with_level(default_filter: &str) {
    let result = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter),
    )
    .try_init();

    if result.is_err() {
        log::debug!("Logger already initialized, keeping existing configuration");
    }
}
