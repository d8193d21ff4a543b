// Oryx Object Model
// Classes, method dispatch, directories and stem variables for a
// class-based interpreted language

pub mod arena;
pub mod builtins;
pub mod config;
pub mod error;
pub mod vm;

pub use config::RuntimeConfig;
pub use error::{ErrorKind, OryxError, OryxResult};
pub use vm::{Activation, Value, VM};

use std::io::Write;

/// Install the env_logger backend with the configured filter.
/// Safe to call more than once; only the first call installs a logger.
pub fn init_logging(config: &RuntimeConfig) {
    let mut builder = env_logger::Builder::new();
    builder
        .parse_filters(&config.log_filter)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        });
    let _ = builder.try_init();
}
