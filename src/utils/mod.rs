//! Utility modules shared across the registry

pub mod logging;
pub mod time;

pub use logging::{init_logging, init_logging_from_config};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use time::current_timestamp;
