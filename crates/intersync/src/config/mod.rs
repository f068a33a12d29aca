//! Environment-driven configuration.

mod settings;

pub use settings::{
    parse_bool, Settings, DEFAULT_ENDPOINT, DEFAULT_FILES_DIR, DEFAULT_LOG_LEVEL,
};
