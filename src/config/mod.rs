//! Configuration loading
//!
//! The root [`Config`] is read from TOML once at startup, validated, and then
//! passed by reference to the components that need it. Nothing reads
//! configuration from ambient global state.

pub mod macros;
pub mod schemas;
pub mod utils;

pub use schemas::*;
pub use utils::{load_config, load_config_from_path, parse_config, CONFIG_FILE_PATH};
