pub mod cache;
pub mod config;
pub mod core;
pub mod dedup;
pub mod freshness;
pub mod logger;
pub mod service;
pub mod source;
pub mod vesting;

pub use crate::core::{PreviewError, PreviewResult};
