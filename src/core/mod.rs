pub mod constants;
pub mod error;

pub use error::{PreviewError, PreviewResult};
