pub mod config;
pub mod error;
pub mod types;

pub use config::AdaptiveConfig;
pub use error::{CoreError, CoreResult};
