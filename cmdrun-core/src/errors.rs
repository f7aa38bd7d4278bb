/// Result type alias for fallible setup paths (config loading and the like).
pub type Result<T> = anyhow::Result<T>;

pub use cmdrun_error::{ConfigError, ConstructionError, HalError};
