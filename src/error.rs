//! Configuration error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field} must be a power of two, got {value}")]
    NotPowerOfTwo { field: &'static str, value: usize },

    #[error("Spectrum resolution {value} outside supported range {min}..={max}")]
    ResolutionOutOfRange { value: usize, min: usize, max: usize },

    #[error("Explicit wave threshold must be finite and non-negative, got {0}")]
    InvalidThreshold(f32),

    #[error("Invalid capacity: {field}={value}")]
    InvalidCapacity { field: &'static str, value: usize },

    #[error("Invalid tile size scale: index={index}, value={value}")]
    InvalidTileScale { index: usize, value: f32 },

    #[error("Settings parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
