//! Error types for noise volume generation.
//!
//! Configuration problems are reported before any GPU resource is touched.
//! Resource failures abort the current pass; transient buffers created in
//! that pass are still released by their scope.

use thiserror::Error;

/// Result alias used throughout the crate
pub type NoiseResult<T> = Result<T, NoiseError>;

#[derive(Debug, Error)]
pub enum NoiseError {
    // Configuration errors
    #[error("Invalid config: {field} = {value} ({reason})")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config {path}: {error}")]
    ConfigRead { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Wire contract errors
    #[error("Record layout mismatch in {record}.{field}: expected offset {expected}, found {found}")]
    LayoutMismatch {
        record: &'static str,
        field: &'static str,
        expected: usize,
        found: usize,
    },

    // Resource errors
    #[error("No suitable GPU adapter found")]
    DeviceNotFound,

    #[error("GPU device request failed: {0}")]
    DeviceRequest(String),

    #[error("Failed to allocate {side}^3 volume: {reason}")]
    VolumeAllocation { side: u32, reason: String },

    #[error("Failed to create buffer '{label}' ({size} bytes): {reason}")]
    BufferCreation {
        label: String,
        size: u64,
        reason: String,
    },

    #[error("Unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u64 },

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Readback failed: {0}")]
    Readback(String),
}

impl NoiseError {
    /// Shorthand for configuration errors
    pub fn invalid_config(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        NoiseError::InvalidConfig {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors raised before any host call was made
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            NoiseError::InvalidConfig { .. }
                | NoiseError::ConfigRead { .. }
                | NoiseError::ConfigParse(_)
        )
    }
}
