//! Error handling for the effect chain
//!
//! Every mutating chain operation reports failure synchronously through
//! [`ChainError`]. Nothing here is ever raised on the processing thread.

use thiserror::Error;

/// Result type alias for chain operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Main error type for chain operations
#[derive(Error, Debug)]
pub enum ChainError {
    // Stage Errors
    #[error("Failed to load unit '{unit_id}': {reason}")]
    UnitLoadFailed { unit_id: String, reason: String },

    #[error("No compatible channel layout for '{unit_id}' (target: {target})")]
    LayoutUnavailable { unit_id: String, target: String },

    #[error("Stage index {index} out of range (chain has {len} stages)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("{feature} not yet implemented")]
    FeatureNotImplemented { feature: String },

    // Configuration Errors
    #[error("Invalid chain configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChainError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ChainError::UnitLoadFailed { .. } => "UNIT_LOAD_FAILED",
            ChainError::LayoutUnavailable { .. } => "LAYOUT_UNAVAILABLE",
            ChainError::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            ChainError::FeatureNotImplemented { .. } => "FEATURE_NOT_IMPLEMENTED",
            ChainError::InvalidConfig { .. } => "INVALID_CONFIG",
            ChainError::Io(_) => "IO_ERROR",
            ChainError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the caller can retry with different inputs
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChainError::UnitLoadFailed { .. }
                | ChainError::LayoutUnavailable { .. }
                | ChainError::IndexOutOfRange { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ChainError::UnitLoadFailed { .. } => vec![
                "Check that the unit identifier is correct",
                "Retry with a different settings payload",
            ],
            ChainError::LayoutUnavailable { .. } => vec![
                "Retry with the default layout",
                "Reconfigure the chain channels to match the unit",
            ],
            ChainError::IndexOutOfRange { .. } => vec!["Refresh the chain listing and retry"],
            ChainError::FeatureNotImplemented { .. } => {
                vec!["Use a regular (non multi-mono) layout"]
            }
            ChainError::InvalidConfig { .. } => vec![
                "Sample rate and block size must be positive",
                "At least one input or output channel is required",
            ],
            _ => vec![],
        }
    }

    pub(crate) fn index_out_of_range(index: usize, len: usize) -> Self {
        ChainError::IndexOutOfRange { index, len }
    }
}
