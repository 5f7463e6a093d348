//! # Error Types
//!
//! Custom error types for the remapper using `thiserror`.

use thiserror::Error;

/// Main error type for the remapper
#[derive(Debug, Error)]
pub enum RemapError {
    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A single mapping failed validation
    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),

    /// A key, axis or output name evdev does not know
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    /// Malformed macro text
    #[error("Macro syntax error: {0}")]
    MacroSyntax(String),

    /// No virtual output device is registered under this name
    #[error("Unknown output device: {0}")]
    UnknownTarget(String),

    /// A computed output value does not fit into an input event
    #[error("Output value {value} out of range for event ({ev_type}, {code})")]
    Overflow {
        ev_type: u16,
        code: u16,
        value: f64,
    },

    /// The output multiplexer task is gone
    #[error("Output multiplexer closed")]
    OutputClosed,

    /// The handler graph was assembled incorrectly. This is a bug, not a user error.
    #[error("Handler invariant violated: {0}")]
    HandlerInvariant(String),

    /// The source device disappeared while reading
    #[error("Device lost: {device}: {source}")]
    DeviceLost {
        device: String,
        #[source]
        source: std::io::Error,
    },

    /// No matching source device was found
    #[error("Input device not found: {0}")]
    DeviceNotFound(String),
}

impl RemapError {
    /// Whether this error belongs to one mapping and should only disable that mapping.
    #[must_use]
    pub fn is_mapping_error(&self) -> bool {
        matches!(
            self,
            RemapError::InvalidMapping(_)
                | RemapError::UnknownSymbol(_)
                | RemapError::MacroSyntax(_)
                | RemapError::UnknownTarget(_)
        )
    }
}

/// Result type alias for the remapper
pub type Result<T> = std::result::Result<T, RemapError>;
