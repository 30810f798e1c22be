//! Error types for ITA driver operations

use crate::wait::WaitCondition;
use ita_chip::{FieldError, Reg};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ITA driver operations
pub type Result<T> = std::result::Result<T, ItaError>;

/// Errors that can occur while driving the engine
#[derive(Debug, Error)]
pub enum ItaError {
    /// A bounded wait expired before the engine reached the condition
    #[error("Engine timeout waiting for {condition} after {polls} polls ({waited_ms}ms)")]
    EngineTimeout {
        /// Condition that was awaited
        condition: WaitCondition,
        /// Status reads performed
        polls: u64,
        /// Time spent waiting in milliseconds
        waited_ms: u64,
    },

    /// A packed field was out of range or badly encoded
    #[error("Invalid field: {0}")]
    Field(#[from] FieldError),

    /// A job address lies outside the accelerator window
    #[error("{register} address {addr:#010x} outside window [{base:#010x}, +{size:#x})")]
    AddressOutOfWindow {
        /// Register the address was meant for
        register: Reg,
        /// Absolute address supplied
        addr: u32,
        /// Window base
        base: u32,
        /// Window size
        size: u32,
    },

    /// Register access beyond a mapped region
    #[error("Register offset {offset:#x} out of bounds (limit {limit:#x})")]
    RegisterOutOfBounds {
        /// Byte offset requested
        offset: usize,
        /// Mapped size
        limit: usize,
    },

    /// A context was pushed while no queue slot was free
    #[error("Job queue overflow: {in_flight} contexts already in flight")]
    QueueOverflow {
        /// Contexts staged or executing at the time
        in_flight: u32,
    },

    /// Mapping the register block failed
    #[error("Cannot map {}: {reason}", path.display())]
    Mapping {
        /// Device file used for the mapping
        path: PathBuf,
        /// Reason for failure
        reason: String,
    },

    /// Configuration value could not be used
    #[error("Invalid configuration {key}: {reason}")]
    InvalidConfig {
        /// Setting name
        key: String,
        /// Reason for rejection
        reason: String,
    },

    /// Engine or backend is in an invalid state for the request
    #[error("Engine in invalid state: {state}")]
    InvalidState {
        /// Current state description
        state: String,
    },

    /// I/O error while opening the device
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl ItaError {
    /// Create a mapping error
    pub fn mapping(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Mapping {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }

    /// Whether the error means the engine stopped responding
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::EngineTimeout { .. })
    }
}
