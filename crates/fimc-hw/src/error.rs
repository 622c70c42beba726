//! Error types for hardware facade operations

use thiserror::Error;

/// Errors reported by a [`HardwareControl`](crate::HardwareControl) or
/// [`DisplayFifo`](crate::DisplayFifo) implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HwError {
    /// A register programming step was rejected
    #[error("Register write failed: {0}")]
    Register(String),

    /// The display controller refused a FIFO or window request
    #[error("Display FIFO request failed: {0}")]
    Fifo(String),

    /// The unit does not implement the requested mode
    #[error("Not supported by this unit: {0}")]
    NotSupported(String),
}

/// Result type for facade calls
pub type Result<T> = std::result::Result<T, HwError>;

impl HwError {
    /// Create a register error
    pub fn register(msg: impl Into<String>) -> Self {
        Self::Register(msg.into())
    }

    /// Create a display FIFO error
    pub fn fifo(msg: impl Into<String>) -> Self {
        Self::Fifo(msg.into())
    }
}
