//! Error types for output-device operations
//!
//! Every control-surface call returns `Result<T, OutputError>`. Validation
//! errors are raised before any state is touched, so a failed call leaves the
//! device exactly as it was.
//!
//! # Examples
//!
//! ```rust,ignore
//! use fimc_output::OutputError;
//!
//! match device.dequeue() {
//!     Ok(index) => println!("buffer {} is free again", index),
//!     Err(e) if e.is_retryable() => {
//!         // Timeout or interrupted wait; try again later
//!     }
//!     Err(OutputError::HardwareFault(e)) => eprintln!("hardware: {}", e),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use fimc_hw::HwError;
use thiserror::Error;

/// Errors that can occur during output-device operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    /// Operation is not allowed in the current stream state
    ///
    /// Mutating calls are only permitted while streaming is off, and
    /// streaming cannot start before format, crop and window are set.
    #[error("Device busy: {0}")]
    Busy(String),

    /// Buffer index outside the requested range
    #[error("Invalid buffer index {index} ({count} buffers requested)")]
    InvalidIndex {
        /// Index supplied by the caller
        index: usize,
        /// Number of buffers currently requested
        count: usize,
    },

    /// Buffer is not in the lifecycle state the operation expects
    #[error("Invalid buffer state: {0}")]
    InvalidState(String),

    /// Size, alignment or format rule violated
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Rectangle does not fit its bounding rectangle
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// Requested buffers do not fit the reserved memory pool
    #[error("Insufficient memory: need {required} bytes, {available} reserved")]
    InsufficientMemory {
        /// Bytes needed for the whole pool
        required: u64,
        /// Bytes available in the reserved region
        available: u64,
    },

    /// Scale ratio or pre-scaler width exceeds the hardware range
    #[error("Scale out of range: {0}")]
    ScaleOutOfRange(String),

    /// Width is not a multiple the scaler can handle
    #[error("Scale alignment: {0}")]
    ScaleAlignment(String),

    /// Bounded wait elapsed
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// Wait was cancelled by the caller
    #[error("Wait interrupted")]
    Interrupted,

    /// Underlying facade call failed
    #[error("Hardware fault: {0}")]
    HardwareFault(#[from] HwError),

    /// Device configuration rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for output-device operations
pub type Result<T> = std::result::Result<T, OutputError>;

impl OutputError {
    /// Create a busy error
    pub(crate) fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }

    /// Create an invalid-state error
    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create an invalid-geometry error
    pub(crate) fn geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    /// Create an out-of-bounds error
    pub(crate) fn out_of_bounds(msg: impl Into<String>) -> Self {
        Self::OutOfBounds(msg.into())
    }

    /// Create a scale-range error
    pub(crate) fn scale_range(msg: impl Into<String>) -> Self {
        Self::ScaleOutOfRange(msg.into())
    }

    /// Create a scale-alignment error
    pub(crate) fn scale_alignment(msg: impl Into<String>) -> Self {
        Self::ScaleAlignment(msg.into())
    }

    /// Whether retrying the same call later may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Interrupted)
    }
}
