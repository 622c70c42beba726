//! Output Device Configuration
//!
//! Static, per-unit settings: pool capacity, the reserved memory region,
//! hardware limits and revision, and wait bounds.
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use fimc_output::DeviceConfig;
//!
//! // Using builder pattern
//! let config = DeviceConfig::builder()
//!     .id(1)
//!     .buffer_count(4)
//!     .reserved_memory(0x4e00_0000, 16 << 20)
//!     .dequeue_timeout(Duration::from_millis(500))
//!     .build();
//! assert!(config.validate().is_ok());
//!
//! // Using struct literal with defaults
//! let config = DeviceConfig {
//!     buffer_count: 4,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use fimc_hw::{HwLimits, ScalerCaps, Size};

/// Largest pool the queue bookkeeping supports
pub const MAX_BUFFER_COUNT: usize = 16;

/// Configuration for one output device instance
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Hardware unit number (default: 0)
    ///
    /// Also names the display window used by the FIFO sink.
    pub id: u32,

    /// Buffer pool capacity (default: 3)
    pub buffer_count: usize,

    /// Base address of the reserved memory region (default: 0x4D80_0000)
    pub reserved_base: u64,

    /// Size of the reserved memory region in bytes (default: 24 MiB)
    pub reserved_size: u64,

    /// Scaler and rotator size limits (default: FIMC0 table)
    pub limits: HwLimits,

    /// Hardware revision code (default: 0x43)
    pub revision: u32,

    /// Bounding box for source crop rectangles (default: 1920x1280)
    pub src_max: Size,

    /// Maximum wait in `dequeue` (default: 1000 ms)
    pub dequeue_timeout: Duration,

    /// Maximum wait for the hardware to go idle in `stream_off` (default: 200 ms)
    pub stop_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: 0,
            buffer_count: 3,
            reserved_base: 0x4D80_0000,
            reserved_size: 24 << 20,
            limits: HwLimits::default(),
            revision: 0x43,
            src_max: Size::new(1920, 1280),
            dequeue_timeout: Duration::from_millis(1000),
            stop_timeout: Duration::from_millis(200),
        }
    }
}

impl DeviceConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> DeviceConfigBuilder {
        DeviceConfigBuilder::default()
    }

    /// Scaler capabilities implied by `revision`
    #[must_use]
    pub fn scaler_caps(&self) -> ScalerCaps {
        ScalerCaps::for_revision(self.revision)
    }

    /// Validate configuration and return any issues
    ///
    /// Returns `Ok(())` if configuration is valid, or a list of issues.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.buffer_count == 0 {
            issues.push("buffer_count must be at least 1".to_string());
        }

        if self.buffer_count > MAX_BUFFER_COUNT {
            issues.push(format!("buffer_count should not exceed {}", MAX_BUFFER_COUNT));
        }

        if self.reserved_base % fimc_hw::PAGE_SIZE != 0 {
            issues.push("reserved_base must be page aligned".to_string());
        }

        if self.src_max.width == 0 || self.src_max.height == 0 {
            issues.push("src_max must be non-empty".to_string());
        }

        if self.dequeue_timeout.is_zero() {
            issues.push("dequeue_timeout must be non-zero".to_string());
        }

        if self.stop_timeout.is_zero() {
            issues.push("stop_timeout must be non-zero".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`DeviceConfig`]
///
/// Unset fields fall back to [`DeviceConfig::default()`].
#[derive(Debug, Clone, Default)]
pub struct DeviceConfigBuilder {
    id: Option<u32>,
    buffer_count: Option<usize>,
    reserved: Option<(u64, u64)>,
    limits: Option<HwLimits>,
    revision: Option<u32>,
    src_max: Option<Size>,
    dequeue_timeout: Option<Duration>,
    stop_timeout: Option<Duration>,
}

impl DeviceConfigBuilder {
    /// Set the hardware unit number
    #[must_use]
    pub fn id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the buffer pool capacity
    #[must_use]
    pub fn buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = Some(count);
        self
    }

    /// Set base and size of the reserved memory region
    #[must_use]
    pub fn reserved_memory(mut self, base: u64, size: u64) -> Self {
        self.reserved = Some((base, size));
        self
    }

    /// Set the hardware limit table
    #[must_use]
    pub fn limits(mut self, limits: HwLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Set the hardware revision code
    #[must_use]
    pub fn revision(mut self, revision: u32) -> Self {
        self.revision = Some(revision);
        self
    }

    /// Set the crop bounding box
    #[must_use]
    pub fn src_max(mut self, size: Size) -> Self {
        self.src_max = Some(size);
        self
    }

    /// Set the dequeue wait bound
    #[must_use]
    pub fn dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = Some(timeout);
        self
    }

    /// Set the stream-off wait bound
    #[must_use]
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = Some(timeout);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> DeviceConfig {
        let defaults = DeviceConfig::default();
        let (reserved_base, reserved_size) = self
            .reserved
            .unwrap_or((defaults.reserved_base, defaults.reserved_size));
        DeviceConfig {
            id: self.id.unwrap_or(defaults.id),
            buffer_count: self.buffer_count.unwrap_or(defaults.buffer_count),
            reserved_base,
            reserved_size,
            limits: self.limits.unwrap_or(defaults.limits),
            revision: self.revision.unwrap_or(defaults.revision),
            src_max: self.src_max.unwrap_or(defaults.src_max),
            dequeue_timeout: self.dequeue_timeout.unwrap_or(defaults.dequeue_timeout),
            stop_timeout: self.stop_timeout.unwrap_or(defaults.stop_timeout),
        }
    }
}
