//! # s5p-fimc
//!
//! Video output device for the FIMC scaler/colour-conversion block.
//!
//! This crate provides a unified interface to the FIMC libraries:
//!
//! - **[`hw`]** - Pixel formats, geometry, limit tables and the hardware facade traits
//! - **[`output`]** - Buffer queues, geometry validation, scaler programming and stream control
//!
//! # Features
//!
//! Both libraries are enabled by default. You can selectively enable only what you need:
//!
//! ```toml
//! # Use everything (default)
//! s5p-fimc = "0.1"
//!
//! # Format and geometry vocabulary only
//! s5p-fimc = { version = "0.1", default-features = false, features = ["hw"] }
//!
//! # Everything plus the recording doubles
//! s5p-fimc = { version = "0.1", features = ["full"] }
//! ```
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `hw` | Yes | Formats, geometry and facade traits |
//! | `output` | Yes | Output-device state machine |
//! | `mock` | No | Recording `HardwareControl`/`DisplayFifo` doubles |
//! | `full` | No | All features from all sub-crates |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use s5p_fimc::prelude::*;
//!
//! let device = OutputDevice::new(DeviceConfig::default(), board_hw, board_display)?;
//!
//! let mut pix = PixFormat::new(PixelFormat::RGB32, 800, 480);
//! device.set_format(&mut pix)?;
//! device.set_crop(Rect::new(0, 0, 800, 480))?;
//! device.set_window(Rect::new(0, 0, 480, 800))?;
//! device.set_control(Control::Rotation, 90)?;
//!
//! device.request_buffers(3, MemoryType::Mmap)?;
//! device.stream_on()?;
//! device.enqueue(0, None)?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          s5p-fimc                            │
//! ├──────────────────────────────┬───────────────────────────────┤
//! │          fimc-output         │            fimc-hw            │
//! │                              │                               │
//! │  OutputDevice                │  PixelFormat, Rect, Rotation  │
//! │  BufferPool, IndexQueue      │  HwLimits, ScalerCaps         │
//! │  geometry::plan, scaler      │  HardwareControl, DisplayFifo │
//! └──────────────┬───────────────┴───────────────┬───────────────┘
//!                │                               │
//!                ▼                               ▼
//!        client control surface        board register/display layer
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// RE-EXPORTS
// =============================================================================

/// Hardware vocabulary shared by every stage.
///
/// This module provides:
/// - Pixel formats with stride and alignment rules
/// - Sizes, rectangles, rotation and flip
/// - Per-unit limit tables and per-revision scaler capabilities
/// - The `HardwareControl` and `DisplayFifo` facade traits
///
/// See [`fimc_hw`] documentation for details.
#[cfg(feature = "hw")]
#[cfg_attr(docsrs, doc(cfg(feature = "hw")))]
pub use fimc_hw as hw;

/// Output-device controller.
///
/// This module provides:
/// - Buffer pool and FIFO index queues
/// - Format negotiation and geometry validation
/// - Scaler parameter calculation
/// - DMA and display-FIFO stream sequencing
///
/// See [`fimc_output`] documentation for details.
#[cfg(feature = "output")]
#[cfg_attr(docsrs, doc(cfg(feature = "output")))]
pub use fimc_output as output;

// =============================================================================
// PRELUDE - Common types for convenience
// =============================================================================

/// Prelude module with commonly used types.
///
/// ```rust
/// use s5p_fimc::prelude::*;
/// ```
pub mod prelude {
    #[cfg(feature = "hw")]
    pub use fimc_hw::{DisplayFifo, HardwareControl, PixelFormat, Rect, Rotation, Size};

    #[cfg(feature = "output")]
    pub use fimc_output::{
        Control, DeviceConfig, Framebuffer, MemoryType, OutputDevice, OutputError, PixFormat, StreamStatus,
    };
}
