//! # fimc-hw
//!
//! Hardware-facing vocabulary for the FIMC scaler/colour-conversion block:
//! pixel formats, geometry, limit tables, and the facade traits the output
//! state machine drives.
//!
//! This crate is part of the `s5p-fimc` workspace and is consumed by
//! `fimc-output`.
//! It contains no register code; a board support layer implements
//! [`HardwareControl`] and [`DisplayFifo`] on top of its own register
//! primitives.
//!
//! # Features
//!
//! - **Pixel Formats**: RGB, packed 4:2:2, semi-planar and planar 4:2:0/4:2:2
//! - **Geometry**: rectangles, rotation and flip shared by every stage
//! - **Limits**: per-unit size limits and per-revision scaler capabilities
//! - **Facade Traits**: register and display-FIFO operations as traits
//! - **Test Doubles**: recording implementations (`mock` feature)
//!
//! # Quick Start
//!
//! ```rust
//! use fimc_hw::{PixelFormat, Rect, Rotation, ScalerCaps, Size};
//!
//! let format = PixelFormat::NV12;
//! let crop = Rect::new(0, 0, 640, 480);
//! let panel = Size::new(480, 800).rotated(Rotation::Deg90);
//!
//! assert_eq!(format.bytes_per_line(crop.width), 960);
//! assert_eq!(panel, Size::new(800, 480));
//! assert_eq!(ScalerCaps::for_revision(0x50).main_ratio_bits, 14);
//! ```
//!
//! # Cargo Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `mock` | No | Recording `HardwareControl`/`DisplayFifo` doubles |
//! | `full` | No | All features enabled |

#![cfg_attr(docsrs, feature(doc_cfg))]

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod control;
pub mod error;
pub mod fifo;
pub mod format;
pub mod geometry;
pub mod limits;

// =============================================================================
// FEATURE MODULES
// =============================================================================

/// Recording test doubles
///
/// Requires the `mock` feature.
#[cfg(feature = "mock")]
#[cfg_attr(docsrs, doc(cfg(feature = "mock")))]
pub mod mock;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

pub use control::{Direction, DmaSize, HardwareControl, Plane, ScalerParams};
pub use error::{HwError, Result};
pub use fifo::{DisplayFifo, FifoHook, ScreenInfo};
pub use format::{fourcc, FormatClass, PixelFormat};
pub use geometry::{Flip, FlipFlags, Rect, Rotation, Size};
pub use limits::{HwLimits, ScalerCaps, REVISION_FINE_RATIO};

// =============================================================================
// CRATE-LEVEL ITEMS
// =============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hardware page size used for buffer alignment and mmap offsets
pub const PAGE_SIZE: u64 = 4096;

/// Formats the input DMA can read, in order of preference
///
/// Packed RGB first (no colour conversion on the display path), then
/// semi-planar 4:2:0 which most decoders produce.
#[must_use]
pub fn supported_source_formats() -> Vec<PixelFormat> {
    vec![
        PixelFormat::RGB32,
        PixelFormat::RGB565,
        PixelFormat::NV12,
        PixelFormat::NV12T,
        PixelFormat::NV21,
        PixelFormat::YUV420,
        PixelFormat::NV16,
        PixelFormat::NV61,
        PixelFormat::YUYV,
        PixelFormat::UYVY,
        PixelFormat::YVYU,
        PixelFormat::VYUY,
    ]
}

/// Round `value` up to a multiple of `align` (a power of two)
///
/// Returns `u64::MAX` when the rounded value does not fit.
#[must_use]
pub const fn align_up(value: u64, align: u64) -> u64 {
    match value.checked_add(align - 1) {
        Some(sum) => sum & !(align - 1),
        None => u64::MAX,
    }
}

/// Round `value` up to [`PAGE_SIZE`]
#[must_use]
pub const fn page_align(value: u64) -> u64 {
    align_up(value, PAGE_SIZE)
}
