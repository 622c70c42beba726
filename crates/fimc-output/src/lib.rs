//! # fimc-output
//!
//! Output-device controller for the FIMC scaler/colour-conversion block.
//!
//! A client hands frames from a reserved memory pool to the device; the
//! device crops, scales, rotates and flips them, and delivers the result
//! either to a framebuffer in memory (DMA sink) or straight into a display
//! window (FIFO sink), then returns each buffer for reuse.
//!
//! This crate is part of the `s5p-fimc` workspace and drives the facade
//! traits defined in `fimc-hw`.
//!
//! # Features
//!
//! - **Buffer Queues**: fixed-capacity FIFO index queues with per-buffer state
//! - **Format Negotiation**: stride and frame-size derivation per pixel layout
//! - **Geometry Validation**: crop, window and hardware size rules per sink
//! - **Scaler Calculation**: pre-scaler bands and fixed-point main ratios
//! - **Stream Sequencing**: DMA and display-FIFO sinks behind one state machine
//! - **Completion Handler**: tokio task turning frame-end events into
//!   buffer hand-offs
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use fimc_output::{DeviceConfig, Framebuffer, MemoryType, OutputDevice, PixFormat};
//! use fimc_hw::{PixelFormat, Rect, Size};
//!
//! let device = OutputDevice::new(DeviceConfig::default(), board_hw, board_display)?;
//!
//! let mut pix = PixFormat::new(PixelFormat::NV12, 640, 480);
//! device.set_format(&mut pix)?;
//! device.set_crop(Rect::new(0, 0, 640, 480))?;
//! device.set_window(Rect::new(0, 0, 320, 240))?;
//! device.set_framebuffer(Some(Framebuffer {
//!     base: 0x5800_0000,
//!     size: Size::new(800, 480),
//!     format: PixelFormat::RGB565,
//! }))?;
//!
//! let count = device.request_buffers(3, MemoryType::Mmap)?;
//! device.stream_on()?;
//! for index in 0..count {
//!     device.enqueue(index, None)?;
//! }
//!
//! // Frame-end interrupts arrive through irq::spawn_completion_handler
//! let free = device.dequeue()?;
//! ```
//!
//! # Architecture
//!
//! ```text
//!   client                     OutputDevice                       hardware
//!   ──────                     ────────────                       ────────
//!   enqueue ──▶ incoming queue ──▶ active ──▶ HardwareControl ──▶ DMA sink
//!                                    │    └─▶ DisplayFifo     ──▶ FIFO sink
//!   dequeue ◀── outgoing queue ◀─────┘
//!                    ▲
//!                    └── complete_frame ◀── irq task ◀── frame-end event
//! ```
//!
//! # Cargo Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `mock` | No | Recording hardware doubles from `fimc-hw` |
//! | `full` | No | All features enabled |

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod geometry;
pub mod irq;
pub mod queue;
pub mod scaler;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

// Device types
pub use device::{BufferInfo, ContextDump, Control, OutputDevice, StreamStatus};

// Buffer types
pub use buffer::{Buffer, BufferFlag, BufferFlags, BufferPool, BufferState, MemoryType, PlaneLayout};

// Configuration and errors
pub use config::{DeviceConfig, DeviceConfigBuilder, MAX_BUFFER_COUNT};
pub use error::{OutputError, Result};

// Format and geometry
pub use format::PixFormat;
pub use geometry::{CommitPlan, CropCap, Framebuffer, OutputConfig, Sink};

// Queue and completion handling
pub use irq::{spawn_completion_handler, IrqEvent};
pub use queue::{IndexQueue, QueueFull};

// =============================================================================
// CRATE-LEVEL ITEMS
// =============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
