//! Buffer Pool
//!
//! Fixed set of source buffers handed between the client and the hardware.
//! Each slot carries up to three plane addresses, a lifecycle state and the
//! client-visible flags.
//!
//! # Lifecycle
//!
//! ```text
//!   Idle ──enqueue──▶ Queued ──hardware picks up──▶ Active
//!    ▲                                               │
//!    └────────dequeue──────── Done ◀──frame done─────┘
//! ```
//!
//! The pool itself is plain data; the device guards it with a leaf lock and
//! keeps the state field in step with the queue that holds each index.

use enumflags2::{bitflags, BitFlags};
use fimc_hw::{align_up, page_align, PixelFormat, Plane, Size};
use tracing::debug;

use crate::error::{OutputError, Result};

/// Tile granularity of the NV12T layout
const TILE_WIDTH: u64 = 128;
const TILE_HEIGHT: u64 = 32;
const TILE_BLOCK: u64 = 8 << 10;

/// Lifecycle state of one buffer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferState {
    /// Owned by the client
    Idle,
    /// Waiting in the incoming queue
    Queued,
    /// Being read by the hardware
    Active,
    /// Finished, waiting in the outgoing queue
    Done,
}

/// Client-visible buffer flags (V4L2 bit values)
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFlag {
    /// Buffer memory is mapped
    Mapped = 0x0001,
    /// Buffer is in the incoming queue
    Queued = 0x0002,
    /// Buffer is in the outgoing queue
    Done = 0x0004,
}

/// Set of buffer flags
pub type BufferFlags = BitFlags<BufferFlag>;

/// How buffer memory is provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryType {
    /// Buffers carved out of the reserved region
    #[default]
    Mmap,
    /// Client passes plane addresses with every enqueue
    UserPtr,
}

/// Per-plane byte sizes of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Plane lengths in `Y`, `Cb`, `Cr` order; unused planes are zero
    pub lengths: [u64; 3],

    /// Page-aligned stride between consecutive buffers
    pub frame_size: u64,
}

impl PlaneLayout {
    /// Plane sizes for a `size` frame in `format`
    #[must_use]
    pub fn compute(format: PixelFormat, size: Size) -> Self {
        let width = u64::from(size.width);
        let height = u64::from(size.height);
        let luma = width * height;

        let (lengths, frame_size) = match format {
            PixelFormat::RGB32 => {
                let rgb = page_align(luma.saturating_mul(4));
                ([rgb, 0, 0], rgb)
            }
            PixelFormat::RGB565
            | PixelFormat::YUYV
            | PixelFormat::UYVY
            | PixelFormat::YVYU
            | PixelFormat::VYUY => {
                let packed = page_align(luma.saturating_mul(2));
                ([packed, 0, 0], packed)
            }
            PixelFormat::NV12 | PixelFormat::NV21 => {
                let chroma = luma >> 1;
                ([luma, chroma, 0], page_align(luma.saturating_add(chroma)))
            }
            PixelFormat::NV12T => {
                let tiled_width = align_up(width, TILE_WIDTH);
                let y = align_up(tiled_width.saturating_mul(align_up(height, TILE_HEIGHT)), TILE_BLOCK);
                let chroma = align_up(tiled_width.saturating_mul(align_up(height / 2, TILE_HEIGHT)), TILE_BLOCK);
                ([y, chroma, 0], page_align(y.saturating_add(chroma)))
            }
            PixelFormat::NV16 | PixelFormat::NV61 => ([luma, luma, 0], page_align(luma.saturating_mul(2))),
            PixelFormat::YUV420 => {
                let chroma = luma >> 2;
                ([luma, chroma, chroma], page_align(luma.saturating_add(chroma << 1)))
            }
        };

        Self { lengths, frame_size }
    }

    /// Bytes needed for `count` buffers
    #[must_use]
    pub fn pool_bytes(&self, count: usize) -> u64 {
        self.frame_size.saturating_mul(count as u64)
    }

    /// Plane offsets from the buffer base
    #[must_use]
    pub fn offsets(&self) -> [u64; 3] {
        let cb = if self.lengths[1] > 0 { self.lengths[0] } else { 0 };
        let cr = if self.lengths[2] > 0 {
            self.lengths[0].saturating_add(self.lengths[1])
        } else {
            0
        };
        [0, cb, cr]
    }
}

/// One slot of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buffer {
    /// Plane base addresses in `Y`, `Cb`, `Cr` order; zero when unused
    pub base: [u64; 3],

    /// Plane lengths in bytes
    pub length: [u64; 3],

    /// Lifecycle state
    pub state: BufferState,

    /// Client-visible flags
    pub flags: BufferFlags,
}

impl Default for Buffer {
    fn default() -> Self {
        Self {
            base: [0; 3],
            length: [0; 3],
            state: BufferState::Idle,
            flags: BufferFlags::empty(),
        }
    }
}

impl Buffer {
    /// Sum of plane lengths
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.length.iter().fold(0, |total, &len| total.saturating_add(len))
    }

    /// Address of one plane
    #[must_use]
    pub fn address(&self, plane: Plane) -> u64 {
        self.base[plane.index()]
    }

    /// Move to `state`, updating the flags to match
    pub fn set_state(&mut self, state: BufferState) {
        self.state = state;
        self.flags = match state {
            BufferState::Idle | BufferState::Active => BufferFlag::Mapped.into(),
            BufferState::Queued => BufferFlag::Mapped | BufferFlag::Queued,
            BufferState::Done => BufferFlag::Mapped | BufferFlag::Done,
        };
    }
}

/// Fixed-capacity buffer table
#[derive(Debug, Clone)]
pub struct BufferPool {
    buffers: Vec<Buffer>,
    requested: usize,
    allocated: bool,
}

impl BufferPool {
    /// Create a pool of `capacity` idle, unassigned slots
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: vec![Buffer::default(); capacity],
            requested: 0,
            allocated: false,
        }
    }

    /// Number of slots
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffers.len()
    }

    /// Number of buffers the client requested
    #[must_use]
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Whether buffers are currently allocated
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Compute the layout for `format`/`size` and check it fits
    ///
    /// In [`MemoryType::Mmap`] mode the whole pool must fit in
    /// `reserved_size` bytes. Nothing in the pool changes.
    pub fn plan_layout(
        &self,
        format: PixelFormat,
        size: Size,
        memory: MemoryType,
        reserved_size: u64,
    ) -> Result<PlaneLayout> {
        let layout = PlaneLayout::compute(format, size);
        let required = layout.pool_bytes(self.capacity());

        if memory == MemoryType::Mmap && required > reserved_size {
            return Err(OutputError::InsufficientMemory {
                required,
                available: reserved_size,
            });
        }

        Ok(layout)
    }

    /// Assign addresses from `layout` and reset every slot to idle
    ///
    /// `count` is recorded as the requested number; addresses are assigned
    /// to every slot.
    pub fn apply_layout(&mut self, layout: &PlaneLayout, reserved_base: u64, count: usize) {
        let offsets = layout.offsets();
        for (i, buffer) in self.buffers.iter_mut().enumerate() {
            let start = reserved_base.saturating_add(layout.frame_size.saturating_mul(i as u64));
            for plane in Plane::ALL {
                let p = plane.index();
                buffer.length[p] = layout.lengths[p];
                buffer.base[p] = if layout.lengths[p] > 0 {
                    start.saturating_add(offsets[p])
                } else {
                    0
                };
            }
            buffer.state = BufferState::Idle;
            buffer.flags = BufferFlags::empty();
        }

        self.requested = count;
        self.allocated = count != 0;

        debug!(
            "Pool laid out: frame {} bytes, {} of {} slots requested",
            layout.frame_size,
            count,
            self.capacity()
        );
    }

    /// Check and apply a layout in one step
    ///
    /// On error the pool is unchanged.
    pub fn allocate(
        &mut self,
        format: PixelFormat,
        size: Size,
        memory: MemoryType,
        reserved_base: u64,
        reserved_size: u64,
        count: usize,
    ) -> Result<PlaneLayout> {
        let layout = self.plan_layout(format, size, memory, reserved_size)?;
        self.apply_layout(&layout, reserved_base, count);
        Ok(layout)
    }

    /// Check that `index` addresses a requested buffer
    pub fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.requested || index >= self.capacity() {
            return Err(OutputError::InvalidIndex {
                index,
                count: self.requested,
            });
        }
        Ok(())
    }

    /// Slot by index
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Buffer> {
        self.buffers.get(index)
    }

    /// Mutable slot by index
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Buffer> {
        self.buffers.get_mut(index)
    }

    /// Overwrite plane addresses of one slot (user-pointer enqueue)
    pub fn set_addresses(&mut self, index: usize, addresses: [u64; 3]) -> Result<()> {
        let count = self.requested;
        let buffer = self
            .buffers
            .get_mut(index)
            .ok_or(OutputError::InvalidIndex { index, count })?;
        buffer.base = addresses;
        Ok(())
    }

    /// Return every slot to [`BufferState::Idle`] with the given flags
    pub fn reset(&mut self, flags: BufferFlags) {
        for buffer in &mut self.buffers {
            buffer.state = BufferState::Idle;
            buffer.flags = flags;
        }
    }

    /// Iterate over all slots
    pub fn iter(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter()
    }
}
