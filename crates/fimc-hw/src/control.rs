//! Hardware Control Facade
//!
//! The register-level operations the output state machine drives. Each
//! method corresponds to a group of register writes on the real unit; the
//! core never touches registers itself.
//!
//! Implementations must be `Send`: the facade is called both from the
//! control path and from the frame-completion path.

use crate::error::Result;
use crate::format::PixelFormat;
use crate::geometry::{FlipFlags, Rect, Rotation, Size};

/// Side of the scaler a setting applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Input DMA (source frames read from memory)
    Input,
    /// Output DMA or display FIFO (destination)
    Output,
}

/// Memory plane of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    /// Luma or packed plane
    Y,
    /// Cb or interleaved chroma plane
    Cb,
    /// Cr plane (three-plane layouts only)
    Cr,
}

impl Plane {
    /// All planes in address order
    pub const ALL: [Plane; 3] = [Plane::Y, Plane::Cb, Plane::Cr];

    /// Index into per-plane arrays
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Y => 0,
            Self::Cb => 1,
            Self::Cr => 2,
        }
    }
}

/// Original (backing) and real (visible) sizes of one DMA side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaSize {
    /// Full backing buffer dimensions
    pub org: Size,

    /// Cropped or visible region dimensions
    pub real: Size,
}

/// Derived two-stage scaler programming
///
/// Recomputed on every stream start from the source and destination
/// rectangles; never persisted across stream-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScalerParams {
    /// Horizontal pre-scale ratio (power of two)
    pub pre_hratio: u32,

    /// Vertical pre-scale ratio (power of two)
    pub pre_vratio: u32,

    /// log2 of `pre_hratio`
    pub hfactor: u32,

    /// log2 of `pre_vratio`
    pub vfactor: u32,

    /// Width after the pre-scaler
    pub pre_dst_width: u32,

    /// Height after the pre-scaler
    pub pre_dst_height: u32,

    /// Fixed-point horizontal main ratio
    pub main_hratio: u32,

    /// Fixed-point vertical main ratio
    pub main_vratio: u32,

    /// Destination at least as wide as source
    pub scaleup_h: bool,

    /// Destination at least as tall as source
    pub scaleup_v: bool,

    /// Scaler bypass; input DMA cannot bypass, so always false here
    pub bypass: bool,

    /// Combined shift factor, `10 - (hfactor + vfactor)`
    pub shfactor: u32,
}

/// Register-level operations of one FIMC unit
pub trait HardwareControl: Send {
    /// Program the pixel layout of one side
    fn set_format(&mut self, direction: Direction, format: PixelFormat) -> Result<()>;

    /// Select the data path: memory source, and FIFO or memory sink
    fn set_path(&mut self, source_is_memory: bool, sink_is_fifo: bool) -> Result<()>;

    /// Program the rotator on the input side (`on_input`) or the output side
    fn set_rotation_flip(&mut self, rotation: Rotation, flip: FlipFlags, on_input: bool) -> Result<()>;

    /// Program the DMA start offsets of `window` inside `bound`
    fn set_offsets(&mut self, direction: Direction, format: PixelFormat, bound: Size, window: Rect)
        -> Result<()>;

    /// Program original and real sizes of one side
    fn set_sizes(&mut self, direction: Direction, sizes: DmaSize) -> Result<()>;

    /// Program the pre-scaler and main scaler
    fn set_scaler(&mut self, params: &ScalerParams) -> Result<()>;

    /// Program one plane's DMA base address
    fn set_address(&mut self, direction: Direction, plane: Plane, address: u64) -> Result<()>;

    /// Start scaler, capture and input DMA
    fn start_pipeline(&mut self) -> Result<()>;

    /// Stop input DMA, scaler and capture
    fn stop_pipeline(&mut self) -> Result<()>;

    /// Enable or disable the frame-end interrupt
    fn enable_interrupt(&mut self, enable: bool) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_index() {
        let indices: Vec<usize> = Plane::ALL.iter().map(|p| p.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_scaler_params_default() {
        let params = ScalerParams::default();
        assert!(!params.bypass);
        assert_eq!(params.pre_hratio, 0);
    }
}
