//! Geometry/Format Validator
//!
//! Checks an [`OutputConfig`] against the hardware size rules and derives
//! everything the commit step programs: DMA sizes and offsets on both sides,
//! the rotator placement, and the scaler parameters.
//!
//! # Sinks and rotators
//!
//! The rotator sits on whichever side of the scaler is not streaming:
//!
//! | Sink | Rotator | Destination bound |
//! |------|---------|-------------------|
//! | DMA (framebuffer set) | output | framebuffer size |
//! | Display FIFO | input | panel, swapped for 90/270 |
//!
//! # Rotation remapping
//!
//! Every rotation-dependent rectangle remap goes through one
//! [`AxisTransform`] table lookup: swap the axes, then mirror either axis
//! against the extent of the target frame.

use fimc_hw::{
    DmaSize, FlipFlags, FormatClass, HwLimits, PixelFormat, Rect, Rotation, ScalerCaps, ScalerParams,
    Size,
};
use tracing::{debug, warn};

use crate::error::{OutputError, Result};
use crate::format::PixFormat;
use crate::scaler;

/// Destination framebuffer descriptor
///
/// A non-zero `base` selects the DMA sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framebuffer {
    /// Physical base address of the destination buffer
    pub base: u64,

    /// Framebuffer dimensions
    pub size: Size,

    /// Framebuffer pixel layout
    pub format: PixelFormat,
}

/// Where the scaler output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    /// Output DMA writes into a framebuffer in memory
    Dma(Framebuffer),
    /// Output streams into a display window through the local FIFO
    Fifo {
        /// Native panel resolution
        panel: Size,
    },
}

impl Sink {
    /// Select the sink from an optional framebuffer
    #[must_use]
    pub fn select(framebuffer: Option<Framebuffer>, panel: Size) -> Self {
        match framebuffer {
            Some(fb) if fb.base != 0 => Self::Dma(fb),
            _ => Self::Fifo { panel },
        }
    }

    /// Whether output goes to the display FIFO
    #[must_use]
    pub fn is_fifo(&self) -> bool {
        matches!(self, Self::Fifo { .. })
    }

    /// Pixel layout written by the output side
    #[must_use]
    pub fn destination_format(&self) -> PixelFormat {
        match self {
            Self::Dma(fb) => fb.format,
            Self::Fifo { .. } => PixelFormat::RGB32,
        }
    }

    /// Whether the input-side rotator turns the frame
    #[must_use]
    pub fn rotates_input(&self, rotation: Rotation) -> bool {
        self.is_fifo() && rotation.swaps_axes()
    }

    /// Whether the output-side rotator turns the frame
    #[must_use]
    pub fn rotates_output(&self, rotation: Rotation) -> bool {
        !self.is_fifo() && rotation.swaps_axes()
    }

    /// Rectangle the destination window must fit in
    #[must_use]
    pub fn window_bound(&self, rotation: Rotation) -> Size {
        match self {
            Self::Dma(fb) => fb.size,
            Self::Fifo { panel } => panel.rotated(rotation),
        }
    }
}

/// Rotation remap: optional axis swap followed by per-axis mirroring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisTransform {
    /// Exchange x/y and width/height
    pub swap: bool,
    /// Mirror horizontally against the extent width
    pub mirror_x: bool,
    /// Mirror vertically against the extent height
    pub mirror_y: bool,
}

impl AxisTransform {
    const IDENTITY: Self = Self::new(false, false, false);

    const fn new(swap: bool, mirror_x: bool, mirror_y: bool) -> Self {
        Self { swap, mirror_x, mirror_y }
    }

    /// Output DMA offset remap, indexed by rotation
    ///
    /// The 90 degree entry is a plain swap. An older formula mirrored the
    /// left edge against the framebuffer height; it is not used.
    const DMA_OFFSET: [Self; 4] = [
        Self::IDENTITY,
        Self::new(true, false, false),
        Self::new(false, true, true),
        Self::new(true, false, true),
    ];

    /// Destination window to display panel position, indexed by rotation
    const PANEL: [Self; 4] = [
        Self::IDENTITY,
        Self::new(true, true, false),
        Self::new(false, true, true),
        Self::new(true, false, true),
    ];

    /// Remap used for output DMA offsets
    #[must_use]
    pub const fn dma_offset(rotation: Rotation) -> Self {
        Self::DMA_OFFSET[rotation.index()]
    }

    /// Remap from the destination window to the display panel
    #[must_use]
    pub const fn panel(rotation: Rotation) -> Self {
        Self::PANEL[rotation.index()]
    }

    /// Apply the remap; `extent` is the target frame after any swap
    #[must_use]
    pub fn apply(&self, rect: Rect, extent: Size) -> Rect {
        let mut out = if self.swap {
            Rect::new(rect.top, rect.left, rect.height, rect.width)
        } else {
            rect
        };

        if self.mirror_x {
            out.left = extent.width.saturating_sub(out.left.saturating_add(out.width));
        }
        if self.mirror_y {
            out.top = extent.height.saturating_sub(out.top.saturating_add(out.height));
        }

        out
    }
}

/// Negotiated output parameters
///
/// Mutated through the control surface while streaming is off, read once
/// per stream start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputConfig {
    /// Source frame format
    pub pix: Option<PixFormat>,

    /// Source crop rectangle
    pub crop: Option<Rect>,

    /// Destination window
    pub window: Option<Rect>,

    /// Rotator angle
    pub rotation: Rotation,

    /// Flip flags
    pub flip: FlipFlags,

    /// Destination framebuffer; `None` or a zero base selects the FIFO sink
    pub framebuffer: Option<Framebuffer>,
}

/// Everything the commit step writes to the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPlan {
    /// Source pixel layout
    pub source_format: PixelFormat,

    /// Destination pixel layout
    pub destination_format: PixelFormat,

    /// Selected sink
    pub sink: Sink,

    /// Rotator angle
    pub rotation: Rotation,

    /// Flip flags
    pub flip: FlipFlags,

    /// Rotator placement: input side for the FIFO sink, output side for DMA
    pub rotate_on_input: bool,

    /// Source frame size (input offset bound)
    pub source_bound: Size,

    /// Source crop rectangle
    pub crop: Rect,

    /// Source original/real sizes
    pub source_sizes: DmaSize,

    /// Destination window as configured
    pub window: Rect,

    /// Output DMA offset bound and remapped window (DMA sink only)
    pub destination_offset: Option<(Size, Rect)>,

    /// Destination original/real sizes
    pub destination_sizes: DmaSize,

    /// Scaler programming
    pub scaler: ScalerParams,
}

/// Check a crop rectangle against the source bounding box
pub fn check_crop(crop: Rect, src_max: Size) -> Result<()> {
    if crop.width > src_max.width || crop.height > src_max.height {
        return Err(OutputError::out_of_bounds(format!(
            "crop {}x{} larger than {}x{}",
            crop.width, crop.height, src_max.width, src_max.height
        )));
    }

    if crop.right() > u64::from(src_max.width) {
        return Err(OutputError::out_of_bounds(format!(
            "crop left {} + width {} exceeds {}",
            crop.left, crop.width, src_max.width
        )));
    }

    if crop.bottom() > u64::from(src_max.height) {
        return Err(OutputError::out_of_bounds(format!(
            "crop top {} + height {} exceeds {}",
            crop.top, crop.height, src_max.height
        )));
    }

    Ok(())
}

/// Check the destination window against the sink's bounding rectangle
pub fn check_window(window: Rect, sink: &Sink, rotation: Rotation) -> Result<()> {
    let bound = sink.window_bound(rotation);

    if window.right() > u64::from(bound.width) {
        return Err(OutputError::out_of_bounds(format!(
            "window left {} + width {} exceeds bound width {}",
            window.left, window.width, bound.width
        )));
    }

    if window.bottom() > u64::from(bound.height) {
        return Err(OutputError::out_of_bounds(format!(
            "window top {} + height {} exceeds bound height {}",
            window.top, window.height, bound.height
        )));
    }

    Ok(())
}

/// Check source original/real sizes
pub fn check_source_size(sizes: DmaSize, input_rotator: bool, limits: &HwLimits) -> Result<()> {
    let DmaSize { org, real } = sizes;

    if input_rotator {
        if real.height < 16 {
            return Err(OutputError::geometry(format!(
                "source real height {} below 16 with input rotator",
                real.height
            )));
        }
        if real.width < 8 {
            return Err(OutputError::geometry(format!(
                "source real width {} below 8 with input rotator",
                real.width
            )));
        }
        if real.height > limits.real_h_rot {
            return Err(OutputError::geometry(format!(
                "source real height {} above {} with input rotator",
                real.height, limits.real_h_rot
            )));
        }
    } else {
        if real.height < 8 {
            return Err(OutputError::geometry(format!("source real height {} below 8", real.height)));
        }
        if real.width < 16 {
            return Err(OutputError::geometry(format!("source real width {} below 16", real.width)));
        }
        if real.width > limits.real_w_no_rot {
            return Err(OutputError::geometry(format!(
                "source real width {} above {}",
                real.width, limits.real_w_no_rot
            )));
        }
    }

    if org.height < 8 {
        return Err(OutputError::geometry(format!("source height {} below 8", org.height)));
    }
    if org.height < real.height {
        return Err(OutputError::geometry(format!(
            "source height {} smaller than crop height {}",
            org.height, real.height
        )));
    }
    if org.width < real.width {
        return Err(OutputError::geometry(format!(
            "source width {} smaller than crop width {}",
            org.width, real.width
        )));
    }

    Ok(())
}

/// Destination original/real sizes as programmed into the output side
#[must_use]
pub fn destination_sizes(window: Rect, sink: &Sink, rotation: Rotation) -> DmaSize {
    match sink {
        Sink::Dma(fb) => DmaSize {
            org: fb.size.rotated(rotation),
            real: window.size(),
        },
        Sink::Fifo { panel } => DmaSize {
            org: panel.rotated(rotation),
            real: window.size().rotated(rotation),
        },
    }
}

/// Check destination original/real sizes
pub fn check_destination_size(
    sizes: DmaSize,
    sink: &Sink,
    rotation: Rotation,
    limits: &HwLimits,
) -> Result<()> {
    let DmaSize { org, real } = sizes;
    let class = sink.destination_format().class();
    let yuv = matches!(class, FormatClass::Yuv420 | FormatClass::Yuv422);

    if class == FormatClass::Yuv420 && real.height % 2 != 0 {
        return Err(OutputError::geometry(format!(
            "destination height {} must be even for 4:2:0",
            real.height
        )));
    }
    if real.height < 4 {
        return Err(OutputError::geometry(format!("destination height {} below 4", real.height)));
    }

    if sink.is_fifo() {
        return Ok(());
    }

    if sink.rotates_output(rotation) {
        if org.height < real.width {
            return Err(OutputError::geometry(format!(
                "framebuffer height {} smaller than rotated window width {}",
                org.height, real.width
            )));
        }
        if org.width < real.height {
            return Err(OutputError::geometry(format!(
                "framebuffer width {} smaller than rotated window height {}",
                org.width, real.height
            )));
        }
        if real.height > limits.trg_h_rot {
            return Err(OutputError::geometry(format!(
                "destination height {} above {} with output rotator",
                real.height, limits.trg_h_rot
            )));
        }
        if yuv && real.height % 2 != 0 {
            return Err(OutputError::geometry(format!(
                "rotated destination height {} must be even for YUV",
                real.height
            )));
        }
    } else {
        if org.height < real.height {
            return Err(OutputError::geometry(format!(
                "framebuffer height {} smaller than window height {}",
                org.height, real.height
            )));
        }
        if org.width < real.width {
            return Err(OutputError::geometry(format!(
                "framebuffer width {} smaller than window width {}",
                org.width, real.width
            )));
        }
        if real.height > limits.trg_h_no_rot {
            return Err(OutputError::geometry(format!(
                "destination height {} above {}",
                real.height, limits.trg_h_no_rot
            )));
        }
        if yuv && real.width % 2 != 0 {
            return Err(OutputError::geometry(format!(
                "destination width {} must be even for YUV",
                real.width
            )));
        }
    }

    Ok(())
}

/// Output DMA offset bound and window in the rotated frame
#[must_use]
pub fn destination_offset(window: Rect, fb: &Framebuffer, rotation: Rotation) -> (Size, Rect) {
    let bound = fb.size.rotated(rotation);
    (bound, AxisTransform::dma_offset(rotation).apply(window, bound))
}

/// Window position and size on the physical display panel
#[must_use]
pub fn panel_window(window: Rect, panel: Size, rotation: Rotation) -> Rect {
    AxisTransform::panel(rotation).apply(window, panel)
}

/// Source and destination sizes in the scaler's orientation
///
/// With the output rotator the scaler sees the unrotated frame. The input
/// rotator turns the frame before the scaler, so both sides are swapped.
#[must_use]
pub fn scale_frames(crop: Rect, window: Rect, sink: &Sink, rotation: Rotation) -> (Size, Size) {
    if sink.rotates_input(rotation) {
        (crop.size().transposed(), window.size().transposed())
    } else {
        (crop.size(), window.size())
    }
}

/// Validate `config` and derive the full commit plan
///
/// Nothing is written anywhere; a failure leaves no trace.
pub fn plan(config: &OutputConfig, panel: Size, limits: &HwLimits, caps: ScalerCaps) -> Result<CommitPlan> {
    let (Some(pix), Some(crop), Some(window)) = (config.pix, config.crop, config.window) else {
        return Err(OutputError::busy("format, crop and window must be set before streaming"));
    };

    let source_format = pix
        .pixel_format()
        .ok_or_else(|| OutputError::geometry(format!("unsupported pixel format {:#010x}", pix.fourcc)))?;
    let sink = Sink::select(config.framebuffer, panel);
    let rotation = config.rotation;

    check_window(window, &sink, rotation)?;

    let source_sizes = DmaSize {
        org: pix.size(),
        real: crop.size(),
    };
    check_source_size(source_sizes, sink.rotates_input(rotation), limits)?;

    let destination_offset = match &sink {
        Sink::Dma(fb) => Some(destination_offset(window, fb, rotation)),
        Sink::Fifo { .. } => None,
    };

    let destination_sizes = destination_sizes(window, &sink, rotation);
    check_destination_size(destination_sizes, &sink, rotation, limits)?;

    let (src, dst) = scale_frames(crop, window, &sink, rotation);
    let scaler = scaler::compute(src, dst, caps)?;
    let destination_format = sink.destination_format();
    scaler::check(&scaler, src, dst, source_format, destination_format, caps, limits.pre_dst_w)?;

    debug!(
        "Plan: {} {}x{} crop {:?} -> {} window {:?} rot {} ({} sink)",
        source_format,
        pix.width,
        pix.height,
        crop,
        destination_format,
        window,
        rotation.degrees(),
        if sink.is_fifo() { "fifo" } else { "dma" }
    );

    Ok(CommitPlan {
        source_format,
        destination_format,
        sink,
        rotation,
        flip: config.flip,
        rotate_on_input: sink.is_fifo(),
        source_bound: pix.size(),
        crop,
        source_sizes,
        window,
        destination_offset,
        destination_sizes,
        scaler,
    })
}

/// Crop capability report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropCap {
    /// Largest crop rectangle
    pub bounds: Rect,

    /// Default crop rectangle
    pub default_rect: Rect,

    /// Pixel aspect as (numerator, denominator)
    pub pixel_aspect: (u32, u32),
}

/// Crop capability for the configured format
///
/// Every supported layout reports the panel, swapped when the rotator turns
/// the frame.
pub fn crop_cap(pix: Option<&PixFormat>, panel: Size, rotation: Rotation) -> Result<CropCap> {
    if pix.and_then(PixFormat::pixel_format).is_none() {
        warn!("Crop capability requested without a supported format");
        return Err(OutputError::geometry("no supported source format set"));
    }

    let bounds = Rect::from_size(panel.rotated(rotation));
    Ok(CropCap {
        bounds,
        default_rect: bounds,
        pixel_aspect: (16, 9),
    })
}
