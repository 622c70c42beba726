//! Source format negotiation

use fimc_hw::PixelFormat;
use tracing::warn;

use crate::error::{OutputError, Result};

/// Client-facing description of the source frame
///
/// Mirrors the V4L2 `pix` record: the pixel layout travels as a raw fourcc so
/// that unknown codes can be reported back and corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixFormat {
    /// Pixel layout fourcc
    pub fourcc: u32,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Line stride reported back to the client
    pub bytes_per_line: u64,

    /// Frame size reported back to the client; saturates at `u64::MAX`
    pub size_image: u64,
}

impl PixFormat {
    /// Request for a known layout; derived fields are filled in by negotiation
    #[must_use]
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        Self::from_fourcc(format.fourcc(), width, height)
    }

    /// Request for a raw fourcc code
    #[must_use]
    pub fn from_fourcc(fourcc: u32, width: u32, height: u32) -> Self {
        Self {
            fourcc,
            width,
            height,
            bytes_per_line: 0,
            size_image: 0,
        }
    }

    /// Decoded pixel layout, if the fourcc is supported
    #[must_use]
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        PixelFormat::from_fourcc(self.fourcc)
    }

    /// Frame dimensions
    #[must_use]
    pub fn size(&self) -> fimc_hw::Size {
        fimc_hw::Size::new(self.width, self.height)
    }
}

/// Validate a format request and fill in its derived fields
///
/// Unsupported fourcc codes are replaced by RGB32 in the request so the
/// client learns the fallback, and the call still fails.
pub fn negotiate(pix: &mut PixFormat) -> Result<PixelFormat> {
    let Some(format) = pix.pixel_format() else {
        let rejected = pix.fourcc;
        pix.fourcc = PixelFormat::RGB32.fourcc();
        warn!(
            "Unsupported pixel format {:#010x}, falling back to {}",
            rejected,
            PixelFormat::RGB32
        );
        return Err(OutputError::geometry(format!(
            "unsupported pixel format {:#010x}",
            rejected
        )));
    };

    pix.bytes_per_line = format.bytes_per_line(pix.width);
    pix.size_image = pix.bytes_per_line.saturating_mul(u64::from(pix.height));

    Ok(format)
}
