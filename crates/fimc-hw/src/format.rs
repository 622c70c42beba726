//! Pixel Formats
//!
//! Pixel layouts accepted by the FIMC input DMA and the destination
//! framebuffer, identified by their V4L2 fourcc codes.
//!
//! Each layout maps to a plane count and to a [`FormatClass`] that drives the
//! even-size rules of the scaler and the output DMA.
//!
//! # Examples
//!
//! ```rust
//! use fimc_hw::{FormatClass, PixelFormat};
//!
//! let nv12 = PixelFormat::from_fourcc(PixelFormat::NV12.fourcc()).unwrap();
//! assert_eq!(nv12.plane_count(), 2);
//! assert_eq!(nv12.class(), FormatClass::Yuv420);
//! assert_eq!(nv12.bytes_per_line(640), 960);
//! ```

use std::fmt;

/// Build a little-endian fourcc code the way V4L2 does
#[must_use]
pub const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

/// Colour class used for alignment parity rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatClass {
    /// Packed RGB (RGB32, RGB565)
    Rgb,
    /// 4:2:0 subsampled YUV
    Yuv420,
    /// 4:2:2 subsampled YUV
    Yuv422,
}

/// Pixel layouts understood by the output path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32-bit RGB, 1 plane
    RGB32,
    /// 16-bit RGB 5:6:5, 1 plane
    RGB565,
    /// Packed YUV 4:2:2, Y0 Cb Y1 Cr
    YUYV,
    /// Packed YUV 4:2:2, Cb Y0 Cr Y1
    UYVY,
    /// Packed YUV 4:2:2, Y0 Cr Y1 Cb
    YVYU,
    /// Packed YUV 4:2:2, Cr Y0 Cb Y1
    VYUY,
    /// Y plane + interleaved CbCr plane, 4:2:0
    NV12,
    /// NV12 in 64x32 macro-block tiles (Samsung `TV12`)
    NV12T,
    /// Y plane + interleaved CrCb plane, 4:2:0
    NV21,
    /// Y plane + interleaved CbCr plane, 4:2:2
    NV16,
    /// Y plane + interleaved CrCb plane, 4:2:2
    NV61,
    /// Three-plane YUV 4:2:0 (`YU12`)
    YUV420,
}

impl PixelFormat {
    /// Every supported layout
    pub const ALL: [PixelFormat; 12] = [
        PixelFormat::RGB32,
        PixelFormat::RGB565,
        PixelFormat::YUYV,
        PixelFormat::UYVY,
        PixelFormat::YVYU,
        PixelFormat::VYUY,
        PixelFormat::NV12,
        PixelFormat::NV12T,
        PixelFormat::NV21,
        PixelFormat::NV16,
        PixelFormat::NV61,
        PixelFormat::YUV420,
    ];

    /// V4L2 fourcc code
    #[must_use]
    pub const fn fourcc(self) -> u32 {
        match self {
            Self::RGB32 => fourcc(b'R', b'G', b'B', b'4'),
            Self::RGB565 => fourcc(b'R', b'G', b'B', b'P'),
            Self::YUYV => fourcc(b'Y', b'U', b'Y', b'V'),
            Self::UYVY => fourcc(b'U', b'Y', b'V', b'Y'),
            Self::YVYU => fourcc(b'Y', b'V', b'Y', b'U'),
            Self::VYUY => fourcc(b'V', b'Y', b'U', b'Y'),
            Self::NV12 => fourcc(b'N', b'V', b'1', b'2'),
            Self::NV12T => fourcc(b'T', b'V', b'1', b'2'),
            Self::NV21 => fourcc(b'N', b'V', b'2', b'1'),
            Self::NV16 => fourcc(b'N', b'V', b'1', b'6'),
            Self::NV61 => fourcc(b'N', b'V', b'6', b'1'),
            Self::YUV420 => fourcc(b'Y', b'U', b'1', b'2'),
        }
    }

    /// Look a layout up by its fourcc code
    #[must_use]
    pub fn from_fourcc(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.fourcc() == code)
    }

    /// Number of memory planes a buffer of this layout occupies
    #[must_use]
    pub const fn plane_count(self) -> usize {
        match self {
            Self::RGB32 | Self::RGB565 | Self::YUYV | Self::UYVY | Self::YVYU | Self::VYUY => 1,
            Self::NV12 | Self::NV12T | Self::NV21 | Self::NV16 | Self::NV61 => 2,
            Self::YUV420 => 3,
        }
    }

    /// Colour class of the layout
    #[must_use]
    pub const fn class(self) -> FormatClass {
        match self {
            Self::RGB32 | Self::RGB565 => FormatClass::Rgb,
            Self::NV12 | Self::NV12T | Self::NV21 | Self::YUV420 => FormatClass::Yuv420,
            Self::YUYV | Self::UYVY | Self::YVYU | Self::VYUY | Self::NV16 | Self::NV61 => {
                FormatClass::Yuv422
            }
        }
    }

    /// Whether the layout uses the 2D tiled addressing mode
    #[must_use]
    pub const fn is_tiled(self) -> bool {
        matches!(self, Self::NV12T)
    }

    /// Bytes per line reported to the client for a given width
    ///
    /// Multi-planar 4:2:0 layouts report the averaged line size
    /// (`width * 3 / 2`) so that `bytes_per_line * height` is the frame size.
    #[must_use]
    pub const fn bytes_per_line(self, width: u32) -> u64 {
        let width = width as u64;
        match self {
            Self::RGB32 => width << 2,
            Self::RGB565 | Self::YUYV | Self::UYVY | Self::YVYU | Self::VYUY | Self::NV16 | Self::NV61 => {
                width << 1
            }
            Self::NV12 | Self::NV12T | Self::NV21 | Self::YUV420 => (width * 3) >> 1,
        }
    }

    /// Pixel multiple the scaler requires of a source width in this layout
    #[must_use]
    pub const fn source_width_divisor(self) -> u32 {
        match self {
            Self::RGB32 => 1,
            Self::RGB565 | Self::YUYV | Self::UYVY | Self::YVYU | Self::VYUY | Self::NV16 | Self::NV61 => 2,
            Self::NV12 | Self::NV12T | Self::NV21 | Self::YUV420 => 8,
        }
    }

    /// Pixel multiple the scaler requires of a destination width
    ///
    /// Only RGB layouts can be written by the output DMA; `None` for the rest.
    #[must_use]
    pub const fn destination_width_divisor(self) -> Option<u32> {
        match self {
            Self::RGB32 => Some(1),
            Self::RGB565 => Some(2),
            _ => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.fourcc().to_le_bytes();
        let text: String = code.iter().map(|&b| char::from(b)).collect();
        write!(f, "{:?}({})", self, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_roundtrip() {
        for format in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_fourcc(format.fourcc()), Some(format));
        }
        assert_eq!(PixelFormat::from_fourcc(0xdead_beef), None);
    }

    #[test]
    fn test_known_fourcc_values() {
        // V4L2_PIX_FMT_RGB32 and V4L2_PIX_FMT_NV12
        assert_eq!(PixelFormat::RGB32.fourcc(), 0x3442_4752);
        assert_eq!(PixelFormat::NV12.fourcc(), 0x3231_564e);
    }

    #[test]
    fn test_plane_counts() {
        assert_eq!(PixelFormat::RGB565.plane_count(), 1);
        assert_eq!(PixelFormat::NV21.plane_count(), 2);
        assert_eq!(PixelFormat::NV12T.plane_count(), 2);
        assert_eq!(PixelFormat::YUV420.plane_count(), 3);
    }

    #[test]
    fn test_bytes_per_line() {
        assert_eq!(PixelFormat::RGB32.bytes_per_line(640), 2560);
        assert_eq!(PixelFormat::YUYV.bytes_per_line(640), 1280);
        assert_eq!(PixelFormat::NV61.bytes_per_line(640), 1280);
        assert_eq!(PixelFormat::NV12.bytes_per_line(640), 960);
    }

    #[test]
    fn test_bytes_per_line_full_width_range() {
        assert_eq!(PixelFormat::RGB32.bytes_per_line(u32::MAX), u64::from(u32::MAX) * 4);
        assert_eq!(PixelFormat::YUV420.bytes_per_line(u32::MAX), u64::from(u32::MAX) * 3 / 2);
    }

    #[test]
    fn test_width_divisors() {
        assert_eq!(PixelFormat::RGB32.source_width_divisor(), 1);
        assert_eq!(PixelFormat::NV16.source_width_divisor(), 2);
        assert_eq!(PixelFormat::NV12T.source_width_divisor(), 8);
        assert_eq!(PixelFormat::RGB565.destination_width_divisor(), Some(2));
        assert_eq!(PixelFormat::NV12.destination_width_divisor(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(PixelFormat::NV12T.to_string(), "NV12T(TV12)");
    }
}
