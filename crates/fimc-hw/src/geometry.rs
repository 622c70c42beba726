//! Geometry Vocabulary
//!
//! Rectangles, sizes, rotation and flip as seen by the scaler block.
//!
//! # Usage
//!
//! ```rust
//! use fimc_hw::{Rect, Rotation, Size};
//!
//! let window = Rect::new(10, 20, 320, 240);
//! assert!(window.fits_within(Size::new(800, 480)));
//!
//! let rotation = Rotation::from_degrees(90).unwrap();
//! assert!(rotation.swaps_axes());
//! assert_eq!(Size::new(800, 480).rotated(rotation), Size::new(480, 800));
//! ```

use enumflags2::{bitflags, BitFlags};

/// Width/height pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,
}

impl Size {
    /// Create a new size
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width and height exchanged
    #[must_use]
    pub const fn transposed(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// Size as seen after applying `rotation`
    #[must_use]
    pub const fn rotated(&self, rotation: Rotation) -> Self {
        if rotation.swaps_axes() {
            self.transposed()
        } else {
            *self
        }
    }

    /// Pixel count
    #[must_use]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Axis-aligned rectangle (crop window, destination window, framebuffer bounds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// X coordinate of top-left corner
    pub left: u32,

    /// Y coordinate of top-left corner
    pub top: u32,

    /// Rectangle width
    pub width: u32,

    /// Rectangle height
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle
    #[must_use]
    pub const fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self { left, top, width, height }
    }

    /// Rectangle anchored at the origin
    #[must_use]
    pub const fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// Size of the rectangle
    #[must_use]
    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Exclusive right edge, widened so it cannot overflow
    #[must_use]
    pub const fn right(&self) -> u64 {
        self.left as u64 + self.width as u64
    }

    /// Exclusive bottom edge, widened so it cannot overflow
    #[must_use]
    pub const fn bottom(&self) -> u64 {
        self.top as u64 + self.height as u64
    }

    /// Whether the rectangle lies inside `0..bound.width` x `0..bound.height`
    #[must_use]
    pub const fn fits_within(&self, bound: Size) -> bool {
        self.right() <= bound.width as u64 && self.bottom() <= bound.height as u64
    }
}

/// Clockwise rotation applied by the rotator stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    /// No rotation
    #[default]
    Deg0,
    /// 90 degrees
    Deg90,
    /// 180 degrees
    Deg180,
    /// 270 degrees
    Deg270,
}

impl Rotation {
    /// Parse a degree value; only right angles are accepted
    #[must_use]
    pub const fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    /// Rotation in degrees
    #[must_use]
    pub const fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Whether width and height trade places (90/270)
    #[must_use]
    pub const fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }

    /// Position in rotation-indexed lookup tables
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 1,
            Self::Deg180 => 2,
            Self::Deg270 => 3,
        }
    }
}

/// Mirror axes applied together with rotation
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flip {
    /// Mirror left/right
    Horizontal = 0b01,
    /// Mirror top/bottom
    Vertical = 0b10,
}

/// Set of active flips
pub type FlipFlags = BitFlags<Flip>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_bounds() {
        let rect = Rect::new(100, 50, 540, 430);
        assert_eq!(rect.right(), 640);
        assert_eq!(rect.bottom(), 480);
        assert!(rect.fits_within(Size::new(640, 480)));
        assert!(!rect.fits_within(Size::new(639, 480)));
    }

    #[test]
    fn test_rect_no_overflow() {
        let rect = Rect::new(u32::MAX, 0, 2, 1);
        assert!(!rect.fits_within(Size::new(u32::MAX, 10)));
    }

    #[test]
    fn test_rotation_parse() {
        assert_eq!(Rotation::from_degrees(180), Some(Rotation::Deg180));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::Deg270.degrees(), 270);
        assert!(!Rotation::Deg180.swaps_axes());
    }

    #[test]
    fn test_size_rotated() {
        let size = Size::new(800, 480);
        assert_eq!(size.rotated(Rotation::Deg0), size);
        assert_eq!(size.rotated(Rotation::Deg270), Size::new(480, 800));
    }

    #[test]
    fn test_flip_flags() {
        let flips = Flip::Horizontal | Flip::Vertical;
        assert!(flips.contains(Flip::Horizontal));
        assert_eq!(flips.bits(), 0b11);
        assert!(FlipFlags::empty().is_empty());
    }
}
