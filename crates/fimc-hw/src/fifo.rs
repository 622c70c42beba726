//! Display FIFO collaborator
//!
//! When no destination framebuffer is configured, the scaler output is
//! streamed straight into a display controller window through a local FIFO.
//! The display driver owns that window; this trait is the slice of it the
//! output path needs: panel geometry, window resolution and position, and
//! FIFO open/close with start/stop callbacks.

use crate::error::Result;
use crate::geometry::Size;

/// Window resolution as held by the display driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenInfo {
    /// Visible horizontal resolution
    pub xres: u32,

    /// Visible vertical resolution
    pub yres: u32,

    /// Bits per pixel of the window
    pub bits_per_pixel: u32,
}

/// Callback run by the display driver when it opens or closes the FIFO
pub type FifoHook<'a> = &'a mut dyn FnMut() -> Result<()>;

/// Display-controller operations consumed by the FIFO sink
pub trait DisplayFifo: Send {
    /// Native panel resolution (`lcd_hres` x `lcd_vres`)
    fn panel_size(&self) -> Size;

    /// Read the resolution of a window
    fn screen_info(&mut self, window: u32) -> Result<ScreenInfo>;

    /// Write the resolution of a window
    fn set_screen_info(&mut self, window: u32, info: &ScreenInfo) -> Result<()>;

    /// Move a window on the panel
    fn set_window_position(&mut self, window: u32, x: u32, y: u32) -> Result<()>;

    /// Open the FIFO feeding `window`; `on_start` starts the producer
    fn open_fifo(&mut self, window: u32, on_start: FifoHook<'_>) -> Result<()>;

    /// Close the FIFO feeding `window`; `on_stop` stops the producer
    ///
    /// With `blocking` set, returns only after the display has drained.
    fn close_fifo(&mut self, window: u32, on_stop: FifoHook<'_>, blocking: bool) -> Result<()>;
}
