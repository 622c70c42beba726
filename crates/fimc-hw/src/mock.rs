//! Recording test doubles
//!
//! [`RecordingHardware`] and [`RecordingDisplay`] implement the facade
//! traits by appending every call to a shared log. Clones share the log, so a
//! test can hand one clone to the device and inspect the other.
//!
//! Requires the `mock` feature.
//!
//! # Usage
//!
//! ```rust
//! use fimc_hw::mock::{HwCall, RecordingHardware};
//! use fimc_hw::HardwareControl;
//!
//! let hw = RecordingHardware::new();
//! let mut handle = hw.clone();
//! handle.start_pipeline().unwrap();
//!
//! assert_eq!(hw.calls(), vec![HwCall::StartPipeline]);
//! assert!(hw.is_running());
//!
//! hw.fail_on("stop_pipeline");
//! assert!(handle.stop_pipeline().is_err());
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::control::{Direction, DmaSize, HardwareControl, Plane, ScalerParams};
use crate::error::{HwError, Result};
use crate::fifo::{DisplayFifo, FifoHook, ScreenInfo};
use crate::format::PixelFormat;
use crate::geometry::{FlipFlags, Rect, Rotation, Size};

/// One recorded facade call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwCall {
    SetFormat {
        direction: Direction,
        format: PixelFormat,
    },
    SetPath {
        source_is_memory: bool,
        sink_is_fifo: bool,
    },
    SetRotationFlip {
        rotation: Rotation,
        flip: FlipFlags,
        on_input: bool,
    },
    SetOffsets {
        direction: Direction,
        format: PixelFormat,
        bound: Size,
        window: Rect,
    },
    SetSizes {
        direction: Direction,
        sizes: DmaSize,
    },
    SetScaler(ScalerParams),
    SetAddress {
        direction: Direction,
        plane: Plane,
        address: u64,
    },
    StartPipeline,
    StopPipeline,
    EnableInterrupt(bool),
}

impl HwCall {
    /// Name of the trait method that produced the call
    #[must_use]
    pub const fn op_name(&self) -> &'static str {
        match self {
            Self::SetFormat { .. } => "set_format",
            Self::SetPath { .. } => "set_path",
            Self::SetRotationFlip { .. } => "set_rotation_flip",
            Self::SetOffsets { .. } => "set_offsets",
            Self::SetSizes { .. } => "set_sizes",
            Self::SetScaler(_) => "set_scaler",
            Self::SetAddress { .. } => "set_address",
            Self::StartPipeline => "start_pipeline",
            Self::StopPipeline => "stop_pipeline",
            Self::EnableInterrupt(_) => "enable_interrupt",
        }
    }
}

#[derive(Debug, Default)]
struct HardwareLog {
    calls: Vec<HwCall>,
    failing: HashSet<&'static str>,
    running: bool,
}

/// [`HardwareControl`] double that records every call
#[derive(Debug, Clone, Default)]
pub struct RecordingHardware {
    log: Arc<Mutex<HardwareLog>>,
}

impl RecordingHardware {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded calls
    pub fn calls(&self) -> Vec<HwCall> {
        self.log.lock().calls.clone()
    }

    /// Number of recorded calls of one method
    pub fn count(&self, op: &str) -> usize {
        self.log.lock().calls.iter().filter(|c| c.op_name() == op).count()
    }

    /// Last programmed scaler parameters
    pub fn last_scaler(&self) -> Option<ScalerParams> {
        self.log.lock().calls.iter().rev().find_map(|c| match c {
            HwCall::SetScaler(params) => Some(*params),
            _ => None,
        })
    }

    /// Last address programmed for `direction`/`plane`
    pub fn last_address(&self, direction: Direction, plane: Plane) -> Option<u64> {
        self.log.lock().calls.iter().rev().find_map(|c| match c {
            HwCall::SetAddress {
                direction: d,
                plane: p,
                address,
            } if *d == direction && *p == plane => Some(*address),
            _ => None,
        })
    }

    /// Whether the pipeline was started and not stopped since
    pub fn is_running(&self) -> bool {
        self.log.lock().running
    }

    /// Make every subsequent call of `op` fail
    pub fn fail_on(&self, op: &'static str) {
        self.log.lock().failing.insert(op);
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        self.log.lock().failing.clear();
    }

    /// Forget recorded calls
    pub fn clear(&self) {
        self.log.lock().calls.clear();
    }

    fn record(&self, call: HwCall) -> Result<()> {
        let mut log = self.log.lock();
        let op = call.op_name();
        if log.failing.contains(op) {
            debug!("RecordingHardware: injected failure on {}", op);
            return Err(HwError::register(format!("injected failure in {}", op)));
        }
        match call {
            HwCall::StartPipeline => log.running = true,
            HwCall::StopPipeline => log.running = false,
            _ => {}
        }
        log.calls.push(call);
        Ok(())
    }
}

impl HardwareControl for RecordingHardware {
    fn set_format(&mut self, direction: Direction, format: PixelFormat) -> Result<()> {
        self.record(HwCall::SetFormat { direction, format })
    }

    fn set_path(&mut self, source_is_memory: bool, sink_is_fifo: bool) -> Result<()> {
        self.record(HwCall::SetPath {
            source_is_memory,
            sink_is_fifo,
        })
    }

    fn set_rotation_flip(&mut self, rotation: Rotation, flip: FlipFlags, on_input: bool) -> Result<()> {
        self.record(HwCall::SetRotationFlip {
            rotation,
            flip,
            on_input,
        })
    }

    fn set_offsets(
        &mut self,
        direction: Direction,
        format: PixelFormat,
        bound: Size,
        window: Rect,
    ) -> Result<()> {
        self.record(HwCall::SetOffsets {
            direction,
            format,
            bound,
            window,
        })
    }

    fn set_sizes(&mut self, direction: Direction, sizes: DmaSize) -> Result<()> {
        self.record(HwCall::SetSizes { direction, sizes })
    }

    fn set_scaler(&mut self, params: &ScalerParams) -> Result<()> {
        self.record(HwCall::SetScaler(*params))
    }

    fn set_address(&mut self, direction: Direction, plane: Plane, address: u64) -> Result<()> {
        self.record(HwCall::SetAddress {
            direction,
            plane,
            address,
        })
    }

    fn start_pipeline(&mut self) -> Result<()> {
        self.record(HwCall::StartPipeline)
    }

    fn stop_pipeline(&mut self) -> Result<()> {
        self.record(HwCall::StopPipeline)
    }

    fn enable_interrupt(&mut self, enable: bool) -> Result<()> {
        self.record(HwCall::EnableInterrupt(enable))
    }
}

/// One recorded display call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FifoCall {
    GetScreenInfo(u32),
    SetScreenInfo { window: u32, info: ScreenInfo },
    SetWindowPosition { window: u32, x: u32, y: u32 },
    OpenFifo(u32),
    CloseFifo { window: u32, blocking: bool },
}

#[derive(Debug, Default)]
struct DisplayLog {
    calls: Vec<FifoCall>,
    windows: HashMap<u32, ScreenInfo>,
    open: HashSet<u32>,
    fail_open: bool,
}

/// [`DisplayFifo`] double with a fixed panel size
///
/// Open and close run their callbacks synchronously.
#[derive(Debug, Clone)]
pub struct RecordingDisplay {
    panel: Size,
    log: Arc<Mutex<DisplayLog>>,
}

impl RecordingDisplay {
    /// Create a display with the given native panel resolution
    #[must_use]
    pub fn new(panel: Size) -> Self {
        Self {
            panel,
            log: Arc::new(Mutex::new(DisplayLog::default())),
        }
    }

    /// Snapshot of all recorded calls
    pub fn calls(&self) -> Vec<FifoCall> {
        self.log.lock().calls.clone()
    }

    /// Current resolution of a window
    pub fn window_info(&self, window: u32) -> ScreenInfo {
        self.log.lock().windows.get(&window).copied().unwrap_or_default()
    }

    /// Whether the FIFO of `window` is open
    pub fn is_open(&self, window: u32) -> bool {
        self.log.lock().open.contains(&window)
    }

    /// Make subsequent `open_fifo` calls fail
    pub fn fail_open(&self, fail: bool) {
        self.log.lock().fail_open = fail;
    }
}

impl DisplayFifo for RecordingDisplay {
    fn panel_size(&self) -> Size {
        self.panel
    }

    fn screen_info(&mut self, window: u32) -> Result<ScreenInfo> {
        let mut log = self.log.lock();
        log.calls.push(FifoCall::GetScreenInfo(window));
        let info = log.windows.entry(window).or_insert(ScreenInfo {
            xres: self.panel.width,
            yres: self.panel.height,
            bits_per_pixel: 32,
        });
        Ok(*info)
    }

    fn set_screen_info(&mut self, window: u32, info: &ScreenInfo) -> Result<()> {
        let mut log = self.log.lock();
        log.calls.push(FifoCall::SetScreenInfo { window, info: *info });
        log.windows.insert(window, *info);
        Ok(())
    }

    fn set_window_position(&mut self, window: u32, x: u32, y: u32) -> Result<()> {
        self.log.lock().calls.push(FifoCall::SetWindowPosition { window, x, y });
        Ok(())
    }

    fn open_fifo(&mut self, window: u32, on_start: FifoHook<'_>) -> Result<()> {
        {
            let mut log = self.log.lock();
            if log.fail_open {
                return Err(HwError::fifo(format!("window {} refused FIFO", window)));
            }
            log.calls.push(FifoCall::OpenFifo(window));
            log.open.insert(window);
        }
        on_start()
    }

    fn close_fifo(&mut self, window: u32, on_stop: FifoHook<'_>, blocking: bool) -> Result<()> {
        {
            let mut log = self.log.lock();
            log.calls.push(FifoCall::CloseFifo { window, blocking });
            log.open.remove(&window);
        }
        on_stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_hardware_shares_log() {
        let hw = RecordingHardware::new();
        let mut handle = hw.clone();

        handle.enable_interrupt(true).unwrap();
        handle.set_address(Direction::Input, Plane::Cb, 0x1000).unwrap();

        assert_eq!(hw.count("enable_interrupt"), 1);
        assert_eq!(hw.last_address(Direction::Input, Plane::Cb), Some(0x1000));
        assert_eq!(hw.last_address(Direction::Output, Plane::Cb), None);
    }

    #[test]
    fn test_injected_failure_is_not_recorded() {
        let hw = RecordingHardware::new();
        let mut handle = hw.clone();
        hw.fail_on("start_pipeline");

        assert!(handle.start_pipeline().is_err());
        assert!(!hw.is_running());
        assert!(hw.calls().is_empty());

        hw.clear_failures();
        handle.start_pipeline().unwrap();
        assert!(hw.is_running());
    }

    #[test]
    fn test_display_runs_callbacks() {
        let display = RecordingDisplay::new(Size::new(480, 800));
        let mut handle = display.clone();
        let mut started = 0;

        handle
            .open_fifo(1, &mut || {
                started += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(started, 1);
        assert!(display.is_open(1));

        handle.close_fifo(1, &mut || Ok(()), true).unwrap();
        assert!(!display.is_open(1));
        assert_eq!(
            display.calls().last(),
            Some(&FifoCall::CloseFifo { window: 1, blocking: true })
        );
    }
}
