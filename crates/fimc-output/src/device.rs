//! Output Device
//!
//! One [`OutputDevice`] per hardware unit. It owns the buffer pool, both
//! index queues, the negotiated output configuration and the stream status,
//! and drives the hardware and display collaborators.
//!
//! # Stream states
//!
//! ```text
//!  StreamOff ──stream_on──▶ ReadyOn ──first enqueue──▶ StreamOn ◀─┐
//!      ▲                                                │  ▲      │
//!      │                                  frame done,   │  │ next │
//!      │                                  queue empty   ▼  │ enq. │
//!      │                                            StreamOnIdle ─┘
//!      └───────────────stream_off (any state, via ReadyOff)
//! ```
//!
//! `StreamOnIdle` only occurs with the DMA sink: the FIFO sink keeps scanning
//! out the last buffer.
//!
//! # Locking
//!
//! | Lock | Guards |
//! |------|--------|
//! | `op_lock` | serializes stream_on/stream_off and configuration changes |
//! | `stream` (+ `stream_changed`) | status, committed plan, prev/active/next indices |
//! | `incoming`, `outgoing` (+ `out_ready`) | the two index queues |
//! | `buffers` | buffer table (leaf) |
//! | `output` | negotiated [`OutputConfig`] |
//! | `display`, `hw` | collaborators |
//!
//! Order: `op_lock` → `stream` → queue → `buffers`; `stream` → `display` →
//! `hw`. Only [`OutputDevice::dump_context`] holds both queue locks, incoming
//! first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use fimc_hw::{Direction, DisplayFifo, Flip, HardwareControl, Plane, Rect, Rotation, Size, PAGE_SIZE};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::buffer::{BufferFlag, BufferFlags, BufferPool, BufferState, MemoryType};
use crate::config::DeviceConfig;
use crate::error::{OutputError, Result};
use crate::format::{self, PixFormat};
use crate::geometry::{self, CommitPlan, CropCap, Framebuffer, OutputConfig, Sink};
use crate::queue::IndexQueue;

/// Device-wide stream status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamStatus {
    /// Not streaming; configuration may change
    StreamOff,
    /// Parameters committed, waiting for the first buffer
    ReadyOn,
    /// Hardware is processing a frame
    StreamOn,
    /// DMA sink finished its last frame and has nothing queued
    StreamOnIdle,
    /// FIFO sink is being torn down
    ReadyOff,
}

/// Controls exposed through get/set control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Rotation in degrees (0, 90, 180, 270)
    Rotation,
    /// Horizontal flip (0 or 1)
    HFlip,
    /// Vertical flip (0 or 1)
    VFlip,
    /// Base address of the reserved memory region (read-only)
    ReservedMemBase,
}

/// Result of a buffer query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Buffer index
    pub index: usize,

    /// mmap offset cookie
    pub offset: u64,

    /// Sum of plane lengths
    pub length: u64,

    /// Client-visible flags
    pub flags: BufferFlags,
}

/// Buffers the hardware currently owns
///
/// `active` is being read. With the FIFO sink, `next` has been programmed
/// and takes over at the next frame end, and `prev` was on screen before
/// `active` and is released at the following swap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct IndexTracker {
    prev: Option<usize>,
    active: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
struct StreamState {
    status: StreamStatus,
    plan: Option<CommitPlan>,
    idx: IndexTracker,
}

#[derive(Debug)]
struct BufferTable {
    pool: BufferPool,
    memory: MemoryType,
}

/// Snapshot of queues, hardware-owned indices and buffer states
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDump {
    /// Stream status
    pub status: StreamStatus,

    /// Incoming queue slots, slot 0 newest
    pub incoming: Vec<Option<usize>>,

    /// Outgoing queue slots, slot 0 newest
    pub outgoing: Vec<Option<usize>>,

    /// Previously displayed buffer (FIFO sink)
    pub prev: Option<usize>,

    /// Buffer being read by the hardware
    pub active: Option<usize>,

    /// Buffer programmed for the next frame (FIFO sink)
    pub next: Option<usize>,

    /// State of every pool slot
    pub states: Vec<BufferState>,
}

impl ContextDump {
    /// Every breach of the single-location rule
    ///
    /// Each buffer must be in exactly one of: idle, the incoming queue, the
    /// outgoing queue, or owned by the hardware; its state must match.
    /// Hardware-owned buffers require a running stream.
    #[must_use]
    pub fn violations(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let owned = [self.prev, self.active, self.next];

        for (index, &state) in self.states.iter().enumerate() {
            let queued = self.incoming.iter().filter(|&&slot| slot == Some(index)).count();
            let done = self.outgoing.iter().filter(|&&slot| slot == Some(index)).count();
            let hardware = owned.iter().filter(|&&slot| slot == Some(index)).count();

            let places = queued + done + hardware;
            if places > 1 {
                issues.push(format!("buffer {} is tracked in {} places", index, places));
                continue;
            }

            let expected = if queued == 1 {
                BufferState::Queued
            } else if done == 1 {
                BufferState::Done
            } else if hardware == 1 {
                BufferState::Active
            } else {
                BufferState::Idle
            };

            if state != expected {
                issues.push(format!(
                    "buffer {} is {:?} but its location implies {:?}",
                    index, state, expected
                ));
            }
        }

        let running = matches!(self.status, StreamStatus::StreamOn | StreamStatus::ReadyOff);
        if !running && owned.iter().any(Option::is_some) {
            issues.push(format!(
                "hardware owns {:?}/{:?}/{:?} while {:?}",
                self.prev, self.active, self.next, self.status
            ));
        }

        issues
    }
}

/// Output-device controller for one FIMC unit
pub struct OutputDevice {
    config: DeviceConfig,
    panel: Size,

    op_lock: Mutex<()>,
    stream: Mutex<StreamState>,
    stream_changed: Condvar,

    output: Mutex<OutputConfig>,

    incoming: Mutex<IndexQueue>,
    outgoing: Mutex<IndexQueue>,
    out_ready: Condvar,
    interrupted: AtomicBool,

    buffers: Mutex<BufferTable>,

    hw: Mutex<Box<dyn HardwareControl>>,
    display: Mutex<Box<dyn DisplayFifo>>,
}

impl std::fmt::Debug for OutputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputDevice")
            .field("id", &self.config.id)
            .field("panel", &self.panel)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl OutputDevice {
    /// Create a device for one hardware unit
    pub fn new(
        config: DeviceConfig,
        hw: impl HardwareControl + 'static,
        display: impl DisplayFifo + 'static,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|issues| OutputError::InvalidConfig(issues.join("; ")))?;

        let capacity = config.buffer_count;
        let panel = display.panel_size();

        info!(
            "FIMC{} output device: {} buffers, reserved {:#x}+{:#x}, revision {:#x}, panel {}x{}",
            config.id,
            capacity,
            config.reserved_base,
            config.reserved_size,
            config.revision,
            panel.width,
            panel.height
        );

        Ok(Self {
            panel,
            op_lock: Mutex::new(()),
            stream: Mutex::new(StreamState {
                status: StreamStatus::StreamOff,
                plan: None,
                idx: IndexTracker::default(),
            }),
            stream_changed: Condvar::new(),
            output: Mutex::new(OutputConfig::default()),
            incoming: Mutex::new(IndexQueue::new(capacity)),
            outgoing: Mutex::new(IndexQueue::new(capacity)),
            out_ready: Condvar::new(),
            interrupted: AtomicBool::new(false),
            buffers: Mutex::new(BufferTable {
                pool: BufferPool::new(capacity),
                memory: MemoryType::Mmap,
            }),
            hw: Mutex::new(Box::new(hw)),
            display: Mutex::new(Box::new(display)),
            config,
        })
    }

    /// Device configuration
    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Native panel resolution of the display collaborator
    #[must_use]
    pub fn panel_size(&self) -> Size {
        self.panel
    }

    /// Current stream status
    #[must_use]
    pub fn status(&self) -> StreamStatus {
        self.stream.lock().status
    }

    fn ensure_stopped(&self, op: &str) -> Result<()> {
        let status = self.stream.lock().status;
        if status != StreamStatus::StreamOff {
            warn!("FIMC{}: {} rejected while {:?}", self.config.id, op, status);
            return Err(OutputError::busy(format!("{} requires streaming off ({:?})", op, status)));
        }
        Ok(())
    }

    // =========================================================================
    // Format negotiation
    // =========================================================================

    /// Current source format, if one was set
    #[must_use]
    pub fn format(&self) -> Option<PixFormat> {
        self.output.lock().pix
    }

    /// Validate a format request and fill in its derived fields
    pub fn try_format(&self, pix: &mut PixFormat) -> Result<()> {
        self.ensure_stopped("try_format")?;
        format::negotiate(pix)?;
        Ok(())
    }

    /// Negotiate and store the source format
    pub fn set_format(&self, pix: &mut PixFormat) -> Result<()> {
        let _op = self.op_lock.lock();
        self.ensure_stopped("set_format")?;

        let pixel_format = format::negotiate(pix)?;
        self.output.lock().pix = Some(*pix);

        debug!(
            "FIMC{}: format {} {}x{}, {} bytes/line",
            self.config.id, pixel_format, pix.width, pix.height, pix.bytes_per_line
        );
        Ok(())
    }

    // =========================================================================
    // Crop, window and framebuffer
    // =========================================================================

    /// Crop capability for the current format and rotation
    pub fn crop_cap(&self) -> Result<CropCap> {
        self.ensure_stopped("crop_cap")?;
        let output = self.output.lock();
        geometry::crop_cap(output.pix.as_ref(), self.panel, output.rotation)
    }

    /// Current crop rectangle
    #[must_use]
    pub fn crop(&self) -> Option<Rect> {
        self.output.lock().crop
    }

    /// Set the source crop rectangle
    ///
    /// The previous rectangle is kept when the new one is rejected.
    pub fn set_crop(&self, crop: Rect) -> Result<()> {
        let _op = self.op_lock.lock();
        self.ensure_stopped("set_crop")?;

        geometry::check_crop(crop, self.config.src_max).inspect_err(|e| {
            warn!("FIMC{}: crop {:?} rejected: {}", self.config.id, crop, e);
        })?;
        self.output.lock().crop = Some(crop);
        Ok(())
    }

    /// Current destination window
    #[must_use]
    pub fn window(&self) -> Option<Rect> {
        self.output.lock().window
    }

    /// Set the destination window
    ///
    /// Bounds are checked against the sink at stream start.
    pub fn set_window(&self, window: Rect) -> Result<()> {
        let _op = self.op_lock.lock();
        self.ensure_stopped("set_window")?;
        self.output.lock().window = Some(window);
        Ok(())
    }

    /// Current destination framebuffer
    #[must_use]
    pub fn framebuffer(&self) -> Option<Framebuffer> {
        self.output.lock().framebuffer
    }

    /// Set or clear the destination framebuffer
    ///
    /// A framebuffer with a non-zero base selects the DMA sink.
    pub fn set_framebuffer(&self, framebuffer: Option<Framebuffer>) -> Result<()> {
        let _op = self.op_lock.lock();
        self.ensure_stopped("set_framebuffer")?;
        self.output.lock().framebuffer = framebuffer;
        Ok(())
    }

    // =========================================================================
    // Controls
    // =========================================================================

    /// Read a control value
    pub fn control(&self, control: Control) -> Result<u64> {
        self.ensure_stopped("get_control")?;
        let output = self.output.lock();

        Ok(match control {
            Control::Rotation => u64::from(output.rotation.degrees()),
            Control::HFlip => u64::from(output.flip.contains(Flip::Horizontal)),
            Control::VFlip => u64::from(output.flip.contains(Flip::Vertical)),
            Control::ReservedMemBase => self.config.reserved_base,
        })
    }

    /// Write a control value
    pub fn set_control(&self, control: Control, value: u64) -> Result<()> {
        let _op = self.op_lock.lock();
        self.ensure_stopped("set_control")?;
        let mut output = self.output.lock();

        match control {
            Control::Rotation => {
                let rotation = u32::try_from(value)
                    .ok()
                    .and_then(Rotation::from_degrees)
                    .ok_or_else(|| OutputError::geometry(format!("invalid rotation {}", value)))?;
                output.rotation = rotation;
            }
            Control::HFlip => output.flip.set(Flip::Horizontal, value != 0),
            Control::VFlip => output.flip.set(Flip::Vertical, value != 0),
            Control::ReservedMemBase => {
                return Err(OutputError::InvalidConfig("reserved memory base is read-only".to_string()));
            }
        }

        debug!("FIMC{}: {:?} = {}", self.config.id, control, value);
        Ok(())
    }

    // =========================================================================
    // Buffer management
    // =========================================================================

    /// Lay out `count` buffers for the current format
    ///
    /// Returns the granted count, clamped to the pool capacity. A count of
    /// zero releases the buffers.
    pub fn request_buffers(&self, count: usize, memory: MemoryType) -> Result<usize> {
        let _op = self.op_lock.lock();
        self.ensure_stopped("request_buffers")?;

        let pix = self.output.lock().pix;
        let capacity = self.config.buffer_count;

        if self.buffers.lock().pool.is_allocated() && count != 0 {
            warn!("FIMC{}: buffers were already requested", self.config.id);
            return Err(OutputError::busy("buffers already requested"));
        }

        let granted = if count > capacity {
            warn!(
                "FIMC{}: buffer count reduced from {} to {}",
                self.config.id, count, capacity
            );
            capacity
        } else {
            count
        };

        let (pixel_format, size) = match pix.and_then(|p| p.pixel_format().map(|f| (f, p.size()))) {
            Some(found) => found,
            None => {
                if granted != 0 {
                    warn!("FIMC{}: buffers requested before a format was set", self.config.id);
                }
                (fimc_hw::PixelFormat::RGB32, Size::default())
            }
        };

        let layout = self
            .buffers
            .lock()
            .pool
            .plan_layout(pixel_format, size, memory, self.config.reserved_size)
            .inspect_err(|e| warn!("FIMC{}: buffer request rejected: {}", self.config.id, e))?;

        self.outgoing.lock().clear();

        let mut incoming = self.incoming.lock();
        let mut table = self.buffers.lock();
        incoming.clear();
        table.pool.apply_layout(&layout, self.config.reserved_base, granted);
        table.memory = memory;
        drop(table);
        drop(incoming);

        info!("FIMC{}: {} {:?} buffers requested", self.config.id, granted, memory);
        Ok(granted)
    }

    /// Report offset, length and flags of one buffer
    pub fn query_buffer(&self, index: usize) -> Result<BufferInfo> {
        self.ensure_stopped("query_buffer")?;

        let table = self.buffers.lock();
        table.pool.check_index(index)?;
        let buffer = table
            .pool
            .get(index)
            .ok_or(OutputError::InvalidIndex { index, count: table.pool.requested() })?;

        Ok(BufferInfo {
            index,
            offset: index as u64 * PAGE_SIZE,
            length: buffer.total_length(),
            flags: buffer.flags,
        })
    }

    /// Hand a buffer to the device
    ///
    /// `planes` overwrites the plane addresses in user-pointer mode. If the
    /// hardware is waiting for input, the oldest queued buffer is started.
    pub fn enqueue(&self, index: usize, planes: Option<[u64; 3]>) -> Result<()> {
        self.attach_incoming(index, planes)?;

        let mut stream = self.stream.lock();
        let Some(plan) = stream.plan else {
            return Ok(());
        };

        match plan.sink {
            Sink::Dma(fb) => {
                if matches!(stream.status, StreamStatus::ReadyOn | StreamStatus::StreamOnIdle) {
                    self.start_dma(&mut stream, &fb)?;
                }
            }
            Sink::Fifo { .. } => {
                if stream.status == StreamStatus::ReadyOn {
                    self.start_fifo(&mut stream, &plan)?;
                }
            }
        }

        Ok(())
    }

    /// Take a finished buffer back, waiting up to the configured timeout
    pub fn dequeue(&self) -> Result<usize> {
        self.dequeue_timeout(self.config.dequeue_timeout)
    }

    /// Take a finished buffer back, waiting up to `timeout`
    ///
    /// An [`interrupt_dequeue`](Self::interrupt_dequeue) during the wait
    /// makes one more non-blocking attempt before failing with
    /// [`OutputError::Interrupted`].
    pub fn dequeue_timeout(&self, timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.outgoing.lock();

        loop {
            if let Some(index) = self.detach_outgoing(&mut queue) {
                return Ok(index);
            }

            if self.interrupted.swap(false, Ordering::AcqRel) {
                if let Some(index) = self.detach_outgoing(&mut queue) {
                    return Ok(index);
                }
                warn!("FIMC{}: dequeue interrupted", self.config.id);
                return Err(OutputError::Interrupted);
            }

            if self.out_ready.wait_until(&mut queue, deadline).timed_out() {
                if let Some(index) = self.detach_outgoing(&mut queue) {
                    return Ok(index);
                }
                drop(queue);

                error!("FIMC{}: outgoing queue empty after {:?}", self.config.id, timeout);
                self.dump_context();
                return Err(OutputError::Timeout(format!("outgoing buffer after {:?}", timeout)));
            }
        }
    }

    /// Cancel the current (or next) blocked dequeue
    pub fn interrupt_dequeue(&self) {
        self.interrupted.store(true, Ordering::Release);
        let _queue = self.outgoing.lock();
        self.out_ready.notify_all();
    }

    /// Move a hardware-owned buffer to the outgoing queue
    pub fn complete_active(&self, index: usize) -> Result<()> {
        let mut stream = self.stream.lock();
        let idx = &mut stream.idx;

        for slot in [&mut idx.prev, &mut idx.active, &mut idx.next] {
            if *slot == Some(index) {
                *slot = None;
            }
        }

        self.attach_outgoing(index)
    }

    /// Frame-end notification from the hardware
    ///
    /// DMA sink: the finished buffer goes to the outgoing queue and the next
    /// queued buffer, if any, is started; otherwise the device goes idle.
    /// FIFO sink: a programmed buffer takes over the screen, the one it
    /// replaces is released after one more frame, and the next queued buffer
    /// is programmed.
    pub fn complete_frame(&self) -> Result<()> {
        let mut stream = self.stream.lock();

        if stream.status != StreamStatus::StreamOn {
            debug!("FIMC{}: frame end ignored while {:?}", self.config.id, stream.status);
            return Ok(());
        }
        let Some(plan) = stream.plan else {
            return Ok(());
        };

        match plan.sink {
            Sink::Dma(fb) => {
                if let Some(done) = stream.idx.active.take() {
                    self.attach_outgoing(done)?;
                }

                if self.incoming.lock().is_empty() {
                    stream.status = StreamStatus::StreamOnIdle;
                    self.stream_changed.notify_all();
                    debug!("FIMC{}: idle, nothing queued", self.config.id);
                } else {
                    self.start_dma(&mut stream, &fb)?;
                }
            }
            Sink::Fifo { .. } => {
                if let Some(next) = stream.idx.next.take() {
                    if let Some(released) = stream.idx.prev.take() {
                        self.attach_outgoing(released)?;
                    }
                    stream.idx.prev = stream.idx.active.replace(next);
                }

                if let Some(index) = self.detach_incoming() {
                    match self.program_source(index) {
                        Ok(()) => stream.idx.next = Some(index),
                        Err(e) => {
                            error!("FIMC{}: failed to program buffer {}: {}", self.config.id, index, e);
                            self.release_to_idle(index);
                            return Err(e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    // =========================================================================
    // Streaming
    // =========================================================================

    /// Validate the configuration and commit it to the hardware
    ///
    /// Nothing is written if validation fails; the status stays `StreamOff`.
    pub fn stream_on(&self) -> Result<()> {
        let _op = self.op_lock.lock();
        let mut stream = self.stream.lock();

        if stream.status != StreamStatus::StreamOff {
            return Err(OutputError::busy(format!("stream_on while {:?}", stream.status)));
        }

        let output = *self.output.lock();
        let plan = geometry::plan(&output, self.panel, &self.config.limits, self.config.scaler_caps())
            .inspect_err(|e| warn!("FIMC{}: stream_on rejected: {}", self.config.id, e))?;

        self.commit(&plan)
            .inspect_err(|e| error!("FIMC{}: parameter commit failed: {}", self.config.id, e))?;

        stream.plan = Some(plan);
        stream.status = StreamStatus::ReadyOn;
        self.stream_changed.notify_all();

        info!(
            "FIMC{}: stream on ({} sink, rotation {})",
            self.config.id,
            if plan.sink.is_fifo() { "fifo" } else { "dma" },
            plan.rotation.degrees()
        );
        Ok(())
    }

    /// Stop streaming and return every buffer to the client
    ///
    /// Always ends in `StreamOff`. A DMA sink is given up to the configured
    /// stop timeout to finish its frame; hardware errors are logged.
    pub fn stream_off(&self) -> Result<()> {
        let _op = self.op_lock.lock();
        let mut stream = self.stream.lock();

        if stream.status != StreamStatus::StreamOff {
            let sink = match stream.plan {
                Some(plan) => plan.sink,
                None => Sink::select(self.output.lock().framebuffer, self.panel),
            };

            match sink {
                Sink::Dma(_) => {
                    let deadline = Instant::now() + self.config.stop_timeout;
                    while stream.status == StreamStatus::StreamOn {
                        if self.stream_changed.wait_until(&mut stream, deadline).timed_out() {
                            error!(
                                "FIMC{}: hardware still busy after {:?}, stopping anyway",
                                self.config.id, self.config.stop_timeout
                            );
                            break;
                        }
                    }

                    if let Err(e) = self.hw.lock().stop_pipeline() {
                        error!("FIMC{}: stop pipeline failed: {}", self.config.id, e);
                    }
                }
                Sink::Fifo { .. } => {
                    stream.status = StreamStatus::ReadyOff;
                    if let Err(e) = self.stop_fifo() {
                        error!("FIMC{}: FIFO close failed: {}", self.config.id, e);
                    }
                }
            }
        }

        self.incoming.lock().clear();
        self.outgoing.lock().clear();
        self.buffers.lock().pool.reset(BufferFlag::Mapped.into());

        stream.idx = IndexTracker::default();
        stream.plan = None;
        stream.status = StreamStatus::StreamOff;
        self.stream_changed.notify_all();

        info!("FIMC{}: stream off", self.config.id);
        Ok(())
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Snapshot and log queues, hardware-owned indices and buffer states
    pub fn dump_context(&self) -> ContextDump {
        let stream = self.stream.lock();
        let incoming = self.incoming.lock();
        let outgoing = self.outgoing.lock();
        let table = self.buffers.lock();

        let dump = ContextDump {
            status: stream.status,
            incoming: incoming.slots(),
            outgoing: outgoing.slots(),
            prev: stream.idx.prev,
            active: stream.idx.active,
            next: stream.idx.next,
            states: table.pool.iter().map(|b| b.state).collect(),
        };

        drop(table);
        drop(outgoing);
        drop(incoming);
        drop(stream);

        error!("FIMC{}: status {:?}", self.config.id, dump.status);
        error!("FIMC{}: incoming {:?}", self.config.id, dump.incoming);
        error!("FIMC{}: outgoing {:?}", self.config.id, dump.outgoing);
        error!(
            "FIMC{}: prev {:?} active {:?} next {:?}",
            self.config.id, dump.prev, dump.active, dump.next
        );
        for (index, state) in dump.states.iter().enumerate() {
            error!("FIMC{}: buffer {} {:?}", self.config.id, index, state);
        }
        for issue in dump.violations() {
            error!("FIMC{}: {}", self.config.id, issue);
        }

        dump
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn attach_incoming(&self, index: usize, planes: Option<[u64; 3]>) -> Result<()> {
        let mut queue = self.incoming.lock();
        let mut table = self.buffers.lock();

        table.pool.check_index(index)?;
        let state = table.pool.get(index).map(|b| b.state);
        if state != Some(BufferState::Idle) {
            return Err(OutputError::invalid_state(format!(
                "buffer {} is {:?}, expected Idle",
                index, state
            )));
        }

        if let Some(planes) = planes {
            if table.memory != MemoryType::UserPtr {
                return Err(OutputError::invalid_state(
                    "plane addresses are only accepted for user-pointer buffers",
                ));
            }
            table.pool.set_addresses(index, planes)?;
        }

        queue
            .push_front(index)
            .map_err(|full| OutputError::invalid_state(format!("incoming queue full at {}", full.0)))?;
        if let Some(buffer) = table.pool.get_mut(index) {
            buffer.set_state(BufferState::Queued);
        }

        debug!("FIMC{}: queued buffer {}", self.config.id, index);
        Ok(())
    }

    fn detach_incoming(&self) -> Option<usize> {
        let mut queue = self.incoming.lock();
        let index = queue.pop_tail()?;
        if let Some(buffer) = self.buffers.lock().pool.get_mut(index) {
            buffer.set_state(BufferState::Active);
        }
        debug!("FIMC{}: buffer {} to hardware", self.config.id, index);
        Some(index)
    }

    fn attach_outgoing(&self, index: usize) -> Result<()> {
        let mut queue = self.outgoing.lock();
        let mut table = self.buffers.lock();

        let count = table.pool.requested();
        let buffer = table
            .pool
            .get_mut(index)
            .ok_or(OutputError::InvalidIndex { index, count })?;
        if buffer.state != BufferState::Active {
            return Err(OutputError::invalid_state(format!(
                "buffer {} is {:?}, expected Active",
                index, buffer.state
            )));
        }

        queue
            .push_front(index)
            .map_err(|full| OutputError::invalid_state(format!("outgoing queue full at {}", full.0)))?;
        buffer.set_state(BufferState::Done);
        drop(table);

        self.out_ready.notify_one();
        debug!("FIMC{}: buffer {} done", self.config.id, index);
        Ok(())
    }

    fn detach_outgoing(&self, queue: &mut IndexQueue) -> Option<usize> {
        let index = queue.pop_tail()?;
        if let Some(buffer) = self.buffers.lock().pool.get_mut(index) {
            buffer.set_state(BufferState::Idle);
        }
        debug!("FIMC{}: dequeued buffer {}", self.config.id, index);
        Some(index)
    }

    fn release_to_idle(&self, index: usize) {
        if let Some(buffer) = self.buffers.lock().pool.get_mut(index) {
            buffer.set_state(BufferState::Idle);
        }
    }

    fn commit(&self, plan: &CommitPlan) -> Result<()> {
        let mut hw = self.hw.lock();

        hw.enable_interrupt(true)?;
        hw.set_format(Direction::Input, plan.source_format)?;
        hw.set_format(Direction::Output, plan.destination_format)?;
        hw.set_path(true, plan.sink.is_fifo())?;
        hw.set_rotation_flip(plan.rotation, plan.flip, plan.rotate_on_input)?;

        hw.set_offsets(Direction::Input, plan.source_format, plan.source_bound, plan.crop)?;
        hw.set_sizes(Direction::Input, plan.source_sizes)?;

        if let Some((bound, window)) = plan.destination_offset {
            hw.set_offsets(Direction::Output, plan.destination_format, bound, window)?;
        }
        hw.set_sizes(Direction::Output, plan.destination_sizes)?;
        hw.set_scaler(&plan.scaler)?;

        Ok(())
    }

    fn program_source(&self, index: usize) -> Result<()> {
        let base = self
            .buffers
            .lock()
            .pool
            .get(index)
            .map(|b| b.base)
            .ok_or(OutputError::InvalidIndex { index, count: 0 })?;

        let mut hw = self.hw.lock();
        for plane in Plane::ALL {
            hw.set_address(Direction::Input, plane, base[plane.index()])?;
        }
        Ok(())
    }

    fn start_dma(&self, stream: &mut StreamState, fb: &Framebuffer) -> Result<()> {
        let Some(index) = self.detach_incoming() else {
            return Ok(());
        };

        let started = self.program_source(index).and_then(|()| {
            let mut hw = self.hw.lock();
            hw.set_address(Direction::Output, Plane::Y, fb.base)?;
            hw.start_pipeline()?;
            Ok(())
        });

        if let Err(e) = started {
            error!("FIMC{}: failed to start buffer {}: {}", self.config.id, index, e);
            self.release_to_idle(index);
            stream.idx.active = None;
            return Err(e);
        }

        stream.idx.active = Some(index);
        stream.status = StreamStatus::StreamOn;
        self.stream_changed.notify_all();
        debug!("FIMC{}: DMA frame started with buffer {}", self.config.id, index);
        Ok(())
    }

    fn start_fifo(&self, stream: &mut StreamState, plan: &CommitPlan) -> Result<()> {
        let Some(index) = self.detach_incoming() else {
            return Ok(());
        };

        let started = self.program_source(index).and_then(|()| self.open_fifo(plan));
        if let Err(e) = started {
            error!("FIMC{}: failed to open FIFO with buffer {}: {}", self.config.id, index, e);
            self.release_to_idle(index);
            stream.idx.active = None;
            return Err(e);
        }

        stream.idx.active = Some(index);
        stream.status = StreamStatus::StreamOn;
        self.stream_changed.notify_all();
        info!("FIMC{}: FIFO streaming with buffer {}", self.config.id, index);
        Ok(())
    }

    fn open_fifo(&self, plan: &CommitPlan) -> Result<()> {
        let window_id = self.config.id;
        let rect = geometry::panel_window(plan.window, self.panel, plan.rotation);

        let mut display = self.display.lock();
        let mut info = display.screen_info(window_id)?;
        info.xres = rect.width;
        info.yres = rect.height;
        display.set_screen_info(window_id, &info)?;
        display.set_window_position(window_id, rect.left, rect.top)?;

        debug!("FIMC{}: panel window {:?}", self.config.id, rect);

        let hw = &self.hw;
        display.open_fifo(window_id, &mut || hw.lock().start_pipeline())?;
        Ok(())
    }

    fn stop_fifo(&self) -> Result<()> {
        let hw = &self.hw;
        self.display
            .lock()
            .close_fifo(self.config.id, &mut || hw.lock().stop_pipeline(), true)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fimc_hw::mock::{RecordingDisplay, RecordingHardware};
    use fimc_hw::PixelFormat;

    const PANEL: Size = Size::new(480, 800);

    fn device() -> (OutputDevice, RecordingHardware, RecordingDisplay) {
        let hw = RecordingHardware::new();
        let display = RecordingDisplay::new(PANEL);
        let config = DeviceConfig::builder()
            .dequeue_timeout(Duration::from_millis(50))
            .stop_timeout(Duration::from_millis(20))
            .build();
        let device = OutputDevice::new(config, hw.clone(), display.clone()).unwrap();
        (device, hw, display)
    }

    fn configure(device: &OutputDevice) {
        let mut pix = PixFormat::new(PixelFormat::NV12, 640, 480);
        device.set_format(&mut pix).unwrap();
        device.set_crop(Rect::new(0, 0, 640, 480)).unwrap();
        device.set_window(Rect::new(0, 0, 320, 240)).unwrap();
    }

    fn framebuffer() -> Framebuffer {
        Framebuffer {
            base: 0x5800_0000,
            size: Size::new(800, 480),
            format: PixelFormat::RGB565,
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = DeviceConfig {
            buffer_count: 0,
            ..Default::default()
        };
        let err = OutputDevice::new(config, RecordingHardware::new(), RecordingDisplay::new(PANEL)).unwrap_err();
        assert!(matches!(err, OutputError::InvalidConfig(_)));
    }

    #[test]
    fn test_controls() {
        let (device, _, _) = device();

        device.set_control(Control::Rotation, 270).unwrap();
        assert_eq!(device.control(Control::Rotation).unwrap(), 270);
        assert!(matches!(
            device.set_control(Control::Rotation, 45),
            Err(OutputError::InvalidGeometry(_))
        ));

        device.set_control(Control::VFlip, 1).unwrap();
        assert_eq!(device.control(Control::VFlip).unwrap(), 1);
        assert_eq!(device.control(Control::HFlip).unwrap(), 0);

        assert_eq!(device.control(Control::ReservedMemBase).unwrap(), 0x4D80_0000);
        assert!(device.set_control(Control::ReservedMemBase, 0).is_err());
    }

    #[test]
    fn test_request_buffers_twice_is_busy() {
        let (device, _, _) = device();
        configure(&device);

        assert_eq!(device.request_buffers(8, MemoryType::Mmap).unwrap(), 3);
        assert!(matches!(
            device.request_buffers(2, MemoryType::Mmap),
            Err(OutputError::Busy(_))
        ));

        // Releasing allows a new request
        assert_eq!(device.request_buffers(0, MemoryType::Mmap).unwrap(), 0);
        assert_eq!(device.request_buffers(2, MemoryType::Mmap).unwrap(), 2);
    }

    #[test]
    fn test_rejected_request_keeps_queues() {
        let (device, _, _) = device();
        let mut pix = PixFormat::new(PixelFormat::RGB32, 64, 64);
        device.set_format(&mut pix).unwrap();
        device.request_buffers(3, MemoryType::Mmap).unwrap();
        device.enqueue(0, None).unwrap();

        let mut pix = PixFormat::new(PixelFormat::RGB32, 4096, 4096);
        device.set_format(&mut pix).unwrap();
        let err = device.request_buffers(0, MemoryType::Mmap).unwrap_err();
        assert!(matches!(err, OutputError::InsufficientMemory { .. }));

        let dump = device.dump_context();
        assert_eq!(dump.incoming[0], Some(0));
        assert_eq!(dump.states[0], BufferState::Queued);
        assert!(dump.violations().is_empty());

        // Still releasable once the format fits again
        let mut pix = PixFormat::new(PixelFormat::RGB32, 64, 64);
        device.set_format(&mut pix).unwrap();
        assert_eq!(device.request_buffers(0, MemoryType::Mmap).unwrap(), 0);
        assert!(device.dump_context().violations().is_empty());
    }

    #[test]
    fn test_large_format_accepted() {
        let (device, _, _) = device();

        let mut pix = PixFormat::new(PixelFormat::RGB32, 65536, 65536);
        device.set_format(&mut pix).unwrap();
        assert_eq!(device.format().map(|p| p.size_image), Some(1_u64 << 34));

        let err = device.request_buffers(3, MemoryType::Mmap).unwrap_err();
        assert!(matches!(err, OutputError::InsufficientMemory { .. }));
    }

    #[test]
    fn test_stream_on_hardware_fault() {
        let (device, hw, _) = device();
        configure(&device);
        device.set_framebuffer(Some(framebuffer())).unwrap();
        device.request_buffers(3, MemoryType::Mmap).unwrap();

        hw.fail_on("set_scaler");
        let err = device.stream_on().unwrap_err();
        assert!(matches!(err, OutputError::HardwareFault(_)));
        assert_eq!(device.status(), StreamStatus::StreamOff);

        // Configuration is still editable and a retry succeeds
        device.set_control(Control::HFlip, 1).unwrap();
        hw.clear_failures();
        device.stream_on().unwrap();
        assert_eq!(device.status(), StreamStatus::ReadyOn);
    }

    #[test]
    fn test_query_buffer() {
        let (device, _, _) = device();
        configure(&device);
        device.request_buffers(3, MemoryType::Mmap).unwrap();

        let info = device.query_buffer(2).unwrap();
        assert_eq!(info.offset, 2 * PAGE_SIZE);
        assert_eq!(info.length, 640 * 480 * 3 / 2);
        assert!(info.flags.is_empty());

        assert!(matches!(
            device.query_buffer(3),
            Err(OutputError::InvalidIndex { index: 3, count: 3 })
        ));
    }

    #[test]
    fn test_enqueue_checks_state() {
        let (device, _, _) = device();
        configure(&device);
        device.request_buffers(3, MemoryType::Mmap).unwrap();

        device.enqueue(1, None).unwrap();
        assert!(matches!(device.enqueue(1, None), Err(OutputError::InvalidState(_))));
        assert!(matches!(device.enqueue(5, None), Err(OutputError::InvalidIndex { .. })));

        // Plane addresses need user-pointer memory
        assert!(matches!(
            device.enqueue(0, Some([0x1000, 0, 0])),
            Err(OutputError::InvalidState(_))
        ));
        assert!(device.dump_context().violations().is_empty());
    }

    #[test]
    fn test_mutators_busy_while_streaming() {
        let (device, _, _) = device();
        configure(&device);
        device.set_framebuffer(Some(framebuffer())).unwrap();
        device.request_buffers(3, MemoryType::Mmap).unwrap();
        device.stream_on().unwrap();

        let mut pix = PixFormat::new(PixelFormat::RGB32, 64, 64);
        assert!(matches!(device.set_format(&mut pix), Err(OutputError::Busy(_))));
        assert!(matches!(device.try_format(&mut pix), Err(OutputError::Busy(_))));
        assert!(matches!(device.set_crop(Rect::new(0, 0, 16, 16)), Err(OutputError::Busy(_))));
        assert!(matches!(
            device.set_control(Control::Rotation, 90),
            Err(OutputError::Busy(_))
        ));
        assert!(matches!(
            device.request_buffers(0, MemoryType::Mmap),
            Err(OutputError::Busy(_))
        ));
        assert!(matches!(device.query_buffer(0), Err(OutputError::Busy(_))));
        assert!(matches!(device.stream_on(), Err(OutputError::Busy(_))));
    }

    #[test]
    fn test_dma_start_failure_leaves_status() {
        let (device, hw, _) = device();
        configure(&device);
        device.set_framebuffer(Some(framebuffer())).unwrap();
        device.request_buffers(3, MemoryType::Mmap).unwrap();
        device.stream_on().unwrap();

        hw.fail_on("start_pipeline");
        let err = device.enqueue(0, None).unwrap_err();
        assert!(matches!(err, OutputError::HardwareFault(_)));
        assert_eq!(device.status(), StreamStatus::ReadyOn);

        let dump = device.dump_context();
        assert_eq!(dump.states[0], BufferState::Idle);
        assert_eq!(dump.active, None);
        assert!(dump.violations().is_empty());

        hw.clear_failures();
        device.enqueue(0, None).unwrap();
        assert_eq!(device.status(), StreamStatus::StreamOn);
    }

    #[test]
    fn test_dma_completion_cycle() {
        let (device, hw, _) = device();
        configure(&device);
        device.set_framebuffer(Some(framebuffer())).unwrap();
        device.request_buffers(3, MemoryType::Mmap).unwrap();
        device.stream_on().unwrap();

        device.enqueue(0, None).unwrap();
        device.enqueue(1, None).unwrap();
        assert_eq!(hw.count("start_pipeline"), 1);
        assert_eq!(hw.last_address(Direction::Output, Plane::Y), Some(0x5800_0000));

        device.complete_frame().unwrap();
        assert_eq!(device.status(), StreamStatus::StreamOn);
        assert_eq!(hw.count("start_pipeline"), 2);

        device.complete_frame().unwrap();
        assert_eq!(device.status(), StreamStatus::StreamOnIdle);

        assert_eq!(device.dequeue().unwrap(), 0);
        assert_eq!(device.dequeue().unwrap(), 1);
        assert!(device.dump_context().violations().is_empty());

        // Idle hardware restarts on the next enqueue
        device.enqueue(2, None).unwrap();
        assert_eq!(device.status(), StreamStatus::StreamOn);
        assert_eq!(hw.count("start_pipeline"), 3);
    }

    #[test]
    fn test_fifo_swap_releases_after_one_frame() {
        let (device, hw, display) = device();
        configure(&device);
        device.request_buffers(3, MemoryType::Mmap).unwrap();
        device.stream_on().unwrap();

        device.enqueue(0, None).unwrap();
        assert_eq!(device.status(), StreamStatus::StreamOn);
        assert!(display.is_open(0));
        assert!(hw.is_running());

        device.enqueue(1, None).unwrap();
        device.complete_frame().unwrap();
        let dump = device.dump_context();
        assert_eq!((dump.active, dump.next), (Some(0), Some(1)));

        device.complete_frame().unwrap();
        let dump = device.dump_context();
        assert_eq!((dump.prev, dump.active, dump.next), (Some(0), Some(1), None));
        assert!(dump.violations().is_empty());

        device.enqueue(2, None).unwrap();
        device.complete_frame().unwrap();
        device.complete_frame().unwrap();
        assert_eq!(device.dequeue().unwrap(), 0);
        assert!(device.dump_context().violations().is_empty());

        device.stream_off().unwrap();
        assert!(!display.is_open(0));
        assert!(!hw.is_running());
    }

    #[test]
    fn test_complete_active_clears_tracking() {
        let (device, _, _) = device();
        configure(&device);
        device.set_framebuffer(Some(framebuffer())).unwrap();
        device.request_buffers(3, MemoryType::Mmap).unwrap();
        device.stream_on().unwrap();
        device.enqueue(0, None).unwrap();

        device.complete_active(0).unwrap();
        let dump = device.dump_context();
        assert_eq!(dump.active, None);
        assert_eq!(dump.states[0], BufferState::Done);

        // Not hardware-owned any more
        assert!(matches!(device.complete_active(0), Err(OutputError::InvalidState(_))));
    }

    #[test]
    fn test_violations_detect_mismatch() {
        let dump = ContextDump {
            status: StreamStatus::StreamOnIdle,
            incoming: vec![Some(0), None],
            outgoing: vec![Some(0), None],
            prev: None,
            active: Some(1),
            next: None,
            states: vec![BufferState::Queued, BufferState::Idle],
        };

        let issues = dump.violations();
        assert_eq!(issues.len(), 3);
    }
}
