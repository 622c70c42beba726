//! End-to-end streaming scenarios against the recording hardware doubles

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use fimc_hw::mock::{FifoCall, RecordingDisplay, RecordingHardware};
use fimc_hw::{Direction, PixelFormat, Plane, Rect, ScalerCaps, Size};
use fimc_output::{
    scaler, spawn_completion_handler, BufferFlag, DeviceConfig, Framebuffer, IndexQueue, IrqEvent,
    MemoryType, OutputDevice, OutputError, PixFormat, StreamStatus,
};

const PANEL: Size = Size::new(480, 800);

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

fn device() -> (OutputDevice, RecordingHardware, RecordingDisplay) {
    device_with_pool(3)
}

fn device_with_pool(buffer_count: usize) -> (OutputDevice, RecordingHardware, RecordingDisplay) {
    init_tracing();
    let hw = RecordingHardware::new();
    let display = RecordingDisplay::new(PANEL);
    let config = DeviceConfig::builder()
        .buffer_count(buffer_count)
        .dequeue_timeout(Duration::from_millis(100))
        .stop_timeout(Duration::from_millis(50))
        .build();
    let device = OutputDevice::new(config, hw.clone(), display.clone()).unwrap();
    (device, hw, display)
}

fn configure(device: &OutputDevice, framebuffer: bool) {
    let mut pix = PixFormat::new(PixelFormat::NV12, 640, 480);
    device.set_format(&mut pix).unwrap();
    device.set_crop(Rect::new(0, 0, 640, 480)).unwrap();
    device.set_window(Rect::new(0, 0, 320, 240)).unwrap();
    if framebuffer {
        device
            .set_framebuffer(Some(Framebuffer {
                base: 0x5800_0000,
                size: Size::new(800, 480),
                format: PixelFormat::RGB565,
            }))
            .unwrap();
    }
}

#[test]
fn test_queue_returns_oldest_first() {
    let mut queue = IndexQueue::new(3);
    queue.push_front(2).unwrap();
    queue.push_front(0).unwrap();
    queue.push_front(1).unwrap();

    assert!(queue.push_front(1).is_err());
    assert_eq!(queue.pop_tail(), Some(2));
    assert_eq!(queue.pop_tail(), Some(0));
    assert_eq!(queue.pop_tail(), Some(1));
    assert_eq!(queue.pop_tail(), None);
}

#[test]
fn test_format_round_trip() {
    let (device, _, _) = device();

    let mut pix = PixFormat::new(PixelFormat::NV12, 640, 480);
    device.set_format(&mut pix).unwrap();
    assert_eq!(pix.bytes_per_line, 960);

    let stored = device.format().unwrap();
    assert_eq!(stored.pixel_format(), Some(PixelFormat::NV12));
    assert_eq!(stored.bytes_per_line, 960);
    assert_eq!(stored.size_image, 960 * 480);
}

#[test]
fn test_scaler_halves_width() {
    let params = scaler::compute(Size::new(640, 480), Size::new(320, 480), ScalerCaps::default()).unwrap();
    assert_eq!((params.pre_hratio, params.hfactor, params.main_hratio), (2, 1, 256));
}

#[test]
fn test_dma_status_transitions() {
    let (device, hw, _) = device();

    assert_eq!(device.request_buffers(3, MemoryType::Mmap).unwrap(), 3);
    assert!(matches!(device.stream_on(), Err(OutputError::Busy(_))));
    assert_eq!(device.status(), StreamStatus::StreamOff);
    assert!(hw.calls().is_empty());

    configure(&device, true);
    device.request_buffers(0, MemoryType::Mmap).unwrap();
    device.request_buffers(3, MemoryType::Mmap).unwrap();

    device.stream_on().unwrap();
    assert_eq!(device.status(), StreamStatus::ReadyOn);
    let scaler = hw.last_scaler().unwrap();
    assert_eq!((scaler.pre_hratio, scaler.pre_vratio), (2, 2));

    device.enqueue(0, None).unwrap();
    assert_eq!(device.status(), StreamStatus::StreamOn);
    assert!(hw.is_running());

    device.stream_off().unwrap();
    assert_eq!(device.status(), StreamStatus::StreamOff);
    assert!(!hw.is_running());

    let info = device.query_buffer(0).unwrap();
    assert!(info.flags.contains(BufferFlag::Mapped));
    assert!(!info.flags.contains(BufferFlag::Queued));
    assert!(device.dump_context().violations().is_empty());
}

#[test]
fn test_fifo_order_across_pool_sizes() {
    for count in 3..=6 {
        let (device, _, _) = device_with_pool(count);
        configure(&device, true);
        assert_eq!(device.request_buffers(count, MemoryType::Mmap).unwrap(), count);
        device.stream_on().unwrap();

        let order: Vec<usize> = (0..count).rev().collect();
        for round in 0..2 {
            for &index in &order {
                device.enqueue(index, None).unwrap();
                assert!(device.dump_context().violations().is_empty());
            }
            for _ in 0..count {
                device.complete_frame().unwrap();
                assert!(device.dump_context().violations().is_empty());
            }
            assert_eq!(device.status(), StreamStatus::StreamOnIdle);

            let freed: Vec<usize> = (0..count).map(|_| device.dequeue().unwrap()).collect();
            assert_eq!(freed, order, "pool of {} buffers, round {}", count, round);
            assert!(device.dump_context().violations().is_empty());
        }

        device.stream_off().unwrap();
        assert!(device.dump_context().violations().is_empty());
    }
}

#[test]
fn test_commit_fault_keeps_stream_off() {
    let (device, hw, _) = device();
    configure(&device, true);
    device.request_buffers(3, MemoryType::Mmap).unwrap();

    hw.fail_on("set_rotation_flip");
    assert!(matches!(device.stream_on(), Err(OutputError::HardwareFault(_))));
    assert_eq!(device.status(), StreamStatus::StreamOff);
    device.enqueue(0, None).unwrap();
    assert!(!hw.is_running());
}

#[test]
fn test_failed_request_leaves_queued_buffer() {
    let (device, _, _) = device();
    let mut pix = PixFormat::new(PixelFormat::RGB32, 64, 64);
    device.set_format(&mut pix).unwrap();
    device.request_buffers(3, MemoryType::Mmap).unwrap();
    device.enqueue(0, None).unwrap();

    let mut pix = PixFormat::new(PixelFormat::RGB32, 4096, 4096);
    device.set_format(&mut pix).unwrap();
    assert!(matches!(
        device.request_buffers(0, MemoryType::Mmap),
        Err(OutputError::InsufficientMemory { .. })
    ));

    let dump = device.dump_context();
    assert_eq!(dump.incoming, vec![Some(0), None, None]);
    assert!(dump.violations().is_empty());
}

#[test]
fn test_large_rgb32_format() {
    let (device, _, _) = device();

    let mut pix = PixFormat::new(PixelFormat::RGB32, 65536, 65536);
    device.set_format(&mut pix).unwrap();
    assert_eq!(pix.bytes_per_line, 262_144);
    assert_eq!(pix.size_image, 262_144_u64 * 65_536);
}

#[test]
fn test_rejected_crop_keeps_previous() {
    let (device, _, _) = device();

    device.set_crop(Rect::new(0, 0, 640, 480)).unwrap();
    let err = device.set_crop(Rect::new(1800, 0, 200, 100)).unwrap_err();

    assert!(matches!(err, OutputError::OutOfBounds(_)));
    assert_eq!(device.crop(), Some(Rect::new(0, 0, 640, 480)));
}

#[test]
fn test_rejected_stream_on_writes_nothing() {
    let (device, hw, _) = device();
    configure(&device, true);
    device.set_window(Rect::new(700, 0, 320, 240)).unwrap();

    assert!(matches!(device.stream_on(), Err(OutputError::OutOfBounds(_))));
    assert_eq!(device.status(), StreamStatus::StreamOff);
    assert!(hw.calls().is_empty());
}

#[test]
fn test_dequeue_timeout() {
    let (device, _, _) = device();
    configure(&device, true);
    device.request_buffers(2, MemoryType::Mmap).unwrap();

    let err = device.dequeue().unwrap_err();
    assert!(matches!(err, OutputError::Timeout(_)));
    assert!(err.is_retryable());
}

#[test]
fn test_dequeue_interrupted() {
    let (device, _, _) = device();
    let device = Arc::new(device);

    let waker = {
        let device = Arc::clone(&device);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            device.interrupt_dequeue();
        })
    };

    let err = device.dequeue_timeout(Duration::from_secs(5)).unwrap_err();
    assert_eq!(err, OutputError::Interrupted);
    waker.join().unwrap();

    // The flag was consumed by the wait
    assert!(matches!(
        device.dequeue_timeout(Duration::from_millis(10)),
        Err(OutputError::Timeout(_))
    ));
}

#[test]
fn test_user_pointer_addresses() {
    let (device, hw, _) = device();
    configure(&device, true);
    device.request_buffers(2, MemoryType::UserPtr).unwrap();
    device.stream_on().unwrap();

    device.enqueue(1, Some([0x6000_0000, 0x6004_B000, 0])).unwrap();

    assert_eq!(hw.last_address(Direction::Input, Plane::Y), Some(0x6000_0000));
    assert_eq!(hw.last_address(Direction::Input, Plane::Cb), Some(0x6004_B000));
    assert_eq!(hw.last_address(Direction::Output, Plane::Y), Some(0x5800_0000));
}

#[test]
fn test_fifo_sink_scans_out_to_window() {
    let (device, hw, display) = device();
    configure(&device, false);
    device.request_buffers(3, MemoryType::Mmap).unwrap();
    device.stream_on().unwrap();

    device.enqueue(0, None).unwrap();
    device.enqueue(1, None).unwrap();
    device.enqueue(2, None).unwrap();
    assert!(display.calls().contains(&FifoCall::OpenFifo(0)));
    assert_eq!((display.window_info(0).xres, display.window_info(0).yres), (320, 240));
    assert!(hw.is_running());

    // Programs 1, swaps to 1 and programs 2, swaps to 2 releasing 0
    device.complete_frame().unwrap();
    device.complete_frame().unwrap();
    assert!(matches!(
        device.dequeue_timeout(Duration::from_millis(10)),
        Err(OutputError::Timeout(_))
    ));
    device.complete_frame().unwrap();
    assert_eq!(device.dequeue().unwrap(), 0);

    // Last buffer stays on screen with nothing queued
    device.complete_frame().unwrap();
    assert_eq!(device.status(), StreamStatus::StreamOn);
    let dump = device.dump_context();
    assert_eq!((dump.prev, dump.active, dump.next), (Some(1), Some(2), None));

    device.stream_off().unwrap();
    assert!(display
        .calls()
        .contains(&FifoCall::CloseFifo { window: 0, blocking: true }));
    assert!(!hw.is_running());
    assert!(device.dump_context().violations().is_empty());
}

#[test]
fn test_concurrent_completion() {
    let (device, _, _) = device();
    configure(&device, true);
    device.request_buffers(3, MemoryType::Mmap).unwrap();
    device.stream_on().unwrap();

    let device = Arc::new(device);
    let done = Arc::new(AtomicBool::new(false));

    let completer = {
        let device = Arc::clone(&device);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut frames = 0;
            while !done.load(Ordering::Acquire) {
                device.complete_frame().unwrap();
                frames += 1;
                thread::sleep(Duration::from_millis(1));
            }
            frames
        })
    };

    for index in 0..3 {
        device.enqueue(index, None).unwrap();
    }
    for _ in 0..30 {
        let index = device.dequeue_timeout(Duration::from_secs(2)).unwrap();
        device.enqueue(index, None).unwrap();
        assert!(device.dump_context().violations().is_empty());
    }

    device.stream_off().unwrap();
    done.store(true, Ordering::Release);
    assert!(completer.join().unwrap() >= 30);

    let dump = device.dump_context();
    assert_eq!(dump.status, StreamStatus::StreamOff);
    assert!(dump.violations().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completion_handler_drives_stream() {
    let (device, _, _) = device();
    configure(&device, true);
    device.request_buffers(3, MemoryType::Mmap).unwrap();
    device.stream_on().unwrap();

    let device = Arc::new(device);
    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let handler = spawn_completion_handler(Arc::clone(&device), rx);

    for index in 0..3 {
        device.enqueue(index, None).unwrap();
    }
    for _ in 0..3 {
        tx.send(IrqEvent::FrameDone).await.unwrap();
    }
    tx.send(IrqEvent::Shutdown).await.unwrap();
    assert_eq!(handler.await.unwrap(), 3);

    let device_ref = Arc::clone(&device);
    let freed = tokio::task::spawn_blocking(move || {
        (0..3)
            .map(|_| device_ref.dequeue())
            .collect::<Result<Vec<_>, _>>()
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(freed, vec![0, 1, 2]);
    assert_eq!(device.status(), StreamStatus::StreamOnIdle);
}
