//! Camera receiver: capture device to frame snapshots.
//!
//! One background thread (`camera-rx`) reads frames from the selected
//! device and publishes each into the frame [`SnapshotStore`]:
//!
//! | Condition          | Action                        |
//! |--------------------|-------------------------------|
//! | No device selected | sleep 50 ms                   |
//! | Read failed        | sleep 10 ms, keep the device  |
//! | Frame read         | publish, continue immediately |
//!
//! Device selection happens on the caller's thread. The loop takes the
//! device out of its slot for the duration of a read, so a stalled device
//! never blocks selection or stats. Every selection bumps a generation; a
//! frame is published only if the generation it was read under is still
//! current, and the check and publish share the slot lock. After
//! `select_device` returns no frame from the previous device can reach the
//! store.

pub mod device;
pub mod test_pattern;

pub use device::{CaptureBackend, CaptureDevice, ResolutionHint};
pub use test_pattern::TestPatternBackend;

use crate::config::CameraConfig;
use crate::core::SnapshotStore;
use crate::core::types::CameraFrame;
use crate::error::{Error, LoopStep, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Sleep while no device is selected
const NO_DEVICE_DELAY: Duration = Duration::from_millis(50);

/// Sleep after a failed frame read
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// `device_index` value while nothing is selected
const NO_DEVICE: u64 = u64::MAX;

/// Create the capture backend named in configuration
pub fn create_backend(config: &CameraConfig) -> Result<Box<dyn CaptureBackend>> {
    match config.backend.as_str() {
        "test_pattern" => Ok(Box::new(TestPatternBackend::new(
            config.available_devices.clone(),
            config.fps,
        ))),
        _ => Err(Error::UnknownBackend(config.backend.clone())),
    }
}

/// Camera receiver counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub read_failures: u64,
    pub device_index: Option<u32>,
}

/// Selected device; `None` while nothing is selected or a read is in flight
#[derive(Default)]
struct DeviceSlot {
    device: Option<Box<dyn CaptureDevice>>,
    generation: u64,
}

struct Shared {
    backend: Box<dyn CaptureBackend>,
    hint: ResolutionHint,
    slot: Mutex<DeviceSlot>,
    device_index: AtomicU64,
    store: Arc<SnapshotStore<CameraFrame>>,
    frames_captured: AtomicU64,
    read_failures: AtomicU64,
}

impl Shared {
    /// One loop iteration
    fn step(&self) -> LoopStep {
        let (mut device, generation) = {
            let mut slot = self.slot.lock();
            match slot.device.take() {
                Some(device) => (device, slot.generation),
                None => return LoopStep::Idle(NO_DEVICE_DELAY),
            }
        };

        let result = device.read_frame();

        let mut slot = self.slot.lock();
        if slot.generation != generation {
            drop(slot);
            log::debug!("Camera device {} released during read", device.index());
            return LoopStep::Ok;
        }

        let step = match result {
            Ok(image) => {
                self.store.publish(CameraFrame::new(image));
                self.frames_captured.fetch_add(1, Ordering::Relaxed);
                LoopStep::Ok
            }
            Err(error) => {
                self.read_failures.fetch_add(1, Ordering::Relaxed);
                LoopStep::Transient {
                    error,
                    backoff: READ_RETRY_DELAY,
                }
            }
        };
        slot.device = Some(device);
        step
    }
}

/// Handle to the background camera receiver thread.
pub struct CameraReceiver {
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CameraReceiver {
    /// Start the `camera-rx` thread with no device selected.
    pub fn spawn(
        backend: Box<dyn CaptureBackend>,
        hint: ResolutionHint,
        store: Arc<SnapshotStore<CameraFrame>>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            backend,
            hint,
            slot: Mutex::new(DeviceSlot::default()),
            device_index: AtomicU64::new(NO_DEVICE),
            store,
            frames_captured: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
        });

        let thread_shared = Arc::clone(&shared);
        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("camera-rx".to_string())
            .spawn(move || run_loop(thread_shared, thread_running))
            .map_err(|_| Error::ThreadSpawn("camera-rx"))?;

        log::info!(
            "Camera receiver started (backend: {})",
            shared.backend.name()
        );
        Ok(Self {
            shared,
            running,
            handle: Some(handle),
        })
    }

    /// Switch to capture device `index`.
    ///
    /// The current device is released and the frame store cleared before
    /// the new device is opened. On failure no device remains selected and
    /// the store stays empty; there is no fallback to another index. A read
    /// still in flight on the previous device is discarded when it returns.
    pub fn select_device(&self, index: u32) -> Result<()> {
        let mut slot = self.shared.slot.lock();
        slot.generation += 1;
        if let Some(previous) = slot.device.take() {
            log::info!("Releasing camera device {}", previous.index());
        }
        self.shared.device_index.store(NO_DEVICE, Ordering::Relaxed);
        self.shared.store.clear();

        match self.shared.backend.open(index, self.shared.hint) {
            Ok(opened) => {
                log::info!(
                    "Camera device {} opened ({}x{} requested)",
                    index,
                    self.shared.hint.width,
                    self.shared.hint.height
                );
                slot.device = Some(opened);
                self.shared
                    .device_index
                    .store(u64::from(index), Ordering::Relaxed);
                Ok(())
            }
            Err(Error::DeviceOpen { index, reason }) => {
                log::warn!("Camera device {} unavailable: {}", index, reason);
                Err(Error::DeviceOpen { index, reason })
            }
            Err(other) => {
                log::warn!("Camera device {} unavailable: {}", index, other);
                Err(Error::DeviceOpen {
                    index,
                    reason: other.to_string(),
                })
            }
        }
    }

    /// Copy of the most recent frame, or `None` if none since selection
    pub fn latest_frame(&self) -> Option<CameraFrame> {
        self.shared.store.latest_cloned()
    }

    /// Currently selected device
    pub fn device_index(&self) -> Option<u32> {
        match self.shared.device_index.load(Ordering::Relaxed) {
            NO_DEVICE => None,
            index => u32::try_from(index).ok(),
        }
    }

    pub fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.shared.frames_captured.load(Ordering::Relaxed),
            read_failures: self.shared.read_failures.load(Ordering::Relaxed),
            device_index: self.device_index(),
        }
    }

    /// Stop the loop at its next iteration boundary and wait for it
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Camera receiver thread panicked");
            }
        }
    }
}

impl Drop for CameraReceiver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(shared: Arc<Shared>, running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        match shared.step() {
            LoopStep::Ok => {}
            LoopStep::Idle(delay) => thread::sleep(delay),
            LoopStep::Transient { error, backoff } => {
                log::trace!("Camera read failed: {}", error);
                thread::sleep(backoff);
            }
            // Reads never tear down the device; treat like a transient miss
            LoopStep::Fatal(error) => {
                log::warn!("Camera error: {}", error);
                thread::sleep(READ_RETRY_DELAY);
            }
        }
    }
    shared.slot.lock().device = None;
    shared.device_index.store(NO_DEVICE, Ordering::Relaxed);
    log::info!("Camera receiver thread exiting");
}
