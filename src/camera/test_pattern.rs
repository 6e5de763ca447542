//! Synthetic capture backend
//!
//! Produces a horizontally scrolling color gradient with a device marker
//! block in the top-left corner, paced to the configured frame rate.
//! Used when no real camera is available and in tests.

use super::device::{CaptureBackend, CaptureDevice, ResolutionHint};
use crate::error::{Error, Result};
use image::{Rgb, RgbImage};
use std::thread;
use std::time::{Duration, Instant};

/// Pixels the gradient scrolls per frame
const SCROLL_PER_FRAME: u32 = 4;

/// Side length of the device marker block
const MARKER_SIZE: u32 = 16;

/// Backend exposing a fixed set of synthetic devices.
#[derive(Debug, Clone)]
pub struct TestPatternBackend {
    available: Vec<u32>,
    fps: u32,
}

impl TestPatternBackend {
    /// Create a backend where only `available` indices can be opened
    pub fn new(available: Vec<u32>, fps: u32) -> Self {
        Self {
            available,
            fps: fps.max(1),
        }
    }

    pub fn available(&self) -> &[u32] {
        &self.available
    }
}

impl Default for TestPatternBackend {
    fn default() -> Self {
        Self::new(vec![0], 30)
    }
}

impl CaptureBackend for TestPatternBackend {
    fn name(&self) -> &str {
        "test_pattern"
    }

    fn open(&self, index: u32, hint: ResolutionHint) -> Result<Box<dyn CaptureDevice>> {
        if !self.available.contains(&index) {
            return Err(Error::DeviceOpen {
                index,
                reason: "no such device".to_string(),
            });
        }
        if hint.width == 0 || hint.height == 0 {
            return Err(Error::DeviceOpen {
                index,
                reason: format!("unsupported resolution {}x{}", hint.width, hint.height),
            });
        }
        log::debug!(
            "Test pattern device {} opened at {}x{} @ {} fps",
            index,
            hint.width,
            hint.height,
            self.fps
        );
        Ok(Box::new(TestPatternDevice::new(index, hint, self.fps)))
    }
}

/// One synthetic device
#[derive(Debug)]
pub struct TestPatternDevice {
    index: u32,
    width: u32,
    height: u32,
    frame_interval: Duration,
    next_frame_at: Instant,
    frame_count: u32,
}

impl TestPatternDevice {
    fn new(index: u32, hint: ResolutionHint, fps: u32) -> Self {
        Self {
            index,
            width: hint.width,
            height: hint.height,
            frame_interval: Duration::from_secs(1) / fps.max(1),
            next_frame_at: Instant::now(),
            frame_count: 0,
        }
    }

    fn render(&self) -> RgbImage {
        let offset = self.frame_count.wrapping_mul(SCROLL_PER_FRAME);
        let width = self.width;
        let height = self.height;
        let marker = marker_color(self.index);

        RgbImage::from_fn(width, height, |x, y| {
            if x < MARKER_SIZE && y < MARKER_SIZE {
                return marker;
            }
            let u = ((x.wrapping_add(offset)) % width) * 255 / width.max(1);
            let v = y * 255 / height.max(1);
            Rgb([u as u8, v as u8, (255 - u) as u8])
        })
    }
}

impl CaptureDevice for TestPatternDevice {
    fn index(&self) -> u32 {
        self.index
    }

    fn read_frame(&mut self) -> Result<RgbImage> {
        let now = Instant::now();
        if self.next_frame_at > now {
            thread::sleep(self.next_frame_at - now);
        }
        self.next_frame_at = Instant::now().max(self.next_frame_at) + self.frame_interval;

        let frame = self.render();
        self.frame_count = self.frame_count.wrapping_add(1);
        Ok(frame)
    }
}

/// Distinct marker color per device index
fn marker_color(index: u32) -> Rgb<u8> {
    const PALETTE: [[u8; 3]; 4] = [
        [255, 255, 255],
        [255, 0, 255],
        [0, 255, 0],
        [255, 128, 0],
    ];
    Rgb(PALETTE[index as usize % PALETTE.len()])
}
