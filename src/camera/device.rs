//! Capture device abstraction
//!
//! The receiver loop only talks to these traits. A backend enumerates
//! nothing; it opens a device by index or fails.

use crate::error::Result;
use image::RgbImage;

/// Requested capture resolution. Backends may deliver another size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionHint {
    pub width: u32,
    pub height: u32,
}

impl ResolutionHint {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// An open capture device.
///
/// Dropping the device releases the underlying handle.
pub trait CaptureDevice: Send {
    /// Index this device was opened with
    fn index(&self) -> u32;

    /// Block until the next frame is available
    fn read_frame(&mut self) -> Result<RgbImage>;
}

/// Opens capture devices by index.
pub trait CaptureBackend: Send + Sync {
    /// Backend name as used in configuration
    fn name(&self) -> &str;

    /// Open device `index`, failing with [`crate::Error::DeviceOpen`] if absent
    fn open(&self, index: u32, hint: ResolutionHint) -> Result<Box<dyn CaptureDevice>>;
}
