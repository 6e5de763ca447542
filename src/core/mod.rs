//! Core types and shared-state primitives

pub mod snapshot;
pub mod types;

pub use snapshot::SnapshotStore;
pub use types::{
    CameraFrame, ColorMode, Extrinsics, Intrinsics, OverlayOptions, PointCloud, RangeImage,
};

/// Current wall-clock time in microseconds since the Unix epoch
#[inline]
pub fn timestamp_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
