//! Drishti - sonar and camera fusion
//!
//! Receives RIP2 range images from a multicast sonar, turns them into
//! sonar-frame point clouds, and draws them over live camera frames.
//!
//! ## Modules
//!
//! - [`sonar`]: datagram decoding, point cloud building, multicast receiver
//! - [`camera`]: capture backend seam and camera receiver
//! - [`projection`]: extrinsics, distortion-aware pinhole projection, overlay
//! - [`calibration`]: chessboard view collection for an external solver
//! - [`context`]: process-wide owner of stores, receivers and projector

pub mod calibration;
pub mod camera;
pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod projection;
pub mod sonar;

// Re-export commonly used types
pub use config::AppConfig;
pub use context::FusionContext;
pub use crate::core::{CameraFrame, Extrinsics, Intrinsics, OverlayOptions, PointCloud, RangeImage};
pub use error::{DropReason, Error, Result};
