//! Core data types shared by the acquisition loops and the projector.
//!
//! Key types:
//! - [`RangeImage`]: decoded angular range grid from one sonar datagram
//! - [`PointCloud`]: sonar-frame points with index-aligned depths
//! - [`CameraFrame`]: one captured RGB frame and its capture instant
//! - [`Extrinsics`], [`Intrinsics`], [`OverlayOptions`]: projector state

use crate::error::{Error, Result};
use image::RgbImage;
use nalgebra::{Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

// ============================================================================
// Sonar data
// ============================================================================

/// Angular grid (yaw × pitch) of range samples from one sonar sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeImage {
    /// Columns (yaw direction)
    pub width: u32,
    /// Rows (pitch direction)
    pub height: u32,
    /// Horizontal field of view in degrees
    pub fov_horizontal_deg: f32,
    /// Vertical field of view in degrees
    pub fov_vertical_deg: f32,
    /// Meters per range sample unit
    pub pixel_scale: f32,
    /// Row-major range samples; at least `width * height` for a usable image
    pub samples: Vec<u16>,
}

impl RangeImage {
    /// Number of grid cells (`width * height`)
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether enough samples are present to convert the full grid
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.samples.len() >= self.cell_count()
    }
}

/// Sonar-frame point cloud with per-point range.
///
/// `points[i]` and `depths[i]` always describe the same return; the
/// constructor rejects mismatched lengths so a published snapshot can
/// never be observed half-paired.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<Point3<f32>>,
    depths: Vec<f32>,
}

impl PointCloud {
    /// Build from parallel arrays.
    pub fn from_parts(points: Vec<Point3<f32>>, depths: Vec<f32>) -> Result<Self> {
        if points.len() != depths.len() {
            return Err(Error::InvalidParameter(format!(
                "point cloud arrays differ in length: {} points, {} depths",
                points.len(),
                depths.len()
            )));
        }
        Ok(Self { points, depths })
    }

    /// Create with room for `capacity` returns
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            depths: Vec::with_capacity(capacity),
        }
    }

    /// Append one return (keeps both arrays aligned)
    #[inline]
    pub(crate) fn push(&mut self, point: Point3<f32>, depth: f32) {
        self.points.push(point);
        self.depths.push(depth);
    }

    pub fn points(&self) -> &[Point3<f32>] {
        &self.points
    }

    pub fn depths(&self) -> &[f32] {
        &self.depths
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ============================================================================
// Camera data
// ============================================================================

/// A captured 3-channel frame.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub image: RgbImage,
    pub captured_at: SystemTime,
}

impl CameraFrame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: SystemTime::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

// ============================================================================
// Projector parameters
// ============================================================================

/// Rigid transform from sonar frame to camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Extrinsics {
    /// Rotation vector (axis × angle, radians)
    #[serde(default)]
    pub rvec: [f64; 3],
    /// Translation in meters
    #[serde(default)]
    pub tvec: [f64; 3],
}

impl Extrinsics {
    pub fn new(rvec: [f64; 3], tvec: [f64; 3]) -> Self {
        Self { rvec, tvec }
    }

    /// Rotation matrix via the axis-angle exponential map
    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::new(Vector3::from(self.rvec))
    }

    pub fn translation(&self) -> Vector3<f64> {
        Vector3::from(self.tvec)
    }
}

/// Minimum distortion coefficients (k1, k2, p1, p2, k3)
pub const MIN_DISTORTION_COEFFS: usize = 5;
/// Maximum distortion coefficients (adds rational k4, k5, k6)
pub const MAX_DISTORTION_COEFFS: usize = 8;

/// Camera matrix, lens distortion and the image size they were solved for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    /// Row-major 3×3 camera matrix
    pub camera_matrix: [[f64; 3]; 3],
    /// k1, k2, p1, p2, k3[, k4, k5, k6]
    pub distortion: Vec<f64>,
    /// (width, height) in pixels
    pub image_size: (u32, u32),
}

impl Intrinsics {
    /// Create validated intrinsics.
    pub fn new(
        camera_matrix: [[f64; 3]; 3],
        distortion: Vec<f64>,
        image_size: (u32, u32),
    ) -> Result<Self> {
        let intrinsics = Self {
            camera_matrix,
            distortion,
            image_size,
        };
        intrinsics.validate()?;
        Ok(intrinsics)
    }

    /// Pinhole intrinsics with no distortion
    pub fn pinhole(fx: f64, fy: f64, cx: f64, cy: f64, image_size: (u32, u32)) -> Self {
        Self {
            camera_matrix: [[fx, 0.0, cx], [0.0, fy, cy], [0.0, 0.0, 1.0]],
            distortion: vec![0.0; MIN_DISTORTION_COEFFS],
            image_size,
        }
    }

    /// Check coefficient count and focal lengths
    pub fn validate(&self) -> Result<()> {
        let n = self.distortion.len();
        if !(MIN_DISTORTION_COEFFS..=MAX_DISTORTION_COEFFS).contains(&n) {
            return Err(Error::InvalidParameter(format!(
                "distortion must have {}-{} coefficients, got {}",
                MIN_DISTORTION_COEFFS, MAX_DISTORTION_COEFFS, n
            )));
        }
        if self.fx() == 0.0 || self.fy() == 0.0 {
            return Err(Error::InvalidParameter(
                "focal length must be non-zero".to_string(),
            ));
        }
        if self.distortion.iter().any(|c| !c.is_finite())
            || self.camera_matrix.iter().flatten().any(|c| !c.is_finite())
        {
            return Err(Error::InvalidParameter(
                "intrinsics contain non-finite values".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn fx(&self) -> f64 {
        self.camera_matrix[0][0]
    }

    #[inline]
    pub fn fy(&self) -> f64 {
        self.camera_matrix[1][1]
    }

    #[inline]
    pub fn cx(&self) -> f64 {
        self.camera_matrix[0][2]
    }

    #[inline]
    pub fn cy(&self) -> f64 {
        self.camera_matrix[1][2]
    }

    /// Skew term K[0][1]
    #[inline]
    pub fn skew(&self) -> f64 {
        self.camera_matrix[0][1]
    }
}

/// How overlay points are colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    /// Red (near) → green → blue (far) ramp
    #[default]
    Range,
    /// Grayscale, bright = near
    Intensity,
}

/// Overlay rendering options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayOptions {
    pub enabled: bool,
    /// Disk radius in pixels (1-10)
    pub point_radius: u32,
    /// Draw every Nth point (1-32)
    pub decimate: u32,
    pub color_mode: ColorMode,
    /// Depths are clamped into [depth_min_m, depth_max_m] before coloring
    pub depth_min_m: f32,
    pub depth_max_m: f32,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            point_radius: 2,
            decimate: 4,
            color_mode: ColorMode::Range,
            depth_min_m: -100.0,
            depth_max_m: 100.0,
        }
    }
}

impl OverlayOptions {
    pub fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.point_radius) {
            return Err(Error::InvalidParameter(format!(
                "point_radius must be 1-10, got {}",
                self.point_radius
            )));
        }
        if !(1..=32).contains(&self.decimate) {
            return Err(Error::InvalidParameter(format!(
                "decimate must be 1-32, got {}",
                self.decimate
            )));
        }
        if self.depth_min_m.is_nan()
            || self.depth_max_m.is_nan()
            || self.depth_min_m >= self.depth_max_m
        {
            return Err(Error::InvalidParameter(format!(
                "depth clamp range [{}, {}] is empty",
                self.depth_min_m, self.depth_max_m
            )));
        }
        Ok(())
    }

    /// Render stride, never zero
    #[inline]
    pub fn stride(&self) -> usize {
        self.decimate.max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_cloud_rejects_mismatched_lengths() {
        let points = vec![Point3::new(1.0, 0.0, 0.0); 3];
        let depths = vec![1.0; 2];
        assert!(PointCloud::from_parts(points, depths).is_err());
    }

    #[test]
    fn test_point_cloud_push_keeps_alignment() {
        let mut cloud = PointCloud::with_capacity(2);
        cloud.push(Point3::new(1.0, 2.0, 3.0), 4.0);
        cloud.push(Point3::new(5.0, 6.0, 7.0), 8.0);
        assert_eq!(cloud.points().len(), cloud.depths().len());
        assert_eq!(cloud.depths()[1], 8.0);
    }

    #[test]
    fn test_range_image_completeness() {
        let mut image = RangeImage {
            width: 4,
            height: 2,
            fov_horizontal_deg: 90.0,
            fov_vertical_deg: 20.0,
            pixel_scale: 0.01,
            samples: vec![0; 7],
        };
        assert!(!image.is_complete());
        image.samples.push(0);
        assert!(image.is_complete());
    }

    #[test]
    fn test_identity_extrinsics() {
        let ext = Extrinsics::default();
        let p = nalgebra::Point3::new(1.0, 2.0, 3.0);
        let q = ext.rotation() * p + ext.translation();
        assert_relative_eq!(q, p);
    }

    #[test]
    fn test_rotation_vector_quarter_turn_about_z() {
        let ext = Extrinsics::new([0.0, 0.0, std::f64::consts::FRAC_PI_2], [0.0; 3]);
        let q = ext.rotation() * Vector3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(q, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_intrinsics_coefficient_count() {
        let k = [[500.0, 0.0, 320.0], [0.0, 500.0, 240.0], [0.0, 0.0, 1.0]];
        assert!(Intrinsics::new(k, vec![0.0; 4], (640, 480)).is_err());
        assert!(Intrinsics::new(k, vec![0.0; 5], (640, 480)).is_ok());
        assert!(Intrinsics::new(k, vec![0.0; 8], (640, 480)).is_ok());
        assert!(Intrinsics::new(k, vec![0.0; 9], (640, 480)).is_err());
    }

    #[test]
    fn test_overlay_options_bounds() {
        assert!(OverlayOptions::default().validate().is_ok());
        let opts = OverlayOptions {
            decimate: 0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
        let opts = OverlayOptions {
            depth_min_m: 5.0,
            depth_max_m: 5.0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_color_mode_serde_names() {
        let opts: OverlayOptions = toml::from_str("color_mode = \"intensity\"").unwrap();
        assert_eq!(opts.color_mode, ColorMode::Intensity);
        assert_eq!(opts.decimate, 4);
    }
}
