//! Sonar-to-camera projection and overlay.
//!
//! ```text
//! Xs (sonar) ──R·Xs + t──▶ Xc (camera) ──/z──▶ (x, y) ──distort──▶ (x', y')
//!                                                                 │
//!                               u = fx·x' + s·y' + cx,  v = fy·y' + cy
//! ```
//!
//! `R` comes from the rotation vector through the axis-angle exponential
//! map. Points at or behind the camera plane (`z ≤ 0`) have no image and
//! project to `None`, keeping results index-aligned with their depths.

pub mod distortion;
pub mod overlay;

pub use distortion::RationalDistortion;
pub use overlay::{overlay_color, render_overlay};

use crate::core::types::{Extrinsics, Intrinsics, OverlayOptions};
use crate::error::Result;
use image::RgbImage;
use nalgebra::{Isometry3, Point2, Point3, Translation3, UnitQuaternion, Vector2};

/// Projector state: calibration and overlay settings.
#[derive(Debug, Clone)]
pub struct Projector {
    intrinsics: Option<Intrinsics>,
    distortion: RationalDistortion,
    extrinsics: Extrinsics,
    sonar_to_camera: Isometry3<f64>,
    overlay: OverlayOptions,
}

impl Default for Projector {
    fn default() -> Self {
        Self {
            intrinsics: None,
            distortion: RationalDistortion::default(),
            extrinsics: Extrinsics::default(),
            sonar_to_camera: Isometry3::identity(),
            overlay: OverlayOptions::default(),
        }
    }
}

impl Projector {
    pub fn new(
        intrinsics: Option<Intrinsics>,
        extrinsics: Extrinsics,
        overlay: OverlayOptions,
    ) -> Result<Self> {
        let mut projector = Self::default();
        if let Some(intrinsics) = intrinsics {
            projector.set_intrinsics(intrinsics)?;
        }
        projector.set_extrinsics(extrinsics);
        projector.set_overlay_options(overlay)?;
        Ok(projector)
    }

    /// Install camera intrinsics after validating them
    pub fn set_intrinsics(&mut self, intrinsics: Intrinsics) -> Result<()> {
        intrinsics.validate()?;
        self.distortion = RationalDistortion::from_coeffs(&intrinsics.distortion);
        log::info!(
            "Intrinsics set: fx={:.1} fy={:.1} cx={:.1} cy={:.1}, {} distortion coeffs",
            intrinsics.fx(),
            intrinsics.fy(),
            intrinsics.cx(),
            intrinsics.cy(),
            intrinsics.distortion.len()
        );
        self.intrinsics = Some(intrinsics);
        Ok(())
    }

    pub fn set_extrinsics(&mut self, extrinsics: Extrinsics) {
        let rotation = UnitQuaternion::from_rotation_matrix(&extrinsics.rotation());
        self.sonar_to_camera =
            Isometry3::from_parts(Translation3::from(extrinsics.translation()), rotation);
        self.extrinsics = extrinsics;
        log::debug!(
            "Extrinsics set: rvec={:?} tvec={:?}",
            extrinsics.rvec,
            extrinsics.tvec
        );
    }

    pub fn set_overlay_options(&mut self, overlay: OverlayOptions) -> Result<()> {
        overlay.validate()?;
        self.overlay = overlay;
        Ok(())
    }

    pub fn intrinsics(&self) -> Option<&Intrinsics> {
        self.intrinsics.as_ref()
    }

    pub fn extrinsics(&self) -> Extrinsics {
        self.extrinsics
    }

    pub fn overlay_options(&self) -> OverlayOptions {
        self.overlay
    }

    /// Project sonar-frame points to pixel coordinates.
    ///
    /// Returns `None` when intrinsics are unset.
    pub fn project(&self, points: &[Point3<f32>]) -> Option<Vec<Option<Point2<f64>>>> {
        let intrinsics = self.intrinsics.as_ref()?;
        let (fx, fy) = (intrinsics.fx(), intrinsics.fy());
        let (cx, cy) = (intrinsics.cx(), intrinsics.cy());
        let skew = intrinsics.skew();
        let undistorted = self.distortion.is_identity();

        let projected = points
            .iter()
            .map(|p| {
                let pc = self.sonar_to_camera * p.cast::<f64>();
                if pc.z <= 0.0 {
                    return None;
                }
                let n = Vector2::new(pc.x / pc.z, pc.y / pc.z);
                let d = if undistorted {
                    n
                } else {
                    self.distortion.distort(&n)
                };
                Some(Point2::new(fx * d.x + skew * d.y + cx, fy * d.y + cy))
            })
            .collect();
        Some(projected)
    }

    /// Project `points` and draw them onto `frame`.
    ///
    /// Without intrinsics the frame comes back unmodified.
    pub fn composite(&self, frame: RgbImage, points: &[Point3<f32>], depths: &[f32]) -> RgbImage {
        if !self.overlay.enabled {
            return frame;
        }
        match self.project(points) {
            Some(image_points) => render_overlay(frame, &image_points, depths, &self.overlay),
            None => frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use approx::assert_relative_eq;
    use image::Rgb;
    use std::f64::consts::FRAC_PI_2;

    fn pinhole() -> Intrinsics {
        Intrinsics::pinhole(800.0, 600.0, 320.0, 240.0, (640, 480))
    }

    #[test]
    fn test_project_without_intrinsics() {
        let projector = Projector::default();
        assert!(projector.project(&[Point3::new(0.0, 0.0, 1.0)]).is_none());
    }

    #[test]
    fn test_identity_extrinsics_pinhole() {
        let projector =
            Projector::new(Some(pinhole()), Extrinsics::default(), OverlayOptions::default())
                .unwrap();
        let points = [
            Point3::new(0.0, 0.0, 2.0),
            Point3::new(0.5, -0.25, 2.0),
            Point3::new(-1.0, 1.0, 4.0),
        ];
        let uv = projector.project(&points).unwrap();

        let p0 = uv[0].unwrap();
        assert_relative_eq!(p0.x, 320.0, epsilon = 1e-9);
        assert_relative_eq!(p0.y, 240.0, epsilon = 1e-9);

        let p1 = uv[1].unwrap();
        assert_relative_eq!(p1.x, 800.0 * 0.25 + 320.0, epsilon = 1e-6);
        assert_relative_eq!(p1.y, 600.0 * -0.125 + 240.0, epsilon = 1e-6);

        let p2 = uv[2].unwrap();
        assert_relative_eq!(p2.x, 800.0 * -0.25 + 320.0, epsilon = 1e-6);
        assert_relative_eq!(p2.y, 600.0 * 0.25 + 240.0, epsilon = 1e-6);
    }

    #[test]
    fn test_points_behind_camera_are_none() {
        let projector =
            Projector::new(Some(pinhole()), Extrinsics::default(), OverlayOptions::default())
                .unwrap();
        let uv = projector
            .project(&[
                Point3::new(0.0, 0.0, -1.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ])
            .unwrap();
        assert_eq!(uv.len(), 3);
        assert!(uv[0].is_none());
        assert!(uv[1].is_none());
        assert!(uv[2].is_some());
    }

    #[test]
    fn test_extrinsics_rotate_sonar_forward_into_camera_z() {
        // Sonar x forward; rotating -90° about y maps +x to +z
        let extrinsics = Extrinsics::new([0.0, -FRAC_PI_2, 0.0], [0.0, 0.0, 0.5]);
        let projector =
            Projector::new(Some(pinhole()), extrinsics, OverlayOptions::default()).unwrap();
        let uv = projector.project(&[Point3::new(1.5, 0.0, 0.0)]).unwrap();
        let p = uv[0].unwrap();
        assert_relative_eq!(p.x, 320.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 240.0, epsilon = 1e-6);
    }

    #[test]
    fn test_translation_offsets_pixel() {
        let extrinsics = Extrinsics::new([0.0; 3], [0.1, 0.0, 0.0]);
        let projector =
            Projector::new(Some(pinhole()), extrinsics, OverlayOptions::default()).unwrap();
        let uv = projector.project(&[Point3::new(0.0, 0.0, 1.0)]).unwrap();
        assert_relative_eq!(uv[0].unwrap().x, 320.0 + 80.0, epsilon = 1e-6);
    }

    #[test]
    fn test_distortion_applied() {
        let mut intrinsics = pinhole();
        intrinsics.distortion = vec![0.1, 0.0, 0.0, 0.0, 0.0];
        let projector =
            Projector::new(Some(intrinsics), Extrinsics::default(), OverlayOptions::default())
                .unwrap();
        let uv = projector.project(&[Point3::new(0.5, 0.0, 1.0)]).unwrap();
        assert_relative_eq!(uv[0].unwrap().x, 800.0 * 0.5125 + 320.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rejects_bad_intrinsics() {
        let mut intrinsics = pinhole();
        intrinsics.distortion = vec![0.0; 4];
        let mut projector = Projector::default();
        assert!(matches!(
            projector.set_intrinsics(intrinsics),
            Err(Error::InvalidParameter(_))
        ));
        assert!(projector.intrinsics().is_none());
    }

    #[test]
    fn test_composite_without_intrinsics_is_passthrough() {
        let projector = Projector::default();
        let frame = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        let out = projector.composite(frame.clone(), &[Point3::new(0.0, 0.0, 1.0)], &[1.0]);
        assert_eq!(out, frame);
    }

    #[test]
    fn test_composite_draws_center_point() {
        let intrinsics = Intrinsics::pinhole(10.0, 10.0, 8.0, 8.0, (16, 16));
        let overlay = OverlayOptions {
            point_radius: 1,
            decimate: 1,
            ..Default::default()
        };
        let projector = Projector::new(Some(intrinsics), Extrinsics::default(), overlay).unwrap();
        let out = projector.composite(RgbImage::new(16, 16), &[Point3::new(0.0, 0.0, 3.0)], &[3.0]);
        assert_eq!(*out.get_pixel(8, 8), Rgb([255, 0, 0]));
    }
}
