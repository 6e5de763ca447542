//! Range image to sonar-frame point cloud conversion.
//!
//! Grid cell `(col, row)` maps to angles across the field of view:
//!
//! ```text
//! yaw   = col / max(W-1, 1) * fovH - fovH/2     (degrees, + toward +y)
//! pitch = row / max(H-1, 1) * fovV - fovV/2     (degrees, + below horizontal)
//! range = sample * pixel_scale                  (meters)
//!
//! x =  range * cos(pitch) * cos(yaw)
//! y =  range * cos(pitch) * sin(yaw)
//! z = -range * sin(pitch)
//! ```
//!
//! Cells with `range <= 0` carry no return and are skipped, so the output
//! length is the number of valid cells. Points and depths stay index-aligned.

use crate::core::types::{PointCloud, RangeImage};
use nalgebra::Point3;

/// Convert a range image to a point cloud.
///
/// Returns `None` when the image holds fewer than `width * height` samples
/// or has an empty grid; callers keep their previous snapshot in that case.
pub fn build(image: &RangeImage) -> Option<PointCloud> {
    let width = image.width as usize;
    let height = image.height as usize;
    let cells = image.cell_count();
    if cells == 0 {
        return None;
    }
    if !image.is_complete() {
        log::trace!(
            "Range image {}x{} has only {} samples, skipping",
            width,
            height,
            image.samples.len()
        );
        return None;
    }

    let fov_h = image.fov_horizontal_deg;
    let fov_v = image.fov_vertical_deg;
    let col_denom = (width.saturating_sub(1)).max(1) as f32;
    let row_denom = (height.saturating_sub(1)).max(1) as f32;

    // Per-column and per-row trig is shared by the whole grid
    let yaw_trig: Vec<(f32, f32)> = (0..width)
        .map(|c| {
            let yaw = (c as f32 / col_denom * fov_h - fov_h / 2.0).to_radians();
            yaw.sin_cos()
        })
        .collect();
    let pitch_trig: Vec<(f32, f32)> = (0..height)
        .map(|r| {
            let pitch = (r as f32 / row_denom * fov_v - fov_v / 2.0).to_radians();
            pitch.sin_cos()
        })
        .collect();

    let valid = image.samples[..cells].iter().filter(|&&s| s > 0).count();
    let mut cloud = PointCloud::with_capacity(valid);

    for (row, &(sin_pitch, cos_pitch)) in pitch_trig.iter().enumerate() {
        let row_samples = &image.samples[row * width..(row + 1) * width];
        for (&sample, &(sin_yaw, cos_yaw)) in row_samples.iter().zip(&yaw_trig) {
            let range = sample as f32 * image.pixel_scale;
            if range <= 0.0 {
                continue;
            }
            let point = Point3::new(
                range * cos_pitch * cos_yaw,
                range * cos_pitch * sin_yaw,
                -range * sin_pitch,
            );
            cloud.push(point, range);
        }
    }

    Some(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn image(width: u32, height: u32, fov_h: f32, fov_v: f32, samples: Vec<u16>) -> RangeImage {
        RangeImage {
            width,
            height,
            fov_horizontal_deg: fov_h,
            fov_vertical_deg: fov_v,
            pixel_scale: 0.01,
            samples,
        }
    }

    #[test]
    fn test_two_pixel_single_return() {
        let cloud = build(&image(2, 1, 10.0, 0.0, vec![100, 0])).unwrap();
        assert_eq!(cloud.len(), 1);
        assert_eq!(cloud.depths().len(), 1);

        let p = cloud.points()[0];
        let yaw = (-5.0f32).to_radians();
        assert_relative_eq!(cloud.depths()[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.x, yaw.cos(), epsilon = 1e-6);
        assert_relative_eq!(p.y, yaw.sin(), epsilon = 1e-6);
        assert!(p.y < 0.0);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_too_few_samples() {
        assert!(build(&image(3, 2, 90.0, 20.0, vec![1; 5])).is_none());
    }

    #[test]
    fn test_empty_grid() {
        assert!(build(&image(0, 4, 90.0, 20.0, vec![1; 4])).is_none());
    }

    #[test]
    fn test_extra_samples_ignored() {
        let cloud = build(&image(2, 1, 10.0, 0.0, vec![100, 100, 500, 500])).unwrap();
        assert_eq!(cloud.len(), 2);
    }

    #[test]
    fn test_depth_is_sample_times_scale() {
        let samples: Vec<u16> = (0..12).map(|i| i * 37).collect();
        let img = image(4, 3, 90.0, 20.0, samples.clone());
        let cloud = build(&img).unwrap();

        let expected: Vec<f32> = samples
            .iter()
            .filter(|&&s| s > 0)
            .map(|&s| s as f32 * 0.01)
            .collect();
        assert_eq!(cloud.len(), expected.len());
        for (depth, want) in cloud.depths().iter().zip(&expected) {
            assert_relative_eq!(*depth, *want, epsilon = 1e-5);
        }
        for (p, d) in cloud.points().iter().zip(cloud.depths()) {
            assert_relative_eq!(p.coords.norm(), *d, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_positive_pitch_points_down() {
        // Single column, two rows: row 0 at -fovV/2 (up), row 1 at +fovV/2 (down)
        let cloud = build(&image(1, 2, 0.0, 30.0, vec![200, 200])).unwrap();
        assert_eq!(cloud.len(), 2);
        assert!(cloud.points()[0].z > 0.0);
        assert!(cloud.points()[1].z < 0.0);
        assert_relative_eq!(
            cloud.points()[1].z,
            -2.0 * 15.0f32.to_radians().sin(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_single_column_uses_left_edge_yaw() {
        // W=1 divides by max(W-1,1)=1, so the only column sits at -fovH/2
        let cloud = build(&image(1, 1, 60.0, 0.0, vec![100])).unwrap();
        let p = cloud.points()[0];
        assert_relative_eq!(p.y, (-30.0f32).to_radians().sin(), epsilon = 1e-6);
    }
}
