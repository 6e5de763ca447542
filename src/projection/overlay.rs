//! Overlay rendering of projected sonar points onto a camera frame.
//!
//! ```text
//! depths ─clamp─▶ [min, max] of batch ─▶ t = (d - min) / denom ─▶ color
//!                                         denom = 1 if max - min ≤ 1e-6
//! ```
//!
//! Range ramp (`t` = 0 near, 1 far):
//!
//! | t   | R   | G   | B   |
//! |-----|-----|-----|-----|
//! | 0.0 | 255 | 0   | 0   |
//! | 0.5 | 127 | 127 | 255 |
//! | 1.0 | 0   | 255 | 0   |

use crate::core::types::{ColorMode, OverlayOptions};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use nalgebra::Point2;

/// Depth spans below this use a unit denominator
const MIN_DEPTH_SPAN: f32 = 1e-6;

/// Color for normalized depth `t` in `[0, 1]`.
///
/// Channel values truncate toward zero.
pub fn overlay_color(t: f32, mode: ColorMode) -> Rgb<u8> {
    match mode {
        ColorMode::Range => {
            let r = (255.0 * (1.0 - t)) as u8;
            let g = (255.0 * t) as u8;
            let b = 255u8.saturating_sub((255.0 * (t - 0.5).abs() * 2.0) as u8);
            Rgb([r, g, b])
        }
        ColorMode::Intensity => {
            let v = (255.0 * (1.0 - t)) as u8;
            Rgb([v, v, v])
        }
    }
}

/// Draw projected points onto `frame` and return it.
///
/// `image_points` and `depths` are index-aligned; `None` entries (points
/// behind the camera) are skipped along with anything outside the frame.
/// Every `decimate`-th point is considered. A disabled overlay returns the
/// frame untouched.
pub fn render_overlay(
    mut frame: RgbImage,
    image_points: &[Option<Point2<f64>>],
    depths: &[f32],
    options: &OverlayOptions,
) -> RgbImage {
    if !options.enabled {
        return frame;
    }

    let count = image_points.len().min(depths.len());
    if count == 0 {
        return frame;
    }

    let clamped: Vec<f32> = depths[..count]
        .iter()
        .map(|d| d.max(options.depth_min_m).min(options.depth_max_m))
        .collect();
    let (min, max) = clamped
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &d| {
            (lo.min(d), hi.max(d))
        });
    let span = max - min;
    let denom = if span > MIN_DEPTH_SPAN { span } else { 1.0 };

    let (width, height) = frame.dimensions();
    let radius = options.point_radius as i32;
    let mut drawn = 0usize;

    for i in (0..count).step_by(options.stride()) {
        let Some(uv) = image_points[i] else {
            continue;
        };
        if !uv.x.is_finite() || !uv.y.is_finite() {
            continue;
        }
        let (x, y) = (uv.x as i32, uv.y as i32);
        if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
            continue;
        }
        let t = (clamped[i] - min) / denom;
        draw_filled_circle_mut(&mut frame, (x, y), radius, overlay_color(t, options.color_mode));
        drawn += 1;
    }

    log::trace!("Overlay drew {} of {} points", drawn, count);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> OverlayOptions {
        OverlayOptions {
            point_radius: 1,
            decimate: 1,
            ..Default::default()
        }
    }

    fn black(w: u32, h: u32) -> RgbImage {
        RgbImage::new(w, h)
    }

    #[test]
    fn test_color_ramp_endpoints() {
        assert_eq!(overlay_color(0.0, ColorMode::Range), Rgb([255, 0, 0]));
        assert_eq!(overlay_color(1.0, ColorMode::Range), Rgb([0, 255, 0]));
        assert_eq!(overlay_color(0.5, ColorMode::Range), Rgb([127, 127, 255]));
    }

    #[test]
    fn test_color_ramp_intermediate_truncates() {
        // 255·0.75 = 191.25, 255·0.25 = 63.75, 255·0.5 = 127.5
        assert_eq!(overlay_color(0.25, ColorMode::Range), Rgb([191, 63, 128]));
    }

    #[test]
    fn test_intensity_mode() {
        assert_eq!(overlay_color(0.0, ColorMode::Intensity), Rgb([255, 255, 255]));
        assert_eq!(overlay_color(1.0, ColorMode::Intensity), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_disabled_overlay_is_passthrough() {
        let frame = RgbImage::from_pixel(10, 10, Rgb([9, 9, 9]));
        let opts = OverlayOptions {
            enabled: false,
            ..options()
        };
        let out = render_overlay(
            frame.clone(),
            &[Some(Point2::new(5.0, 5.0))],
            &[1.0],
            &opts,
        );
        assert_eq!(out, frame);
    }

    #[test]
    fn test_near_red_far_green() {
        let points = [Some(Point2::new(2.0, 2.0)), Some(Point2::new(12.0, 12.0))];
        let out = render_overlay(black(16, 16), &points, &[1.0, 5.0], &options());
        assert_eq!(*out.get_pixel(2, 2), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(12, 12), Rgb([0, 255, 0]));
    }

    #[test]
    fn test_out_of_bounds_and_behind_camera_skipped() {
        let points = [
            Some(Point2::new(-3.0, 4.0)),
            Some(Point2::new(4.0, 40.0)),
            None,
            Some(Point2::new(f64::NAN, 1.0)),
        ];
        let frame = black(8, 8);
        let out = render_overlay(frame.clone(), &points, &[1.0, 2.0, 3.0, 4.0], &options());
        assert_eq!(out, frame);
    }

    #[test]
    fn test_decimate_stride() {
        let points: Vec<_> = (0..4)
            .map(|i| Some(Point2::new(2.0 + 4.0 * i as f64, 2.0)))
            .collect();
        let opts = OverlayOptions {
            decimate: 2,
            ..options()
        };
        let out = render_overlay(black(16, 4), &points, &[1.0; 4], &opts);
        assert_ne!(*out.get_pixel(2, 2), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(6, 2), Rgb([0, 0, 0]));
        assert_ne!(*out.get_pixel(10, 2), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(14, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_uniform_depth_uses_unit_denominator() {
        let out = render_overlay(
            black(8, 8),
            &[Some(Point2::new(4.0, 4.0))],
            &[3.0],
            &options(),
        );
        assert_eq!(*out.get_pixel(4, 4), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_depth_clamp_limits_range() {
        let opts = OverlayOptions {
            depth_min_m: 0.0,
            depth_max_m: 2.0,
            ..options()
        };
        // 50 m clamps to 2 m, so the far point sits at t = 1
        let points = [Some(Point2::new(1.0, 1.0)), Some(Point2::new(6.0, 6.0))];
        let out = render_overlay(black(8, 8), &points, &[1.0, 50.0], &opts);
        assert_eq!(*out.get_pixel(1, 1), Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(6, 6), Rgb([0, 255, 0]));
    }
}
