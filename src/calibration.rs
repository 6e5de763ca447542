//! Camera calibration session.
//!
//! Collects chessboard views and hands them to an external solver:
//!
//! ```text
//! start(rows, cols, square) ──▶ COLLECTING ──add_view()×N──▶ solve() ──▶ IDLE
//!                                   │                          │
//!                                   └── N < 5: NotEnoughViews ◀┘
//! ```
//!
//! Corner detection and the nonlinear solve are not implemented here; they
//! plug in through [`CornerDetector`] and [`CalibrationSolver`].
//!
//! Object points lie on the `z = 0` plane, `cols` inner corners per row,
//! x varying fastest, scaled by the square size.

use crate::core::types::Intrinsics;
use crate::error::{Error, Result};
use image::{GrayImage, RgbImage};
use nalgebra::{Point2, Point3};

/// Views required before a solve is attempted
pub const MIN_VIEWS: usize = 5;

/// Smallest accepted chessboard dimension (inner corners)
const MIN_PATTERN_DIM: u32 = 3;

/// Largest accepted chessboard dimension (inner corners)
const MAX_PATTERN_DIM: u32 = 256;

/// One captured target view: known target points and their detected pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationView {
    pub object_points: Vec<Point3<f64>>,
    pub image_points: Vec<Point2<f64>>,
}

/// Session state for status queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationStatus {
    pub collecting: bool,
    pub num_samples: usize,
    pub target_rows: u32,
    pub target_cols: u32,
    pub square_size_m: f64,
}

/// Solver output
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub intrinsics: Intrinsics,
    /// RMS reprojection error in pixels
    pub rms_error: f64,
}

/// Nonlinear camera calibration routine.
pub trait CalibrationSolver {
    /// Estimate intrinsics from at least [`MIN_VIEWS`] views
    fn solve(
        &self,
        views: &[CalibrationView],
        image_size: (u32, u32),
    ) -> Result<CalibrationResult>;
}

/// Chessboard inner-corner detector.
pub trait CornerDetector: Send + Sync {
    /// Refined corner pixels in target order, or `None` if the board is not found
    fn detect(&self, image: &GrayImage, rows: u32, cols: u32) -> Option<Vec<Point2<f64>>>;
}

/// Calibration view collector.
#[derive(Debug, Default)]
pub struct Calibrator {
    collecting: bool,
    rows: u32,
    cols: u32,
    square_size_m: f64,
    views: Vec<CalibrationView>,
    image_size: Option<(u32, u32)>,
}

impl Calibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new session, discarding any collected views
    pub fn start(&mut self, rows: u32, cols: u32, square_size_m: f64) -> Result<()> {
        if rows < MIN_PATTERN_DIM || cols < MIN_PATTERN_DIM {
            return Err(Error::InvalidParameter(format!(
                "chessboard must have at least {0}x{0} inner corners, got {1}x{2}",
                MIN_PATTERN_DIM, rows, cols
            )));
        }
        if rows > MAX_PATTERN_DIM || cols > MAX_PATTERN_DIM {
            return Err(Error::InvalidParameter(format!(
                "chessboard must have at most {0}x{0} inner corners, got {1}x{2}",
                MAX_PATTERN_DIM, rows, cols
            )));
        }
        if !(square_size_m.is_finite() && square_size_m > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "square size must be positive, got {}",
                square_size_m
            )));
        }

        self.collecting = true;
        self.rows = rows;
        self.cols = cols;
        self.square_size_m = square_size_m;
        self.views.clear();
        self.image_size = None;
        log::info!(
            "Calibration started: {}x{} corners, {:.3} m squares",
            rows,
            cols,
            square_size_m
        );
        Ok(())
    }

    pub fn status(&self) -> CalibrationStatus {
        CalibrationStatus {
            collecting: self.collecting,
            num_samples: self.views.len(),
            target_rows: self.rows,
            target_cols: self.cols,
            square_size_m: self.square_size_m,
        }
    }

    /// Target corners on the z = 0 plane
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        (0..self.rows)
            .flat_map(|r| (0..self.cols).map(move |c| (c, r)))
            .map(|(c, r)| {
                Point3::new(
                    c as f64 * self.square_size_m,
                    r as f64 * self.square_size_m,
                    0.0,
                )
            })
            .collect()
    }

    /// Record detected corners for one view.
    ///
    /// Returns `Ok(false)` when the corner count does not match the target.
    pub fn add_view(&mut self, corners: Vec<Point2<f64>>, image_size: (u32, u32)) -> Result<bool> {
        if !self.collecting {
            return Err(Error::CalibrationNotCollecting);
        }
        let expected = self.rows as usize * self.cols as usize;
        if corners.len() != expected {
            log::debug!(
                "Calibration view rejected: {} corners, expected {}",
                corners.len(),
                expected
            );
            return Ok(false);
        }

        self.views.push(CalibrationView {
            object_points: self.object_points(),
            image_points: corners,
        });
        self.image_size = Some(image_size);
        log::info!("Calibration view {} captured", self.views.len());
        Ok(true)
    }

    /// Detect the target in `frame` and record it.
    ///
    /// Returns `Ok(false)` if the detector finds no board.
    pub fn capture(&mut self, frame: &RgbImage, detector: &dyn CornerDetector) -> Result<bool> {
        if !self.collecting {
            return Err(Error::CalibrationNotCollecting);
        }
        let gray = image::imageops::grayscale(frame);
        match detector.detect(&gray, self.rows, self.cols) {
            Some(corners) => self.add_view(corners, gray.dimensions()),
            None => {
                log::debug!("No chessboard found in frame");
                Ok(false)
            }
        }
    }

    /// Run the solver over the collected views.
    ///
    /// Success ends the session; failure keeps collecting so more views
    /// can be added.
    pub fn solve(&mut self, solver: &dyn CalibrationSolver) -> Result<CalibrationResult> {
        let image_size = match self.image_size {
            Some(size) if self.views.len() >= MIN_VIEWS => size,
            _ => {
                return Err(Error::NotEnoughViews {
                    required: MIN_VIEWS,
                    available: self.views.len(),
                });
            }
        };

        let result = solver.solve(&self.views, image_size)?;
        result.intrinsics.validate()?;
        self.collecting = false;
        log::info!(
            "Calibration solved from {} views, RMS {:.3} px",
            self.views.len(),
            result.rms_error
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FixedSolver {
        calls: Cell<usize>,
    }

    impl CalibrationSolver for FixedSolver {
        fn solve(
            &self,
            views: &[CalibrationView],
            image_size: (u32, u32),
        ) -> Result<CalibrationResult> {
            self.calls.set(self.calls.get() + 1);
            assert!(views.len() >= MIN_VIEWS);
            Ok(CalibrationResult {
                intrinsics: Intrinsics::pinhole(500.0, 500.0, 320.0, 240.0, image_size),
                rms_error: 0.25,
            })
        }
    }

    struct FailingSolver;

    impl CalibrationSolver for FailingSolver {
        fn solve(&self, _: &[CalibrationView], _: (u32, u32)) -> Result<CalibrationResult> {
            Err(Error::CalibrationFailed("did not converge".to_string()))
        }
    }

    struct GridDetector {
        found: bool,
    }

    impl CornerDetector for GridDetector {
        fn detect(&self, _image: &GrayImage, rows: u32, cols: u32) -> Option<Vec<Point2<f64>>> {
            self.found.then(|| corners(rows, cols))
        }
    }

    fn corners(rows: u32, cols: u32) -> Vec<Point2<f64>> {
        (0..rows * cols)
            .map(|i| Point2::new((i % cols) as f64 * 20.0, (i / cols) as f64 * 20.0))
            .collect()
    }

    fn collecting(rows: u32, cols: u32, views: usize) -> Calibrator {
        let mut cal = Calibrator::new();
        cal.start(rows, cols, 0.025).unwrap();
        for _ in 0..views {
            assert!(cal.add_view(corners(rows, cols), (640, 480)).unwrap());
        }
        cal
    }

    #[test]
    fn test_start_validates_target() {
        let mut cal = Calibrator::new();
        assert!(cal.start(2, 9, 0.025).is_err());
        assert!(cal.start(6, 9, 0.0).is_err());
        assert!(cal.start(70_000, 70_000, 0.025).is_err());
        assert!(!cal.status().collecting);
        cal.start(6, 9, 0.025).unwrap();
        let status = cal.status();
        assert!(status.collecting);
        assert_eq!((status.target_rows, status.target_cols), (6, 9));
    }

    #[test]
    fn test_largest_board_counts_corners_without_overflow() {
        let mut cal = Calibrator::new();
        cal.start(256, 256, 0.01).unwrap();
        assert_eq!(cal.object_points().len(), 65_536);
        assert!(!cal.add_view(corners(3, 3), (640, 480)).unwrap());
    }

    #[test]
    fn test_object_points_layout() {
        let cal = collecting(3, 4, 0);
        let obj = cal.object_points();
        assert_eq!(obj.len(), 12);
        assert_eq!(obj[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(obj[1], Point3::new(0.025, 0.0, 0.0));
        assert_eq!(obj[4], Point3::new(0.0, 0.025, 0.0));
        assert!(obj.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn test_add_view_requires_session() {
        let mut cal = Calibrator::new();
        assert!(matches!(
            cal.add_view(corners(3, 3), (640, 480)),
            Err(Error::CalibrationNotCollecting)
        ));
    }

    #[test]
    fn test_wrong_corner_count_rejected() {
        let mut cal = collecting(3, 4, 0);
        assert!(!cal.add_view(corners(3, 3), (640, 480)).unwrap());
        assert_eq!(cal.status().num_samples, 0);
    }

    #[test]
    fn test_solve_needs_five_views() {
        let mut cal = collecting(3, 3, 4);
        let solver = FixedSolver { calls: Cell::new(0) };
        assert!(matches!(
            cal.solve(&solver),
            Err(Error::NotEnoughViews {
                required: 5,
                available: 4
            })
        ));
        assert_eq!(solver.calls.get(), 0);
    }

    #[test]
    fn test_solve_success_stops_collecting() {
        let mut cal = collecting(3, 3, 5);
        let solver = FixedSolver { calls: Cell::new(0) };
        let result = cal.solve(&solver).unwrap();
        assert_eq!(result.intrinsics.image_size, (640, 480));
        assert_eq!(solver.calls.get(), 1);
        assert!(!cal.status().collecting);
    }

    #[test]
    fn test_solver_failure_keeps_session() {
        let mut cal = collecting(3, 3, 6);
        assert!(matches!(
            cal.solve(&FailingSolver),
            Err(Error::CalibrationFailed(_))
        ));
        assert!(cal.status().collecting);
        assert_eq!(cal.status().num_samples, 6);
    }

    #[test]
    fn test_capture_with_detector() {
        let mut cal = collecting(3, 3, 0);
        let frame = RgbImage::new(32, 24);
        assert!(!cal.capture(&frame, &GridDetector { found: false }).unwrap());
        assert!(cal.capture(&frame, &GridDetector { found: true }).unwrap());
        assert_eq!(cal.status().num_samples, 1);
        assert_eq!(cal.image_size, Some((32, 24)));
    }
}
