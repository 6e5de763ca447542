//! Process-wide fusion context.
//!
//! Built once at startup and passed to whatever serves requests. Owns both
//! snapshot stores, both receiver threads, the projector and the
//! calibration session.
//!
//! ```text
//!  sonar-rx ──publish──▶ [points store] ──┐
//!                                          ├──▶ latest_frame_with_overlay()
//! camera-rx ──publish──▶ [frame store]  ──┘        (projector, read lock)
//! ```
//!
//! The two stores are read independently, so an overlay may pair a sonar
//! snapshot and a camera frame captured at different instants.

use crate::calibration::{
    CalibrationResult, CalibrationSolver, CalibrationStatus, Calibrator, CornerDetector,
};
use crate::camera::{CameraReceiver, CameraStats, CaptureBackend, ResolutionHint};
use crate::config::{AppConfig, SonarConfig};
use crate::core::SnapshotStore;
use crate::core::types::{CameraFrame, Extrinsics, Intrinsics, OverlayOptions, PointCloud};
use crate::error::{Error, Result};
use crate::projection::Projector;
use crate::sonar::{SonarReceiver, SonarStats};
use nalgebra::{Point2, Point3};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared state and handles for the whole pipeline.
pub struct FusionContext {
    running: Arc<AtomicBool>,
    points: Arc<SnapshotStore<PointCloud>>,
    sonar: SonarReceiver,
    camera: CameraReceiver,
    projector: RwLock<Projector>,
    calibrator: Mutex<Calibrator>,
}

impl FusionContext {
    /// Validate `config`, start both receivers and select the configured camera.
    ///
    /// A camera that fails to open at startup is logged and left unselected.
    pub fn start(config: &AppConfig, backend: Box<dyn CaptureBackend>) -> Result<Self> {
        config.validate()?;

        let projector = Projector::new(
            config.projector.intrinsics.clone(),
            config.projector.extrinsics,
            config.projector.overlay,
        )?;

        let running = Arc::new(AtomicBool::new(true));
        let points = Arc::new(SnapshotStore::new());
        let frames = Arc::new(SnapshotStore::new());

        let sonar = SonarReceiver::spawn(
            config.sonar.clone(),
            Arc::clone(&points),
            Arc::clone(&running),
        )?;
        let camera = CameraReceiver::spawn(
            backend,
            ResolutionHint::new(config.camera.width, config.camera.height),
            frames,
            Arc::clone(&running),
        )?;

        if let Some(index) = config.camera.device_index {
            if let Err(e) = camera.select_device(index) {
                log::warn!("Starting without camera: {}", e);
            }
        }

        Ok(Self {
            running,
            points,
            sonar,
            camera,
            projector: RwLock::new(projector),
            calibrator: Mutex::new(Calibrator::new()),
        })
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Copy of the latest camera frame
    pub fn latest_frame(&self) -> Option<CameraFrame> {
        self.camera.latest_frame()
    }

    /// Latest camera frame with the latest sonar points drawn on it.
    ///
    /// Without intrinsics or sonar data the plain frame is returned.
    pub fn latest_frame_with_overlay(&self) -> Option<CameraFrame> {
        let frame = self.camera.latest_frame()?;
        let Some(cloud) = self.points.latest() else {
            return Some(frame);
        };

        let image = self
            .projector_snapshot()
            .composite(frame.image, cloud.points(), cloud.depths());
        Some(CameraFrame {
            image,
            captured_at: frame.captured_at,
        })
    }

    /// Latest sonar point cloud, `None` until one has been decoded
    pub fn latest_points(&self) -> Option<Arc<PointCloud>> {
        self.points.latest()
    }

    // ========================================================================
    // Sonar
    // ========================================================================

    /// Replace sonar socket settings; takes effect on the next receive cycle
    pub fn apply_sonar_config(&self, config: SonarConfig) -> Result<()> {
        self.sonar.apply_config(config)
    }

    pub fn sonar_config(&self) -> SonarConfig {
        self.sonar.config()
    }

    pub fn sonar_stats(&self) -> SonarStats {
        self.sonar.stats()
    }

    /// Feed a recorded datagram through the sonar decoder
    pub fn ingest_sonar_datagram(&self, datagram: &[u8]) {
        self.sonar.ingest(datagram);
    }

    // ========================================================================
    // Camera
    // ========================================================================

    /// Switch camera device; fails with [`Error::DeviceOpen`]
    pub fn select_camera_device(&self, index: u32) -> Result<()> {
        self.camera.select_device(index)
    }

    pub fn camera_stats(&self) -> CameraStats {
        self.camera.stats()
    }

    // ========================================================================
    // Projector
    // ========================================================================

    pub fn set_intrinsics(
        &self,
        camera_matrix: [[f64; 3]; 3],
        distortion: Vec<f64>,
        image_size: (u32, u32),
    ) -> Result<()> {
        let intrinsics = Intrinsics::new(camera_matrix, distortion, image_size)?;
        self.projector.write().set_intrinsics(intrinsics)
    }

    pub fn set_extrinsics(&self, rvec: [f64; 3], tvec: [f64; 3]) {
        self.projector
            .write()
            .set_extrinsics(Extrinsics::new(rvec, tvec));
    }

    pub fn set_overlay_options(&self, options: OverlayOptions) -> Result<()> {
        self.projector.write().set_overlay_options(options)
    }

    /// Project sonar-frame points with the current calibration
    pub fn project_points(&self, points: &[Point3<f32>]) -> Result<Vec<Option<Point2<f64>>>> {
        self.projector_snapshot()
            .project(points)
            .ok_or(Error::IntrinsicsNotSet)
    }

    /// Copy of the projector; the lock is released before any rendering
    fn projector_snapshot(&self) -> Projector {
        self.projector.read().clone()
    }

    pub fn intrinsics(&self) -> Option<Intrinsics> {
        self.projector.read().intrinsics().cloned()
    }

    pub fn extrinsics(&self) -> Extrinsics {
        self.projector.read().extrinsics()
    }

    pub fn overlay_options(&self) -> OverlayOptions {
        self.projector.read().overlay_options()
    }

    // ========================================================================
    // Calibration
    // ========================================================================

    pub fn start_calibration(&self, rows: u32, cols: u32, square_size_m: f64) -> Result<()> {
        self.calibrator.lock().start(rows, cols, square_size_m)
    }

    pub fn calibration_status(&self) -> CalibrationStatus {
        self.calibrator.lock().status()
    }

    /// Detect the target in the latest camera frame and record it
    pub fn capture_calibration_view(&self, detector: &dyn CornerDetector) -> Result<bool> {
        let frame = self
            .camera
            .latest_frame()
            .ok_or_else(|| Error::Capture("no camera frame available".to_string()))?;
        self.calibrator.lock().capture(&frame.image, detector)
    }

    /// Solve and install the resulting intrinsics
    pub fn solve_calibration(&self, solver: &dyn CalibrationSolver) -> Result<CalibrationResult> {
        let result = self.calibrator.lock().solve(solver)?;
        self.projector
            .write()
            .set_intrinsics(result.intrinsics.clone())?;
        Ok(result)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop both receiver threads and wait for them
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.sonar.shutdown();
        self.camera.shutdown();
        log::info!("Fusion context stopped");
    }
}

impl Drop for FusionContext {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::TestPatternBackend;
    use crate::core::types::RangeImage;
    use crate::sonar::packet;
    use std::thread;
    use std::time::{Duration, Instant};

    fn offline_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.sonar.enabled = false;
        config.camera.width = 64;
        config.camera.height = 48;
        config
    }

    fn start(config: &AppConfig) -> FusionContext {
        FusionContext::start(config, Box::new(TestPatternBackend::new(vec![0], 200))).unwrap()
    }

    fn wait_frame(ctx: &FusionContext) -> CameraFrame {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(frame) = ctx.latest_frame() {
                return frame;
            }
            assert!(Instant::now() < deadline, "no frame");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_points_none_until_decoded() {
        let mut ctx = start(&offline_config());
        assert!(ctx.latest_points().is_none());

        let image = RangeImage {
            width: 2,
            height: 1,
            fov_horizontal_deg: 10.0,
            fov_vertical_deg: 0.0,
            pixel_scale: 0.01,
            samples: vec![100, 0],
        };
        ctx.ingest_sonar_datagram(&packet::encode(&image, None).unwrap());
        let cloud = ctx.latest_points().unwrap();
        assert_eq!(cloud.points().len(), cloud.depths().len());
        assert_eq!(ctx.sonar_stats().packets_received, 1);
        ctx.shutdown();
    }

    #[test]
    fn test_overlay_passthrough_without_intrinsics() {
        let mut config = offline_config();
        config.camera.device_index = Some(0);
        let mut ctx = start(&config);
        wait_frame(&ctx);
        assert!(ctx.latest_frame_with_overlay().is_some());
        ctx.shutdown();
    }

    #[test]
    fn test_startup_with_missing_camera_continues() {
        let mut config = offline_config();
        config.camera.device_index = Some(5);
        let mut ctx = start(&config);
        assert_eq!(ctx.camera_stats().device_index, None);
        assert!(ctx.latest_frame().is_none());
        ctx.shutdown();
    }

    #[test]
    fn test_projector_setters() {
        let mut ctx = start(&offline_config());
        assert!(ctx.intrinsics().is_none());

        let origin_ahead = [Point3::new(0.0, 0.0, 1.0)];
        assert!(matches!(
            ctx.project_points(&origin_ahead),
            Err(Error::IntrinsicsNotSet)
        ));

        let k = [[500.0, 0.0, 32.0], [0.0, 500.0, 24.0], [0.0, 0.0, 1.0]];
        assert!(ctx.set_intrinsics(k, vec![0.0; 3], (64, 48)).is_err());
        ctx.set_intrinsics(k, vec![0.0; 8], (64, 48)).unwrap();
        assert_eq!(ctx.intrinsics().unwrap().distortion.len(), 8);
        let uv = ctx.project_points(&origin_ahead).unwrap();
        assert_eq!(uv[0], Some(Point2::new(32.0, 24.0)));

        ctx.set_extrinsics([0.0, 0.1, 0.0], [0.0, 0.0, 0.2]);
        assert_eq!(ctx.extrinsics().tvec, [0.0, 0.0, 0.2]);

        let bad = OverlayOptions {
            decimate: 0,
            ..Default::default()
        };
        assert!(ctx.set_overlay_options(bad).is_err());
        assert_eq!(ctx.overlay_options().decimate, 4);
        ctx.shutdown();
    }

    #[test]
    fn test_rendering_copy_does_not_hold_projector_lock() {
        let mut ctx = start(&offline_config());
        let k = [[500.0, 0.0, 32.0], [0.0, 500.0, 24.0], [0.0, 0.0, 1.0]];
        ctx.set_intrinsics(k, vec![0.0; 5], (64, 48)).unwrap();

        let snapshot = ctx.projector_snapshot();
        assert!(ctx.projector.try_write().is_some());

        ctx.set_extrinsics([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]);
        let origin_ahead = [Point3::new(0.0, 0.0, 1.0)];
        assert_eq!(
            snapshot.project(&origin_ahead).unwrap()[0],
            Some(Point2::new(32.0, 24.0))
        );
        assert_eq!(ctx.extrinsics().tvec, [0.0, 0.0, 1.0]);
        ctx.shutdown();
    }

    #[test]
    fn test_apply_sonar_config_rejects_unicast() {
        let mut ctx = start(&offline_config());
        let cfg = SonarConfig {
            multicast_addr: "10.1.1.1".to_string(),
            enabled: false,
            ..Default::default()
        };
        assert!(matches!(
            ctx.apply_sonar_config(cfg),
            Err(Error::InvalidConfig(_))
        ));
        assert_eq!(ctx.sonar_config().multicast_addr, "224.0.0.96");
        ctx.shutdown();
    }

    #[test]
    fn test_capture_without_frame_fails() {
        struct NeverFound;
        impl CornerDetector for NeverFound {
            fn detect(
                &self,
                _: &image::GrayImage,
                _: u32,
                _: u32,
            ) -> Option<Vec<Point2<f64>>> {
                None
            }
        }

        let mut ctx = start(&offline_config());
        ctx.start_calibration(6, 9, 0.025).unwrap();
        assert!(matches!(
            ctx.capture_calibration_view(&NeverFound),
            Err(Error::Capture(_))
        ));
        ctx.shutdown();
    }
}
