//! Sonar simulator with ray-casting
//!
//! Generates range images of a simple scene as seen from the sonar origin:
//! a flat wall across the forward axis and a sphere sweeping side to side
//! in front of it. Used by the `sonar_sim` binary and tests to exercise
//! the full decode path without hardware.
//!
//! Ray directions use the same angular grid as the point cloud builder,
//! so a noiseless image converts back onto the scene surfaces.

use crate::core::types::RangeImage;
use nalgebra::{Point3, Vector3};
use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, StandardNormal, Uniform};

/// Noise generator with configurable seed for reproducibility
#[derive(Clone)]
pub struct NoiseGenerator {
    rng: SmallRng,
}

impl NoiseGenerator {
    /// Seed 0 draws from entropy; any other seed is reproducible
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    /// Gaussian noise with the given standard deviation
    #[inline]
    pub fn gaussian(&mut self, stddev: f32) -> f32 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f32 = self.rng.sample(StandardNormal);
        n * stddev
    }

    /// Returns true with given probability
    #[inline]
    pub fn chance(&mut self, probability: f32) -> bool {
        probability > 0.0 && Uniform::new(0.0f32, 1.0).sample(&mut self.rng) < probability
    }
}

/// Simulated sensor and scene parameters
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub width: u32,
    pub height: u32,
    pub fov_horizontal_deg: f32,
    pub fov_vertical_deg: f32,
    /// Meters per range count
    pub pixel_scale: f32,
    /// Returns beyond this are reported as no return
    pub max_range_m: f32,
    /// Distance to the wall along +x
    pub wall_distance_m: f32,
    /// Sphere center distance along +x
    pub sphere_distance_m: f32,
    pub sphere_radius_m: f32,
    /// Peak lateral offset of the sphere
    pub sphere_sweep_m: f32,
    /// Sweep period in seconds
    pub sphere_period_s: f32,
    pub range_stddev_m: f32,
    /// Probability a cell reports no return
    pub miss_rate: f32,
    /// 0 = random
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 32,
            fov_horizontal_deg: 90.0,
            fov_vertical_deg: 40.0,
            pixel_scale: 0.01,
            max_range_m: 20.0,
            wall_distance_m: 6.0,
            sphere_distance_m: 3.0,
            sphere_radius_m: 0.8,
            sphere_sweep_m: 1.5,
            sphere_period_s: 8.0,
            range_stddev_m: 0.02,
            miss_rate: 0.01,
            seed: 0,
        }
    }
}

/// Range image generator
pub struct SonarSimulator {
    config: SimConfig,
    noise: NoiseGenerator,
    directions: Vec<Vector3<f32>>,
}

impl SonarSimulator {
    pub fn new(config: SimConfig) -> Self {
        let noise = NoiseGenerator::new(config.seed);
        let directions = ray_directions(&config);
        Self {
            config,
            noise,
            directions,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Sphere center at `time_s`
    pub fn sphere_center(&self, time_s: f32) -> Point3<f32> {
        let phase = std::f32::consts::TAU * time_s / self.config.sphere_period_s.max(1e-3);
        Point3::new(
            self.config.sphere_distance_m,
            self.config.sphere_sweep_m * phase.sin(),
            0.0,
        )
    }

    /// Render one range image at `time_s`
    pub fn generate(&mut self, time_s: f32) -> RangeImage {
        let center = self.sphere_center(time_s);
        let cfg = &self.config;
        let mut samples = Vec::with_capacity(self.directions.len());

        for dir in &self.directions {
            let mut range = cast(dir, cfg.wall_distance_m, &center, cfg.sphere_radius_m);

            if self.noise.chance(cfg.miss_rate) {
                range = None;
            }

            let sample = match range {
                Some(r) if r < cfg.max_range_m => {
                    let noisy = (r + self.noise.gaussian(cfg.range_stddev_m)).max(0.0);
                    (noisy / cfg.pixel_scale).round().min(u16::MAX as f32) as u16
                }
                _ => 0,
            };
            samples.push(sample);
        }

        RangeImage {
            width: cfg.width,
            height: cfg.height,
            fov_horizontal_deg: cfg.fov_horizontal_deg,
            fov_vertical_deg: cfg.fov_vertical_deg,
            pixel_scale: cfg.pixel_scale,
            samples,
        }
    }
}

/// Unit ray per grid cell, row-major
fn ray_directions(config: &SimConfig) -> Vec<Vector3<f32>> {
    let col_denom = (config.width.saturating_sub(1)).max(1) as f32;
    let row_denom = (config.height.saturating_sub(1)).max(1) as f32;
    let fov_h = config.fov_horizontal_deg;
    let fov_v = config.fov_vertical_deg;

    (0..config.height)
        .flat_map(|r| (0..config.width).map(move |c| (c, r)))
        .map(|(c, r)| {
            let (sy, cy) = (c as f32 / col_denom * fov_h - fov_h / 2.0)
                .to_radians()
                .sin_cos();
            let (sp, cp) = (r as f32 / row_denom * fov_v - fov_v / 2.0)
                .to_radians()
                .sin_cos();
            Vector3::new(cp * cy, cp * sy, -sp)
        })
        .collect()
}

/// Nearest hit distance along `dir` against the wall and sphere
fn cast(dir: &Vector3<f32>, wall_x: f32, center: &Point3<f32>, radius: f32) -> Option<f32> {
    let wall = (dir.x > 1e-6).then(|| wall_x / dir.x).filter(|&t| t > 0.0);

    // |t·d - c|² = r² with |d| = 1
    let b = dir.dot(&center.coords);
    let disc = b * b - center.coords.norm_squared() + radius * radius;
    let sphere = if disc >= 0.0 {
        let t = b - disc.sqrt();
        (t > 0.0).then_some(t)
    } else {
        None
    };

    match (wall, sphere) {
        (Some(w), Some(s)) => Some(w.min(s)),
        (w, s) => w.or(s),
    }
}
