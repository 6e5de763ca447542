//! Lens distortion on normalized image coordinates.
//!
//! Rational Brown-Conrady model with up to eight coefficients
//! `k1, k2, p1, p2, k3, k4, k5, k6`:
//!
//! ```text
//! r² = x² + y²
//! radial = (1 + k1·r² + k2·r⁴ + k3·r⁶) / (1 + k4·r² + k5·r⁴ + k6·r⁶)
//! x' = x·radial + 2·p1·x·y + p2·(r² + 2x²)
//! y' = y·radial + p1·(r² + 2y²) + 2·p2·x·y
//! ```
//!
//! With five coefficients the denominator is 1 and this reduces to the
//! plain five-parameter model.

use nalgebra::Vector2;

/// Rational radial + tangential distortion.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RationalDistortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
}

impl RationalDistortion {
    /// Build from a coefficient slice in `k1, k2, p1, p2, k3, k4, k5, k6`
    /// order. Missing trailing coefficients are zero; extras are ignored.
    pub fn from_coeffs(coeffs: &[f64]) -> Self {
        let c = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        Self {
            k1: c(0),
            k2: c(1),
            p1: c(2),
            p2: c(3),
            k3: c(4),
            k4: c(5),
            k5: c(6),
            k6: c(7),
        }
    }

    /// Whether every coefficient is zero
    pub fn is_identity(&self) -> bool {
        [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
        .iter()
        .all(|&c| c == 0.0)
    }

    /// Apply distortion to an undistorted normalized point
    pub fn distort(&self, n: &Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let numerator = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let denominator = 1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6;
        let radial = numerator / denominator;

        let xy = x * y;
        let x_tan = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;

        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }
}
