//! Alpha-beta filter on (speed, acceleration)

use super::SpeedFilter;

/// Lightweight two-parameter recursive estimator
///
/// Treats the measured speed as the "position" term and tracks its rate of
/// change as the "velocity" term, which smooths speed without a covariance model.
#[derive(Debug, Clone)]
pub struct AlphaBetaFilter {
    alpha: f64,
    beta: f64,
    /// Filtered speed
    v: f64,
    /// Estimated acceleration
    a: f64,
}

impl AlphaBetaFilter {
    /// `alpha` weights the measurement (0..1), `beta` corrects acceleration
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self {
            alpha,
            beta,
            v: 0.0,
            a: 0.0,
        }
    }

    pub fn acceleration(&self) -> f64 {
        self.a
    }
}

impl SpeedFilter for AlphaBetaFilter {
    fn update(&mut self, measurement: f64, dt: f64) -> f64 {
        let v_pred = self.v + self.a * dt;
        let residual = measurement - v_pred;

        self.v = v_pred + self.alpha * residual;
        self.a += (self.beta / dt) * residual;

        if self.v < 0.0 {
            self.v = 0.0;
        }
        self.v
    }

    fn reset(&mut self) {
        self.v = 0.0;
        self.a = 0.0;
    }

    fn name(&self) -> &'static str {
        "alpha-beta"
    }
}
