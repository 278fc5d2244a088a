//! Two-state Kalman filter on (speed, acceleration)
//!
//! Constant-acceleration model with velocity-only observations:
//!
//! ```text
//! F = | 1  dt |     Q = q * | dt^4/4  dt^3/2 |     H = | 1  0 |     R = r
//!     | 0   1 |             | dt^3/2  dt^2   |
//! ```
//!
//! F and Q are rebuilt whenever the sample spacing moves by more than
//! `DT_EPSILON`, so irregular bus timing is tolerated.

use super::SpeedFilter;

/// Sample spacing change that triggers a model rebuild (seconds)
const DT_EPSILON: f64 = 1e-3;

type Mat2 = [[f64; 2]; 2];

#[derive(Debug, Clone)]
pub struct KalmanSpeedFilter {
    process_variance: f64,
    measurement_variance: f64,
    initial_covariance: f64,

    /// State: [speed, acceleration]
    x: [f64; 2],
    /// State covariance
    p: Mat2,

    dt: f64,
    f: Mat2,
    q: Mat2,
}

impl KalmanSpeedFilter {
    pub fn new(
        nominal_dt: f64,
        process_variance: f64,
        measurement_variance: f64,
        initial_covariance: f64,
    ) -> Self {
        let mut filter = Self {
            process_variance,
            measurement_variance,
            initial_covariance,
            x: [0.0, 0.0],
            p: scaled_identity(initial_covariance),
            dt: nominal_dt,
            f: [[1.0, 0.0], [0.0, 1.0]],
            q: [[0.0; 2]; 2],
        };
        filter.rebuild_model(nominal_dt);
        filter
    }

    pub fn acceleration(&self) -> f64 {
        self.x[1]
    }

    /// Current speed variance
    pub fn speed_variance(&self) -> f64 {
        self.p[0][0]
    }

    /// Sample spacing the transition model was last built for
    pub fn model_dt(&self) -> f64 {
        self.dt
    }

    fn rebuild_model(&mut self, dt: f64) {
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;
        let dt4 = dt3 * dt;
        let q = self.process_variance;

        self.dt = dt;
        self.f = [[1.0, dt], [0.0, 1.0]];
        self.q = [
            [q * dt4 / 4.0, q * dt3 / 2.0],
            [q * dt3 / 2.0, q * dt2],
        ];
    }

    fn predict(&mut self) {
        let [[f00, f01], [f10, f11]] = self.f;
        let [v, a] = self.x;
        self.x = [f00 * v + f01 * a, f10 * v + f11 * a];

        // P = F P F^T + Q
        let fp = mul(&self.f, &self.p);
        let fpft = mul(&fp, &transpose(&self.f));
        self.p = add(&fpft, &self.q);
    }

    fn correct(&mut self, measurement: f64) {
        // H = [1, 0] so H P H^T is just P[0][0]
        let innovation = measurement - self.x[0];
        let s = self.p[0][0] + self.measurement_variance;
        let k = [self.p[0][0] / s, self.p[1][0] / s];

        self.x[0] += k[0] * innovation;
        self.x[1] += k[1] * innovation;

        // P = (I - K H) P
        let [[p00, p01], [p10, p11]] = self.p;
        self.p = [
            [(1.0 - k[0]) * p00, (1.0 - k[0]) * p01],
            [p10 - k[1] * p00, p11 - k[1] * p01],
        ];
    }
}

impl SpeedFilter for KalmanSpeedFilter {
    fn update(&mut self, measurement: f64, dt: f64) -> f64 {
        if (dt - self.dt).abs() > DT_EPSILON {
            self.rebuild_model(dt);
        }

        self.predict();
        self.correct(measurement);

        if self.x[0] < 0.0 {
            self.x[0] = 0.0;
        }
        self.x[0]
    }

    fn reset(&mut self) {
        self.x = [0.0, 0.0];
        self.p = scaled_identity(self.initial_covariance);
    }

    fn name(&self) -> &'static str {
        "kalman"
    }
}

fn scaled_identity(scale: f64) -> Mat2 {
    [[scale, 0.0], [0.0, scale]]
}

fn mul(a: &Mat2, b: &Mat2) -> Mat2 {
    let mut out = [[0.0; 2]; 2];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j];
        }
    }
    out
}

fn transpose(a: &Mat2) -> Mat2 {
    [[a[0][0], a[1][0]], [a[0][1], a[1][1]]]
}

fn add(a: &Mat2, b: &Mat2) -> Mat2 {
    [
        [a[0][0] + b[0][0], a[0][1] + b[0][1]],
        [a[1][0] + b[1][0], a[1][1] + b[1][1]],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> KalmanSpeedFilter {
        KalmanSpeedFilter::new(0.05, 4.0, 3.0, 100.0)
    }

    #[test]
    fn test_first_update_trusts_measurement() {
        let mut filter = filter();
        let v = filter.update(1234.0, 0.05);
        // P00 after predict = 100 + dt^2 * 100 + q*dt^4/4 = 100.25000625
        let p00 = 100.0 + 0.05 * 0.05 * 100.0 + 4.0 * 0.05f64.powi(4) / 4.0;
        let expected = 1234.0 * p00 / (p00 + 3.0);
        assert!((v - expected).abs() < 1e-9, "v = {}, expected {}", v, expected);
        assert!(filter.speed_variance() < 100.0);
    }

    #[test]
    fn test_converges_on_constant_input() {
        let mut filter = filter();
        let mut v = 0.0;
        for _ in 0..200 {
            v = filter.update(250.0, 0.05);
        }
        assert!((v - 250.0).abs() < 0.5, "settled at {}", v);
        assert!(filter.acceleration().abs() < 1.0);
    }

    #[test]
    fn test_rebuilds_model_on_dt_change() {
        let mut filter = filter();
        filter.update(10.0, 0.0505);
        assert_eq!(filter.model_dt(), 0.05);

        filter.update(10.0, 0.1);
        assert_eq!(filter.model_dt(), 0.1);
        assert!((filter.q[1][1] - 4.0 * 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_clamps_negative() {
        let mut filter = filter();
        for _ in 0..10 {
            filter.update(400.0, 0.05);
        }
        for _ in 0..30 {
            assert!(filter.update(0.0, 0.05) >= 0.0);
        }
    }

    #[test]
    fn test_reset_restores_prior() {
        let mut filter = filter();
        for _ in 0..10 {
            filter.update(80.0, 0.05);
        }
        filter.reset();
        assert_eq!(filter.speed_variance(), 100.0);
        assert_eq!(filter.acceleration(), 0.0);
    }
}
