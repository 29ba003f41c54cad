//! Full-covariance Kalman filter over a bounding box.
//!
//! State `x = [cx, cy, w, h, vcx, vcy, vw, vh]` with a constant-velocity
//! transition and an observation of the first four components.

use nalgebra::{Matrix4, SMatrix, SVector, Vector4};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::traits::Filter;
use crate::{Error, Result};

type StateVector = SVector<f64, 8>;
type StateMatrix = SMatrix<f64, 8, 8>;
type ObservationMatrix = SMatrix<f64, 4, 8>;

/// Kalman filter maintaining the full 8x8 state covariance.
#[derive(Clone, Debug)]
pub struct KalmanFilter {
    /// State vector
    x: StateVector,
    /// State covariance
    p: StateMatrix,
    /// State transition matrix
    f: StateMatrix,
    /// Observation matrix
    h: ObservationMatrix,
    /// Measurement noise covariance
    r: Matrix4<f64>,
    /// Process noise covariance
    q: StateMatrix,
}

impl KalmanFilter {
    /// Create a new filter at `initial` with zero velocity.
    ///
    /// # Arguments
    /// * `initial` - Initial measurement `[cx, cy, w, h]`
    /// * `r` - Measurement noise variance
    /// * `q` - Process noise variance
    /// * `p_pos` - Initial position variance
    /// * `p_vel` - Initial velocity variance
    pub fn new(initial: &Vector4<f64>, r: f64, q: f64, p_pos: f64, p_vel: f64) -> Self {
        let mut x = StateVector::zeros();
        x.fixed_rows_mut::<4>(0).copy_from(initial);

        // F = [I, I; 0, I]
        let mut f = StateMatrix::identity();
        for i in 0..4 {
            f[(i, 4 + i)] = 1.0;
        }

        // H = [I, 0]
        let mut h = ObservationMatrix::zeros();
        for i in 0..4 {
            h[(i, i)] = 1.0;
        }

        let mut p = StateMatrix::zeros();
        for i in 0..4 {
            p[(i, i)] = p_pos;
            p[(4 + i, 4 + i)] = p_vel;
        }

        Self {
            x,
            p,
            f,
            h,
            r: Matrix4::identity() * r,
            q: StateMatrix::identity() * q,
        }
    }

    /// Project the state into measurement space: `(H x, H P Hᵀ + R)`.
    pub fn project(&self) -> (Vector4<f64>, Matrix4<f64>) {
        let mean = self.h * self.x;
        let covariance = self.h * self.p * self.h.transpose() + self.r;
        (mean, covariance)
    }

    /// Full state covariance.
    pub fn covariance(&self) -> &StateMatrix {
        &self.p
    }
}

impl Filter for KalmanFilter {
    fn predict(&mut self) {
        // x = F x
        self.x = self.f * self.x;
        // P = F P Fᵀ + Q
        self.p = self.f * self.p * self.f.transpose() + self.q;
    }

    fn update(&mut self, measurement: &Vector4<f64>) {
        let (projected_mean, projected_cov) = self.project();
        let pht = self.p * self.h.transpose();

        // K = P Hᵀ S⁻¹, solved through the Cholesky factor of S (symmetric).
        let gain = match projected_cov.cholesky() {
            Some(chol) => chol.solve(&pht.transpose()).transpose(),
            None => match projected_cov.try_inverse() {
                Some(s_inv) => pht * s_inv,
                None => {
                    warn!("innovation covariance is singular, skipping measurement update");
                    return;
                }
            },
        };

        let innovation = measurement - projected_mean;
        self.x += gain * innovation;
        self.p = (StateMatrix::identity() - gain * self.h) * self.p;
    }

    fn get_state(&self) -> Vector4<f64> {
        self.x.fixed_rows::<4>(0).into_owned()
    }

    fn get_velocity(&self) -> Vector4<f64> {
        self.x.fixed_rows::<4>(4).into_owned()
    }

    fn position_variance(&self) -> Vector4<f64> {
        (self.h * self.p * self.h.transpose()).diagonal()
    }

    fn gating_distance(&self, measurement: &Vector4<f64>) -> f64 {
        let (mean, covariance) = self.project();
        let d = measurement - mean;
        match covariance.cholesky() {
            Some(chol) => d.dot(&chol.solve(&d)),
            None => f64::INFINITY,
        }
    }
}

/// Factory for creating [`KalmanFilter`] instances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanFilterFactory {
    /// Measurement noise variance
    pub r: f64,
    /// Process noise variance
    pub q: f64,
    /// Initial position variance
    pub p_pos: f64,
    /// Initial velocity variance
    pub p_vel: f64,
}

impl KalmanFilterFactory {
    pub fn new(r: f64, q: f64, p_pos: f64, p_vel: f64) -> Self {
        Self { r, q, p_pos, p_vel }
    }

    pub fn create(&self, initial: &Vector4<f64>) -> KalmanFilter {
        KalmanFilter::new(initial, self.r, self.q, self.p_pos, self.p_vel)
    }

    pub fn validate(&self) -> Result<()> {
        validate_noise(&[("r", self.r), ("q", self.q), ("p_pos", self.p_pos), ("p_vel", self.p_vel)])
    }
}

impl Default for KalmanFilterFactory {
    /// Defaults are expressed in normalized frame coordinates.
    fn default() -> Self {
        Self::new(1e-4, 1e-5, 1e-4, 1e-3)
    }
}

pub(super) fn validate_noise(params: &[(&str, f64)]) -> Result<()> {
    for &(name, value) in params {
        if !(value.is_finite() && value > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "motion model parameter `{}` must be positive, got {}",
                name, value
            )));
        }
    }
    Ok(())
}
