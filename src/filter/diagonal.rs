//! Kalman filter with per-dimension covariance.
//!
//! Each of the four measured components is treated as an independent
//! position/velocity pair, so the filter tracks three scalars per dimension
//! instead of a full 8x8 covariance.

use nalgebra::Vector4;
use serde::{Deserialize, Serialize};

use super::kalman::validate_noise;
use super::traits::Filter;
use crate::Result;

/// Kalman filter with simplified (block-diagonal) covariance.
///
/// Per dimension it tracks:
/// - position variance
/// - velocity variance
/// - position-velocity covariance
#[derive(Clone, Debug)]
pub struct DiagonalKalmanFilter {
    /// Positions `[cx, cy, w, h]`
    pos: Vector4<f64>,
    /// Velocities per frame
    vel: Vector4<f64>,
    pos_variance: Vector4<f64>,
    vel_variance: Vector4<f64>,
    pos_vel_covariance: Vector4<f64>,
    /// Measurement noise variance
    r: f64,
    /// Process noise variance
    q: f64,
}

impl DiagonalKalmanFilter {
    pub fn new(initial: &Vector4<f64>, r: f64, q: f64, pos_variance: f64, vel_variance: f64) -> Self {
        Self {
            pos: *initial,
            vel: Vector4::zeros(),
            pos_variance: Vector4::repeat(pos_variance),
            vel_variance: Vector4::repeat(vel_variance),
            pos_vel_covariance: Vector4::zeros(),
            r,
            q,
        }
    }
}

impl Filter for DiagonalKalmanFilter {
    fn predict(&mut self) {
        self.pos += self.vel;
        for i in 0..4 {
            // [1 1; 0 1] P [1 0; 1 1] + qI
            self.pos_variance[i] +=
                2.0 * self.pos_vel_covariance[i] + self.vel_variance[i] + self.q;
            self.pos_vel_covariance[i] += self.vel_variance[i];
            self.vel_variance[i] += self.q;
        }
    }

    fn update(&mut self, measurement: &Vector4<f64>) {
        for i in 0..4 {
            let s = self.pos_variance[i] + self.r;
            let k_pos = self.pos_variance[i] / s;
            let k_vel = self.pos_vel_covariance[i] / s;
            let error = measurement[i] - self.pos[i];

            self.pos[i] += k_pos * error;
            self.vel[i] += k_vel * error;

            let pos_vel = self.pos_vel_covariance[i];
            self.vel_variance[i] -= k_vel * pos_vel;
            self.pos_vel_covariance[i] = (1.0 - k_pos) * pos_vel;
            self.pos_variance[i] *= 1.0 - k_pos;
        }
    }

    fn get_state(&self) -> Vector4<f64> {
        self.pos
    }

    fn get_velocity(&self) -> Vector4<f64> {
        self.vel
    }

    fn position_variance(&self) -> Vector4<f64> {
        self.pos_variance
    }

    fn gating_distance(&self, measurement: &Vector4<f64>) -> f64 {
        (0..4)
            .map(|i| {
                let d = measurement[i] - self.pos[i];
                d * d / (self.pos_variance[i] + self.r)
            })
            .sum()
    }
}

/// Factory for creating [`DiagonalKalmanFilter`] instances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagonalKalmanFilterFactory {
    /// Measurement noise variance
    pub r: f64,
    /// Process noise variance
    pub q: f64,
    /// Initial position variance
    pub p_pos: f64,
    /// Initial velocity variance
    pub p_vel: f64,
}

impl DiagonalKalmanFilterFactory {
    pub fn new(r: f64, q: f64, p_pos: f64, p_vel: f64) -> Self {
        Self { r, q, p_pos, p_vel }
    }

    pub fn create(&self, initial: &Vector4<f64>) -> DiagonalKalmanFilter {
        DiagonalKalmanFilter::new(initial, self.r, self.q, self.p_pos, self.p_vel)
    }

    pub fn validate(&self) -> Result<()> {
        validate_noise(&[("r", self.r), ("q", self.q), ("p_pos", self.p_pos), ("p_vel", self.p_vel)])
    }
}

impl Default for DiagonalKalmanFilterFactory {
    fn default() -> Self {
        Self::new(1e-4, 1e-5, 1e-4, 1e-3)
    }
}
