//! Filter traits for the motion model.

use nalgebra::Vector4;

/// Trait for bounding-box motion filters.
///
/// The state is a constant-velocity model over the measurement
/// `[center_x, center_y, width, height]` and its per-frame rate of change.
pub trait Filter: Send + Sync {
    /// Advance the state by one frame without a measurement.
    ///
    /// Uncertainty grows by the process noise on every call.
    fn predict(&mut self);

    /// Correct the state with a matched measurement.
    fn update(&mut self, measurement: &Vector4<f64>);

    /// Current measurement-space estimate `[cx, cy, w, h]`.
    fn get_state(&self) -> Vector4<f64>;

    /// Current rate of change of `[cx, cy, w, h]` per frame.
    fn get_velocity(&self) -> Vector4<f64>;

    /// Variance of each measurement-space component (diagonal of `H P Hᵀ`).
    fn position_variance(&self) -> Vector4<f64>;

    /// Squared Mahalanobis distance between a measurement and the
    /// projected state distribution (measurement noise included).
    fn gating_distance(&self, measurement: &Vector4<f64>) -> f64;
}
