//! Motion model: Kalman filters over bounding boxes.
//!
//! This module provides:
//! - `KalmanFilter` - full 8x8 covariance constant-velocity filter
//! - `DiagonalKalmanFilter` - per-dimension covariance, cheaper per target
//! - `FilterEnum` / `FilterFactoryEnum` - static dispatch over both

mod traits;
mod kalman;
mod diagonal;
mod dispatch;

pub use traits::Filter;
pub use kalman::{KalmanFilter, KalmanFilterFactory};
pub use diagonal::{DiagonalKalmanFilter, DiagonalKalmanFilterFactory};
pub use dispatch::{FilterEnum, FilterFactoryEnum};

/// 0.95 quantile of the chi-square distribution with 4 degrees of freedom,
/// the gate for squared Mahalanobis distances over `[cx, cy, w, h]`.
pub const CHI2INV95_4DOF: f64 = 9.4877;
