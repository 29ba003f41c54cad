//! Enum-based filter dispatch for static (non-virtual) function calls.
//!
//! `FilterEnum` and `FilterFactoryEnum` wrap all supported filter types and
//! dispatch without vtable lookups on the per-frame hot path.

use nalgebra::Vector4;
use serde::{Deserialize, Serialize};

use super::diagonal::{DiagonalKalmanFilter, DiagonalKalmanFilterFactory};
use super::kalman::{KalmanFilter, KalmanFilterFactory};
use super::traits::Filter;
use crate::Result;

/// Enum-based filter for static dispatch.
#[derive(Clone, Debug)]
pub enum FilterEnum {
    Kalman(KalmanFilter),
    Diagonal(DiagonalKalmanFilter),
}

impl FilterEnum {
    #[inline(always)]
    pub fn predict(&mut self) {
        match self {
            FilterEnum::Kalman(f) => f.predict(),
            FilterEnum::Diagonal(f) => f.predict(),
        }
    }

    #[inline(always)]
    pub fn update(&mut self, measurement: &Vector4<f64>) {
        match self {
            FilterEnum::Kalman(f) => f.update(measurement),
            FilterEnum::Diagonal(f) => f.update(measurement),
        }
    }

    #[inline(always)]
    pub fn get_state(&self) -> Vector4<f64> {
        match self {
            FilterEnum::Kalman(f) => f.get_state(),
            FilterEnum::Diagonal(f) => f.get_state(),
        }
    }

    #[inline(always)]
    pub fn get_velocity(&self) -> Vector4<f64> {
        match self {
            FilterEnum::Kalman(f) => f.get_velocity(),
            FilterEnum::Diagonal(f) => f.get_velocity(),
        }
    }

    #[inline(always)]
    pub fn position_variance(&self) -> Vector4<f64> {
        match self {
            FilterEnum::Kalman(f) => f.position_variance(),
            FilterEnum::Diagonal(f) => f.position_variance(),
        }
    }

    #[inline(always)]
    pub fn gating_distance(&self, measurement: &Vector4<f64>) -> f64 {
        match self {
            FilterEnum::Kalman(f) => f.gating_distance(measurement),
            FilterEnum::Diagonal(f) => f.gating_distance(measurement),
        }
    }
}

/// Enum-based filter factory, selectable from configuration.
///
/// Serialized with a `kind` tag, e.g. `{"kind": "diagonal", "r": 1e-4}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterFactoryEnum {
    Kalman(KalmanFilterFactory),
    Diagonal(DiagonalKalmanFilterFactory),
}

impl Default for FilterFactoryEnum {
    fn default() -> Self {
        FilterFactoryEnum::Kalman(KalmanFilterFactory::default())
    }
}

impl FilterFactoryEnum {
    /// Create a new filter with static dispatch.
    #[inline(always)]
    pub fn create(&self, initial_measurement: &Vector4<f64>) -> FilterEnum {
        match self {
            FilterFactoryEnum::Kalman(f) => FilterEnum::Kalman(f.create(initial_measurement)),
            FilterFactoryEnum::Diagonal(f) => FilterEnum::Diagonal(f.create(initial_measurement)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            FilterFactoryEnum::Kalman(f) => f.validate(),
            FilterFactoryEnum::Diagonal(f) => f.validate(),
        }
    }
}
