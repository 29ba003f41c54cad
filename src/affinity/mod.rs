//! Affinity scoring between tracked targets and new detections.
//!
//! This module provides:
//! - `AffinityScorer` - builds the targets x detections cost matrix
//! - `AppearanceMetric` - descriptor distance selectable by name
//! - Built-in appearance distance functions (cosine, euclidean)

mod functions;

pub use functions::*;

use std::fmt;
use std::str::FromStr;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::bbox::FrameGeometry;
use crate::detection::Detectable;
use crate::filter::CHI2INV95_4DOF;
use crate::target::TrackTarget;
use crate::{Error, Result};

/// Cost assigned to pairs that must never be matched.
///
/// Finite so the assignment solver stays well defined; the solver discards
/// any pair at or above it.
pub const PROHIBITIVE_COST: f64 = 1e5;

/// Distance between appearance descriptors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppearanceMetric {
    /// `1 - cos(a, b)`, range `[0, 2]`
    #[default]
    Cosine,
    /// L2 distance
    Euclidean,
}

impl AppearanceMetric {
    /// Look up a metric by name (`"cosine"` or `"euclidean"`).
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "cosine" => Ok(AppearanceMetric::Cosine),
            "euclidean" => Ok(AppearanceMetric::Euclidean),
            _ => Err(Error::UnknownMetric(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AppearanceMetric::Cosine => "cosine",
            AppearanceMetric::Euclidean => "euclidean",
        }
    }

    pub fn function(&self) -> fn(&[f64], &[f64]) -> f64 {
        match self {
            AppearanceMetric::Cosine => cosine_distance,
            AppearanceMetric::Euclidean => euclidean_distance,
        }
    }

    #[inline]
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        (self.function())(a, b)
    }
}

impl FromStr for AppearanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::by_name(s)
    }
}

impl fmt::Display for AppearanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pairwise cost between predicted targets and detections (lower is better).
///
/// For a target `t` and detection `d`:
///
/// ```text
/// spatial    = 1 - IoU(t.bbox, d.bbox)
/// appearance = min over t's descriptor history of metric(h, d.descriptor)
/// cost       = (1 - w) * spatial + w * appearance   (w = appearance_weight)
/// ```
///
/// The appearance term is only used when the weight is positive and both
/// sides carry comparable descriptors; otherwise `cost = spatial`.
///
/// A pair receives [`PROHIBITIVE_COST`] when its IoU is below `min_iou`, when
/// its appearance distance exceeds `max_appearance_distance`, or (with
/// `mahalanobis_gating`) when the detection falls outside the target's 95%
/// motion gate.
#[derive(Clone, Debug, PartialEq)]
pub struct AffinityScorer {
    pub min_iou: f64,
    pub appearance_weight: f64,
    pub max_appearance_distance: f64,
    pub metric: AppearanceMetric,
    pub mahalanobis_gating: bool,
}

impl Default for AffinityScorer {
    fn default() -> Self {
        Self {
            min_iou: 0.3,
            appearance_weight: 0.0,
            max_appearance_distance: 0.4,
            metric: AppearanceMetric::Cosine,
            mahalanobis_gating: false,
        }
    }
}

impl AffinityScorer {
    /// Build the `targets.len() x detections.len()` cost matrix.
    ///
    /// Target boxes are expected to already hold this frame's prediction.
    pub fn cost_matrix<D: Detectable>(
        &self,
        targets: &[&TrackTarget],
        detections: &[&D],
        geometry: &FrameGeometry,
    ) -> DMatrix<f64> {
        DMatrix::from_fn(targets.len(), detections.len(), |i, j| {
            self.pair_cost(targets[i], detections[j], geometry)
        })
    }

    fn pair_cost<D: Detectable>(&self, target: &TrackTarget, detection: &D, geometry: &FrameGeometry) -> f64 {
        let bbox = detection.bbox();

        let iou = target.bbox.iou(&bbox);
        if iou < self.min_iou {
            return PROHIBITIVE_COST;
        }

        if self.mahalanobis_gating
            && target.filter.gating_distance(&geometry.normalize(&bbox)) > CHI2INV95_4DOF
        {
            return PROHIBITIVE_COST;
        }

        let spatial = 1.0 - iou;
        if self.appearance_weight <= 0.0 {
            return spatial;
        }

        let appearance = detection
            .descriptor()
            .and_then(|query| nearest_distance(&target.descriptors, query, self.metric.function()));

        match appearance {
            Some(d) if d > self.max_appearance_distance => PROHIBITIVE_COST,
            Some(d) => (1.0 - self.appearance_weight) * spatial + self.appearance_weight * d,
            None => spatial,
        }
    }
}
