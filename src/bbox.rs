//! Bounding box geometry and frame normalization.

use nalgebra::Vector4;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates.
///
/// `(x, y)` is the top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Create a box from `[center_x, center_y, width, height]`.
    ///
    /// Negative sizes (possible after a motion prediction) are clamped to zero.
    pub fn from_center_form(v: &Vector4<f64>) -> Self {
        let width = v[2].max(0.0);
        let height = v[3].max(0.0);
        Self::new(v[0] - width / 2.0, v[1] - height / 2.0, width, height)
    }

    /// `[center_x, center_y, width, height]`
    pub fn to_center_form(&self) -> Vector4<f64> {
        let (cx, cy) = self.center();
        Vector4::new(cx, cy, self.width, self.height)
    }

    /// `[x1, y1, x2, y2]`
    pub fn to_tlbr(&self) -> [f64; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// A box with non-positive width or height cannot take part in association.
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Intersection over union with another box, in `[0, 1]`.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let [a_x1, a_y1, a_x2, a_y2] = self.to_tlbr();
        let [b_x1, b_y1, b_x2, b_y2] = other.to_tlbr();

        let inter_w = (a_x2.min(b_x2) - a_x1.max(b_x1)).max(0.0);
        let inter_h = (a_y2.min(b_y2) - a_y1.max(b_y1)).max(0.0);
        let inter_area = inter_w * inter_h;

        let union_area = self.area() + other.area() - inter_area;
        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

/// Frame dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Converts between pixel boxes and the normalized `[cx, cy, w, h]` space the
/// motion model runs in. Coordinates are divided by the frame width (x, w) and
/// height (y, h).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameGeometry {
    scale: Vector4<f64>,
}

impl FrameGeometry {
    pub fn new(size: ImageSize) -> Self {
        let w = f64::from(size.width.max(1));
        let h = f64::from(size.height.max(1));
        Self {
            scale: Vector4::new(w, h, w, h),
        }
    }

    /// Geometry that leaves coordinates untouched.
    pub fn identity() -> Self {
        Self {
            scale: Vector4::repeat(1.0),
        }
    }

    pub fn normalize(&self, bbox: &BoundingBox) -> Vector4<f64> {
        bbox.to_center_form().component_div(&self.scale)
    }

    pub fn denormalize(&self, state: &Vector4<f64>) -> BoundingBox {
        BoundingBox::from_center_form(&state.component_mul(&self.scale))
    }

    /// Scale a normalized rate (e.g. velocity) back to pixels per frame.
    pub fn denormalize_rate(&self, rate: &Vector4<f64>) -> Vector4<f64> {
        rate.component_mul(&self.scale)
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self::identity()
    }
}
