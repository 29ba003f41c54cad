//! Detections: the per-frame input to the tracker.

use crate::bbox::BoundingBox;
use crate::{Error, Result};

/// Anything a detector produces that the tracker can associate.
///
/// Only the bounding box is required; confidence and appearance
/// descriptor are optional and default to absent.
pub trait Detectable {
    /// Bounding box in pixel coordinates.
    fn bbox(&self) -> BoundingBox;

    /// Detector confidence, used to rank candidates when capacity is limited.
    fn confidence(&self) -> Option<f64> {
        None
    }

    /// Fixed-length appearance descriptor for re-identification.
    fn descriptor(&self) -> Option<&[f64]> {
        None
    }

    /// Caller-side identity, echoed back in events.
    fn detection_id(&self) -> Option<u64> {
        None
    }
}

/// A single observed object in one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Detection {
    /// Bounding box in pixel coordinates.
    pub bbox: BoundingBox,

    /// Optional detector confidence score.
    pub confidence: Option<f64>,

    /// Optional appearance descriptor (embedding) for re-identification.
    pub descriptor: Option<Vec<f64>>,

    /// Optional caller-assigned identifier.
    pub id: Option<u64>,

    /// Frame this detection was produced for.
    pub frame_index: Option<u64>,
}

impl Detection {
    /// Create a detection with only a bounding box.
    pub fn new(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            ..Default::default()
        }
    }

    /// Create a detection from `[x, y, width, height]`.
    pub fn from_xywh(xywh: [f64; 4]) -> Self {
        Self::new(BoundingBox::new(xywh[0], xywh[1], xywh[2], xywh[3]))
    }

    /// Create a detection, rejecting non-finite coordinates and descriptors
    /// of the wrong length.
    ///
    /// Degenerate (zero or negative sized) boxes are accepted here; the
    /// tracker skips them at association time.
    pub fn checked(
        bbox: BoundingBox,
        confidence: Option<f64>,
        descriptor: Option<Vec<f64>>,
        descriptor_len: Option<usize>,
    ) -> Result<Self> {
        if !bbox.is_finite() {
            return Err(Error::InvalidDetection(format!(
                "bounding box has non-finite coordinates: {:?}",
                bbox
            )));
        }

        if let Some(c) = confidence {
            if !c.is_finite() {
                return Err(Error::InvalidDetection(format!("confidence {} is not finite", c)));
            }
        }

        if let (Some(d), Some(expected)) = (descriptor.as_ref(), descriptor_len) {
            if d.len() != expected {
                return Err(Error::InvalidDetection(format!(
                    "descriptor length {} doesn't match expected {}",
                    d.len(),
                    expected
                )));
            }
        }

        Ok(Self {
            bbox,
            confidence,
            descriptor,
            id: None,
            frame_index: None,
        })
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_descriptor(mut self, descriptor: Vec<f64>) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_frame_index(mut self, frame_index: u64) -> Self {
        self.frame_index = Some(frame_index);
        self
    }
}

impl Detectable for Detection {
    fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    fn descriptor(&self) -> Option<&[f64]> {
        self.descriptor.as_deref()
    }

    fn detection_id(&self) -> Option<u64> {
        self.id
    }
}

impl<T: Detectable + ?Sized> Detectable for &T {
    fn bbox(&self) -> BoundingBox {
        (**self).bbox()
    }

    fn confidence(&self) -> Option<f64> {
        (**self).confidence()
    }

    fn descriptor(&self) -> Option<&[f64]> {
        (**self).descriptor()
    }

    fn detection_id(&self) -> Option<u64> {
        (**self).detection_id()
    }
}
