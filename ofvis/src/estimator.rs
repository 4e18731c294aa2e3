//! # Motion estimator interface

use crate::color::flow_to_color;
use crate::prelude::v1::*;

/// Result of running an estimator on a frame pair.
#[derive(Clone, Debug)]
pub enum FlowOutput {
    /// Dense per-pixel motion, which still needs to be colour encoded.
    Field(MotionField),
    /// Image that is ready to be shown as it is.
    Overlay(Frame),
}

impl FlowOutput {
    /// Turn the output into an image for the sink.
    ///
    /// Motion fields go through [`flow_to_color`], overlays are returned unchanged.
    pub fn render(self) -> Frame {
        match self {
            FlowOutput::Field(field) => flow_to_color(&field),
            FlowOutput::Overlay(frame) => frame,
        }
    }

    /// Get the motion field, if this output has one.
    pub fn field(&self) -> Option<&MotionField> {
        match self {
            FlowOutput::Field(field) => Some(field),
            FlowOutput::Overlay(_) => None,
        }
    }
}

/// Generic frame pair motion estimator
///
/// Every mode of the pipeline (difference highlight and all the optical flow methods) implements
/// this trait, and the pipeline calls it once per frame pair.
pub trait Estimator {
    /// Estimate motion between the two frames of a pair.
    ///
    /// # Arguments
    ///
    /// * `pair` - previous and current frame, guaranteed to be of equal size.
    fn estimate(&mut self, pair: &FramePair) -> Result<FlowOutput>;
}

impl<T: Estimator + ?Sized> Estimator for Box<T> {
    fn estimate(&mut self, pair: &FramePair) -> Result<FlowOutput> {
        (**self).estimate(pair)
    }
}
