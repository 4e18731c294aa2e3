//! # Optical Flow Visualisation Library
//!
//! This library turns pairs of consecutive video frames into visual motion summaries: a
//! highlighted frame difference, or an optical flow field rendered as a colour image. Flow
//! estimators live in their own crates and plug in through the [`Estimator`](estimator::Estimator)
//! trait, while [`Pipeline`](pipeline::Pipeline) drives a [`FrameSource`](source::FrameSource)
//! into a [`FrameSink`](sink::FrameSink).
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use ofvis::prelude::v1::*;
//! ```

pub mod color;
pub mod config;
pub mod detection;
pub mod draw;
pub mod error;
pub mod estimator;
pub mod frame;
pub mod imgproc;
pub mod motion_field;
pub mod pipeline;
pub mod sink;
pub mod source;

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            color::flow_to_color,
            config::{Config, Mode},
            detection::DifferenceDetector,
            error::FlowError,
            estimator::{Estimator, FlowOutput},
            frame::{Frame, FramePair, GrayFrame, Plane},
            motion_field::MotionField,
            pipeline::{Pipeline, PipelineState, RunSummary},
            sink::{FileSink, FrameSink, Progress, SinkStatus},
            source::{FrameSource, MemorySource},
        };
        pub use anyhow::{anyhow, Error, Result};
    }
}
