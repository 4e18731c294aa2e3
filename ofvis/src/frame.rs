//! # Frames and the frame pair buffer

use crate::error::FlowError;
use anyhow::Result;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use nalgebra as na;

/// Colour frame, stored in RGB order.
pub type Frame = RgbImage;
/// Single channel 8-bit frame.
pub type GrayFrame = GrayImage;
/// Single channel floating point plane, indexed as `(row, column)`.
pub type Plane = na::DMatrix<f32>;

/// Resize a frame to the working resolution.
///
/// Frames already at the requested size are returned as they are.
pub fn resize_frame(frame: Frame, width: u32, height: u32) -> Frame {
    if frame.dimensions() == (width, height) {
        frame
    } else {
        imageops::resize(&frame, width, height, FilterType::Triangle)
    }
}

/// Luma value of an RGB triple, using the 0.299/0.587/0.114 weights.
pub fn luma(rgb: [u8; 3]) -> u8 {
    let [r, g, b] = rgb.map(f32::from);
    (0.299 * r + 0.587 * g + 0.114 * b).round().min(255.0) as u8
}

/// Convert a colour frame to grayscale.
pub fn to_gray(frame: &Frame) -> GrayFrame {
    let (w, h) = frame.dimensions();
    GrayImage::from_fn(w, h, |x, y| Luma([luma(frame.get_pixel(x, y).0)]))
}

/// Convert a grayscale frame to a floating point plane.
pub fn gray_to_plane(gray: &GrayFrame) -> Plane {
    let (w, h) = gray.dimensions();
    Plane::from_fn(h as usize, w as usize, |y, x| {
        f32::from(gray.get_pixel(x as u32, y as u32)[0])
    })
}

/// Convert a colour frame straight to a floating point luma plane.
pub fn to_plane(frame: &Frame) -> Plane {
    gray_to_plane(&to_gray(frame))
}

/// Width and height of a plane.
pub fn plane_dim(plane: &Plane) -> (usize, usize) {
    (plane.ncols(), plane.nrows())
}

/// Width and height of a frame.
pub fn frame_dim(frame: &Frame) -> (usize, usize) {
    let (w, h) = frame.dimensions();
    (w as usize, h as usize)
}

/// The two most recent frames of the stream.
///
/// Both frames always share the same dimensions.
#[derive(Clone, Debug)]
pub struct FramePair {
    previous: Frame,
    current: Frame,
}

impl FramePair {
    /// Create a new pair.
    ///
    /// # Arguments
    ///
    /// * `previous` - the older frame.
    /// * `current` - the newer frame, which must be the same size as `previous`.
    pub fn new(previous: Frame, current: Frame) -> Result<Self> {
        FlowError::check_dims(frame_dim(&previous), frame_dim(&current))?;
        Ok(Self { previous, current })
    }

    pub fn previous(&self) -> &Frame {
        &self.previous
    }

    pub fn current(&self) -> &Frame {
        &self.current
    }

    /// Get width and height of both frames.
    pub fn dim(&self) -> (usize, usize) {
        frame_dim(&self.current)
    }

    /// Shift the pair forward by one frame.
    ///
    /// The current frame becomes the previous one and `next` becomes current.
    pub fn advance(&mut self, next: Frame) -> Result<()> {
        FlowError::check_dims(self.dim(), frame_dim(&next))?;
        self.previous = std::mem::replace(&mut self.current, next);
        Ok(())
    }

    /// Floating point luma planes of both frames.
    pub fn gray_planes(&self) -> (Plane, Plane) {
        (to_plane(&self.previous), to_plane(&self.current))
    }
}
