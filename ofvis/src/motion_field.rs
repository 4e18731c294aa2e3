//! # Fixed size motion field

use crate::error::FlowError;
use crate::frame::{plane_dim, Plane};
use anyhow::Result;
use nalgebra::*;

/// Dense optical flow field holding one displacement per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionField {
    vf: Matrix2xX<f32>,
    width: usize,
}

impl MotionField {
    /// Create a new motion field with zero motion everywhere.
    ///
    /// # Arguments
    ///
    /// * `width` - width of the field.
    /// * `height` - height of the field.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            vf: Matrix2xX::repeat(width * height, 0f32),
            width,
        }
    }

    /// Build a field from separate horizontal and vertical components.
    ///
    /// # Arguments
    ///
    /// * `u` - horizontal displacement of every pixel.
    /// * `v` - vertical displacement of every pixel, same size as `u`.
    pub fn from_components(u: &Plane, v: &Plane) -> Result<Self> {
        FlowError::check_dims(plane_dim(u), plane_dim(v))?;

        let (width, height) = plane_dim(u);
        let mut field = Self::new(width, height);

        for y in 0..height {
            for x in 0..width {
                field.set_motion(x, y, Vector2::new(u[(y, x)], v[(y, x)]));
            }
        }

        Ok(field)
    }

    /// Split the field into horizontal and vertical component planes.
    pub fn components(&self) -> (Plane, Plane) {
        let (width, height) = self.dim();
        (
            Plane::from_fn(height, width, |y, x| self.get_motion(x, y).x),
            Plane::from_fn(height, width, |y, x| self.get_motion(x, y).y),
        )
    }

    /// Get width and height of the motion field.
    pub fn dim(&self) -> (usize, usize) {
        if self.width == 0 {
            (0, 0)
        } else {
            (self.width, self.vf.ncols() / self.width)
        }
    }

    /// Get the motion field in row-major order.
    ///
    /// The elements returned are in the following order:
    ///
    /// `field[0,0].x, field[0,0].y, field[0,1].x, ... field[0,N].y, field[1,0].x, ... field[N,N].y`
    pub fn as_slice(&self) -> &[f32] {
        self.vf.as_slice()
    }

    /// Set motion at given position.
    ///
    /// # Arguments
    ///
    /// * `x` - horizontal coordinate to set at.
    /// * `y` - vertical coordinate to set at.
    /// * `motion` - motion to set.
    pub fn set_motion(&mut self, x: usize, y: usize, motion: Vector2<f32>) {
        self.vf.set_column(self.width * y + x, &motion);
    }

    /// Get motion at coordinates.
    ///
    /// # Arguments
    ///
    /// * `x` - horizontal coordinate.
    /// * `y` - vertical coordinate.
    pub fn get_motion(&self, x: usize, y: usize) -> Vector2<f32> {
        self.vf.column(self.width * y + x).into()
    }

    /// Scale every vector by a constant factor.
    pub fn scale(&mut self, factor: f32) {
        self.vf *= factor;
    }

    /// Iterate every element of the motion field.
    ///
    /// The resulting iterator yields `(x, y, motion)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, Vector2<f32>)> + '_ {
        let (width, height) = self.dim();
        (0..height).flat_map(move |y| (0..width).map(move |x| (x, y, self.get_motion(x, y))))
    }

    /// Convert every vector to polar form.
    ///
    /// The resulting iterator yields `(magnitude, angle)` pairs in row-major order, with angles in
    /// radians within `[0, 2π)`.
    pub fn polar(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.vf.column_iter().map(|c| {
            let (dx, dy) = (c[0], c[1]);
            let magnitude = dx.hypot(dy);
            let mut angle = dy.atan2(dx);
            if angle < 0.0 {
                angle += std::f32::consts::TAU;
            }
            (magnitude, angle)
        })
    }

    /// Average motion over a rectangular region.
    ///
    /// # Arguments
    ///
    /// * `x` - range of columns to average over.
    /// * `y` - range of rows to average over.
    pub fn mean_motion(
        &self,
        x: std::ops::Range<usize>,
        y: std::ops::Range<usize>,
    ) -> Vector2<f32> {
        let count = x.len() * y.len();

        if count == 0 {
            return Vector2::zeros();
        }

        let sum = y
            .flat_map(|y| x.clone().map(move |x| (x, y)))
            .map(|(x, y)| self.get_motion(x, y))
            .fold(Vector2::zeros(), |acc, m| acc + m);

        sum / count as f32
    }
}
