//! # Sparse optical flow by pyramidal Lucas-Kanade tracking
//!
//! Salient corners are picked in the first frame and followed into the second one by solving the
//! Lucas-Kanade equations over a square window, coarse to fine on an image pyramid (Bouguet,
//! "Pyramidal Implementation of the Lucas Kanade Feature Tracker").
//!
//! The tracker renders the result directly: tracks are drawn as green lines and their end points
//! as red dots on top of the second frame.

use image::Rgb;
use log::*;
use nalgebra as na;
use ofvis::draw::{draw_filled_circle, draw_line, saturating_add};
use ofvis::frame::plane_dim;
use ofvis::imgproc::{bilinear, pyr_down, scharr};
use ofvis::prelude::v1::*;

pub mod corners;

pub use corners::CornerDetector;

const TRACK_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const POINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// A point of the first frame and the place it was tracked to in the second.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence {
    pub from: na::Point2<f32>,
    pub to: na::Point2<f32>,
    /// Whether tracking converged on a point inside the frame.
    pub valid: bool,
}

impl Correspondence {
    pub fn motion(&self) -> na::Vector2<f32> {
        self.to - self.from
    }
}

/// Pyramidal Lucas-Kanade point tracker.
#[derive(Clone, Debug)]
pub struct LucasKanadeTracker {
    corners: CornerDetector,
    /// Side of the square search window.
    win_size: usize,
    /// Number of pyramid levels above the full resolution one.
    max_level: usize,
    /// Maximum refinement iterations per level.
    max_iters: usize,
    /// Step length under which the refinement stops.
    epsilon: f32,
    /// Minimum eigenvalue of the mean gradient covariance for a point to be trackable.
    min_eigen: f32,
}

impl Default for LucasKanadeTracker {
    fn default() -> Self {
        Self {
            corners: CornerDetector::default(),
            win_size: 15,
            max_level: 2,
            max_iters: 10,
            epsilon: 0.03,
            min_eigen: 1e-2,
        }
    }
}

impl LucasKanadeTracker {
    pub fn corners(self, corners: CornerDetector) -> Self {
        Self { corners, ..self }
    }

    /// Set the search window size. Even sizes are rounded up.
    pub fn win_size(self, win_size: usize) -> Self {
        Self {
            win_size: win_size.max(3) | 1,
            ..self
        }
    }

    pub fn max_level(self, max_level: usize) -> Self {
        Self { max_level, ..self }
    }

    pub fn max_iters(self, max_iters: usize) -> Self {
        Self {
            max_iters: max_iters.max(1),
            ..self
        }
    }

    pub fn epsilon(self, epsilon: f32) -> Self {
        Self { epsilon, ..self }
    }

    pub fn min_eigen(self, min_eigen: f32) -> Self {
        Self { min_eigen, ..self }
    }

    /// Select corners in the first frame of the pair and track them into the second.
    pub fn track(&self, pair: &FramePair) -> Result<Vec<Correspondence>> {
        let (prev, next) = pair.gray_planes();
        let points = self.corners.detect(&prev);

        if points.is_empty() {
            debug!("No trackable points");
            return Ok(vec![]);
        }

        self.track_points(&prev, &next, &points)
    }

    /// Track the given points from `prev` into `next`.
    ///
    /// # Arguments
    ///
    /// * `prev` - first grayscale frame.
    /// * `next` - second grayscale frame, same size as `prev`.
    /// * `points` - pixel positions in `prev` to track.
    pub fn track_points(
        &self,
        prev: &Plane,
        next: &Plane,
        points: &[na::Point2<f32>],
    ) -> Result<Vec<Correspondence>> {
        FlowError::check_dims(plane_dim(prev), plane_dim(next))?;

        let prev_pyr = self.pyramid(prev);
        let next_pyr = self.pyramid(next);

        let grads = prev_pyr.iter().map(scharr).collect::<Vec<_>>();

        let levels = prev_pyr.len();

        let (width, height) = plane_dim(prev);

        let ret = points
            .iter()
            .map(|&from| {
                let mut to = from / (1 << (levels - 1)) as f32;
                let mut valid = true;

                for level in (0..levels).rev() {
                    let level_from = from / (1 << level) as f32;

                    if level != levels - 1 {
                        to *= 2.0;
                    }

                    let (gx, gy) = &grads[level];

                    let tracked =
                        self.track_level(&prev_pyr[level], &next_pyr[level], gx, gy, level_from, to);

                    match tracked {
                        Some(p) => to = p,
                        None if level == 0 => valid = false,
                        None => {}
                    }
                }

                valid = valid
                    && to.x >= 0.0
                    && to.y >= 0.0
                    && to.x <= (width - 1) as f32
                    && to.y <= (height - 1) as f32;

                Correspondence { from, to, valid }
            })
            .collect::<Vec<_>>();

        debug!(
            "Tracked {}/{} points",
            ret.iter().filter(|c| c.valid).count(),
            ret.len()
        );

        Ok(ret)
    }

    /// Build the image pyramid, stopping before a level gets smaller than the window.
    fn pyramid(&self, img: &Plane) -> Vec<Plane> {
        let mut pyr = vec![img.clone()];

        for _ in 0..self.max_level {
            let down = pyr_down(&pyr[pyr.len() - 1]);

            if down.nrows() <= self.win_size || down.ncols() <= self.win_size {
                break;
            }

            pyr.push(down);
        }

        pyr
    }

    /// Refine the position of a single point on one pyramid level.
    ///
    /// Returns `None` if the point can not be tracked on this level, in which case the estimate
    /// is left as it was.
    fn track_level(
        &self,
        prev: &Plane,
        next: &Plane,
        gx: &Plane,
        gy: &Plane,
        from: na::Point2<f32>,
        mut to: na::Point2<f32>,
    ) -> Option<na::Point2<f32>> {
        let half = (self.win_size / 2) as isize;
        let area = (self.win_size * self.win_size) as f32;
        let (width, height) = plane_dim(prev);

        let outside = |p: na::Point2<f32>| {
            let w = self.win_size as f32;
            p.x < -w || p.y < -w || p.x >= width as f32 || p.y >= height as f32
        };

        if outside(from) {
            return None;
        }

        let offsets = (-half..=half)
            .flat_map(|y| (-half..=half).map(move |x| na::Vector2::new(x as f32, y as f32)))
            .collect::<Vec<_>>();

        // Template and its gradients, sampled once.
        let template = offsets
            .iter()
            .map(|o| {
                let p = from + o;
                (
                    bilinear(prev, p.x, p.y),
                    bilinear(gx, p.x, p.y),
                    bilinear(gy, p.x, p.y),
                )
            })
            .collect::<Vec<_>>();

        let (a11, a12, a22) = template.iter().fold((0.0, 0.0, 0.0), |(a, b, c), &(_, ix, iy)| {
            (a + ix * ix, b + ix * iy, c + iy * iy)
        });

        let det = a11 * a22 - a12 * a12;
        let min_eig =
            (a22 + a11 - ((a11 - a22) * (a11 - a22) + 4.0 * a12 * a12).sqrt()) / (2.0 * area);

        if min_eig < self.min_eigen || det < f32::EPSILON {
            return None;
        }

        let mut prev_delta = na::Vector2::zeros();

        for i in 0..self.max_iters {
            if outside(to) {
                return None;
            }

            let (b1, b2) = offsets.iter().zip(&template).fold(
                (0.0, 0.0),
                |(b1, b2), (o, &(i0, ix, iy))| {
                    let p = to + o;
                    let diff = bilinear(next, p.x, p.y) - i0;
                    (b1 + diff * ix, b2 + diff * iy)
                },
            );

            let delta = na::Vector2::new(a12 * b2 - a22 * b1, a12 * b1 - a11 * b2) / det;

            to += delta;

            if delta.norm_squared() <= self.epsilon * self.epsilon {
                break;
            }

            // Oscillating between two positions, settle in the middle.
            if i > 0 && (delta + prev_delta).norm() < 0.01 {
                to -= delta * 0.5;
                break;
            }

            prev_delta = delta;
        }

        Some(to)
    }
}

/// Draw the valid correspondences on top of a frame.
///
/// Tracks are drawn as 2 pixel wide lines on a separate layer that is added to the frame after
/// the end points have been marked.
pub fn draw_tracks(frame: &Frame, correspondences: &[Correspondence]) -> Result<Frame> {
    let (w, h) = frame.dimensions();
    let mut mask = Frame::new(w, h);
    let mut out = frame.clone();

    for c in correspondences.iter().filter(|c| c.valid) {
        let from = (c.from.x as i32, c.from.y as i32);
        let to = (c.to.x as i32, c.to.y as i32);

        draw_line(&mut mask, from, to, TRACK_COLOR, 2);
        draw_filled_circle(&mut out, to, 5, POINT_COLOR);
    }

    saturating_add(&out, &mask)
}

impl Estimator for LucasKanadeTracker {
    fn estimate(&mut self, pair: &FramePair) -> Result<FlowOutput> {
        let correspondences = self.track(pair)?;

        if correspondences.is_empty() {
            return Ok(FlowOutput::Overlay(pair.current().clone()));
        }

        draw_tracks(pair.current(), &correspondences).map(FlowOutput::Overlay)
    }
}
