//! # Salient point selection
//!
//! Corners are ranked by the smaller eigenvalue of the local gradient structure tensor (Shi and
//! Tomasi, "Good Features to Track").

use nalgebra as na;
use ofvis::imgproc::{box_filter, sobel};
use ofvis::prelude::v1::*;

/// Parameters of corner selection.
#[derive(Clone, Debug)]
pub struct CornerDetector {
    max_corners: usize,
    quality_level: f32,
    min_distance: f32,
}

impl Default for CornerDetector {
    fn default() -> Self {
        Self {
            max_corners: 100,
            quality_level: 0.3,
            min_distance: 7.0,
        }
    }
}

impl CornerDetector {
    /// Set the maximum number of returned corners.
    pub fn max_corners(self, max_corners: usize) -> Self {
        Self {
            max_corners,
            ..self
        }
    }

    /// Set the minimum response relative to the strongest corner.
    pub fn quality_level(self, quality_level: f32) -> Self {
        Self {
            quality_level: quality_level.clamp(0.0, 1.0),
            ..self
        }
    }

    /// Set the minimum euclidean distance between two returned corners.
    pub fn min_distance(self, min_distance: f32) -> Self {
        Self {
            min_distance: min_distance.max(0.0),
            ..self
        }
    }

    /// Find corners in a grayscale plane.
    ///
    /// Corners are returned strongest first. A plane without any texture yields no corners.
    pub fn detect(&self, img: &Plane) -> Vec<na::Point2<f32>> {
        let response = min_eigen_response(img);
        let (rows, cols) = response.shape();

        let max = response.iter().copied().fold(0f32, f32::max);

        if max <= 0.0 || rows < 3 || cols < 3 {
            return vec![];
        }

        let threshold = max * self.quality_level;
        let value = |y: usize, x: usize| {
            let v = response[(y, x)];
            if v > threshold {
                v
            } else {
                0.0
            }
        };

        // Non-zero local maxima of the thresholded response, one pixel away from the borders.
        let mut candidates = vec![];

        for y in 1..rows - 1 {
            for x in 1..cols - 1 {
                let v = value(y, x);

                if v <= 0.0 {
                    continue;
                }

                let is_max = (y - 1..=y + 1)
                    .flat_map(|ny| (x - 1..=x + 1).map(move |nx| (ny, nx)))
                    .all(|(ny, nx)| value(ny, nx) <= v);

                if is_max {
                    candidates.push((v, x, y));
                }
            }
        }

        candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then((a.2, a.1).cmp(&(b.2, b.1))));

        let min_dist2 = self.min_distance * self.min_distance;
        let mut corners: Vec<na::Point2<f32>> = vec![];

        for (_, x, y) in candidates {
            if corners.len() >= self.max_corners {
                break;
            }

            let p = na::Point2::new(x as f32, y as f32);

            if corners.iter().all(|c| (c - p).norm_squared() >= min_dist2) {
                corners.push(p);
            }
        }

        corners
    }
}

/// Smaller eigenvalue of the gradient covariance over every 3x3 block.
pub fn min_eigen_response(img: &Plane) -> Plane {
    let (dx, dy) = sobel(img);

    let dxx = box_filter(&dx.component_mul(&dx), 3);
    let dxy = box_filter(&dx.component_mul(&dy), 3);
    let dyy = box_filter(&dy.component_mul(&dy), 3);

    Plane::from_fn(img.nrows(), img.ncols(), |y, x| {
        let a = dxx[(y, x)] * 0.5;
        let b = dxy[(y, x)];
        let c = dyy[(y, x)] * 0.5;
        ((a + c) - ((a - c) * (a - c) + b * b).sqrt()).max(0.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squares() -> Plane {
        Plane::from_fn(64, 64, |y, x| {
            if (16..32).contains(&x) && (16..32).contains(&y) {
                200.0
            } else if (40..56).contains(&x) && (36..52).contains(&y) {
                120.0
            } else {
                20.0
            }
        })
    }

    #[test]
    fn uniform_plane_has_no_corners() {
        let detector = CornerDetector::default();
        assert!(detector.detect(&Plane::repeat(32, 32, 77.0)).is_empty());
        assert!(detector.detect(&Plane::zeros(2, 2)).is_empty());
    }

    #[test]
    fn response_is_zero_on_edges() {
        let img = Plane::from_fn(16, 16, |_, x| if x < 8 { 0.0 } else { 100.0 });
        let response = min_eigen_response(&img);
        // Rounding only, compared to a gradient covariance in the tens of thousands.
        assert!(response[(8, 8)] < 0.1);
        assert!(response[(8, 7)] < 0.1);
    }

    #[test]
    fn square_corners() {
        let corners = CornerDetector::default().detect(&squares());

        assert!(!corners.is_empty());
        assert!(corners.len() <= 100);

        // Every corner of the bright square is found.
        for (cx, cy) in [(16.0, 16.0), (31.0, 16.0), (16.0, 31.0), (31.0, 31.0)] {
            let target = na::Point2::new(cx, cy);
            assert!(
                corners.iter().any(|c| (c - target).norm() < 2.5),
                "{:?} missing from {:?}",
                target,
                corners
            );
        }

        for (i, a) in corners.iter().enumerate() {
            for b in &corners[i + 1..] {
                assert!((a - b).norm() >= 7.0);
            }
        }
    }

    #[test]
    fn corner_limits() {
        let img = squares();

        let one = CornerDetector::default().max_corners(1).detect(&img);
        assert_eq!(one.len(), 1);

        let all = CornerDetector::default()
            .quality_level(0.01)
            .min_distance(1.0)
            .detect(&img);
        let few = CornerDetector::default().detect(&img);
        assert!(all.len() >= few.len());
    }
}
