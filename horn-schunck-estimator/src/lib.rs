//! # Horn-Schunck optical flow
//!
//! Dense flow from "Determining Optical Flow" by Berthold Horn and Brian Schunck. The flow field
//! minimises the brightness constancy error plus `alpha²` times its own spatial variation. The
//! minimum is approached with Jacobi iterations, each of which reads only the field of the
//! previous iteration.

use log::*;
use ofvis::frame::plane_dim;
use ofvis::imgproc::{box_filter, sobel};
use ofvis::prelude::v1::*;

/// Iterative global smoothness optical flow estimator.
#[derive(Clone, Debug)]
pub struct HornSchunckEstimator {
    alpha: f32,
    iterations: usize,
}

impl Default for HornSchunckEstimator {
    fn default() -> Self {
        Self {
            alpha: 10.0,
            iterations: 100,
        }
    }
}

impl HornSchunckEstimator {
    /// Set the smoothness weight.
    ///
    /// Larger values give smoother fields that follow the image data less closely.
    pub fn alpha(self, alpha: f32) -> Self {
        Self { alpha, ..self }
    }

    /// Set the number of update sweeps.
    pub fn iterations(self, iterations: usize) -> Self {
        Self { iterations, ..self }
    }

    /// Compute the flow field from `prev` to `next`.
    ///
    /// # Arguments
    ///
    /// * `prev` - first grayscale frame.
    /// * `next` - second grayscale frame, same size as `prev`.
    pub fn estimate_flow(&self, prev: &Plane, next: &Plane) -> Result<MotionField> {
        FlowError::check_dims(plane_dim(prev), plane_dim(next))?;

        if !(self.alpha > 0.0) {
            return Err(anyhow!("alpha must be positive, got {}", self.alpha));
        }

        // Spatial derivatives of both frames together, temporal difference between them.
        let (gx1, gy1) = sobel(prev);
        let (gx2, gy2) = sobel(next);

        let fx = gx1 + gx2;
        let fy = gy1 + gy2;
        let ft = next - prev;

        // Never zero for a positive alpha.
        let den = (fx.component_mul(&fx) + fy.component_mul(&fy))
            .add_scalar(self.alpha * self.alpha);

        let (rows, cols) = prev.shape();
        let mut u = Plane::zeros(rows, cols);
        let mut v = Plane::zeros(rows, cols);

        for _ in 0..self.iterations {
            let u_avg = box_filter(&u, 3);
            let v_avg = box_filter(&v, 3);

            let num = fx.component_mul(&u_avg) + fy.component_mul(&v_avg) + &ft;
            let ratio = num.component_div(&den);

            u = u_avg - fx.component_mul(&ratio);
            v = v_avg - fy.component_mul(&ratio);
        }

        trace!(
            "Horn-Schunck alpha {} after {} iterations: max |u| {}, max |v| {}",
            self.alpha,
            self.iterations,
            u.amax(),
            v.amax()
        );

        MotionField::from_components(&u, &v)
    }
}

impl Estimator for HornSchunckEstimator {
    fn estimate(&mut self, pair: &FramePair) -> Result<FlowOutput> {
        let (prev, next) = pair.gray_planes();
        self.estimate_flow(&prev, &next).map(FlowOutput::Field)
    }
}
