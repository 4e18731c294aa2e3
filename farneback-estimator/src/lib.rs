//! # Dense optical flow by polynomial expansion
//!
//! Implementation of "Two-Frame Motion Estimation Based on Polynomial Expansion" by Gunnar
//! Farnebäck.
//!
//! Every neighbourhood of both frames is approximated by a quadratic polynomial. If the second
//! frame is a translated copy of the first, the displacement follows from the change of the
//! linear coefficients. The estimate is refined iteratively on an image pyramid, coarse to fine,
//! and the per-pixel equations are averaged over a square window to make the solution robust.

use log::*;
use nalgebra as na;
use ofvis::frame::plane_dim;
use ofvis::imgproc::{gaussian_blur, replicate, resize_plane};
use ofvis::prelude::v1::*;

/// Pyramid levels smaller than this (in either dimension) are not used.
const MIN_SIZE: f32 = 32.0;

/// Attenuation of the equations near the frame borders.
const BORDER: [f32; 5] = [0.14, 0.14, 0.4472, 0.4472, 0.4472];

/// Dense Farnebäck optical flow estimator.
#[derive(Clone, Debug)]
pub struct FarnebackEstimator {
    /// Scale between consecutive pyramid levels.
    pyr_scale: f32,
    /// Maximum number of coarser levels on top of the full resolution one.
    levels: usize,
    /// Side of the averaging window.
    win_size: usize,
    /// Refinement iterations on every level.
    iterations: usize,
    /// Radius of the polynomial expansion neighbourhood.
    poly_n: usize,
    /// Standard deviation of the expansion weights.
    poly_sigma: f32,
}

impl Default for FarnebackEstimator {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            win_size: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

impl FarnebackEstimator {
    pub fn pyr_scale(self, pyr_scale: f32) -> Self {
        Self {
            pyr_scale: pyr_scale.clamp(0.1, 0.9),
            ..self
        }
    }

    pub fn levels(self, levels: usize) -> Self {
        Self { levels, ..self }
    }

    /// Set the averaging window size. Even sizes are rounded up.
    pub fn win_size(self, win_size: usize) -> Self {
        Self {
            win_size: win_size | 1,
            ..self
        }
    }

    pub fn iterations(self, iterations: usize) -> Self {
        Self {
            iterations: iterations.max(1),
            ..self
        }
    }

    pub fn poly_n(self, poly_n: usize) -> Self {
        Self {
            poly_n: poly_n.max(1),
            ..self
        }
    }

    pub fn poly_sigma(self, poly_sigma: f32) -> Self {
        Self { poly_sigma, ..self }
    }

    /// Number of coarser pyramid levels usable for a frame of the given size.
    fn pyramid_levels(&self, width: usize, height: usize) -> usize {
        let mut scale = 1.0;

        for level in 0..self.levels {
            scale *= self.pyr_scale;
            if (width as f32) * scale < MIN_SIZE || (height as f32) * scale < MIN_SIZE {
                return level;
            }
        }

        self.levels
    }

    /// Compute the flow field from `prev` to `next`.
    ///
    /// The vector at `(x, y)` points to where the content of `prev` at that pixel moved to in
    /// `next`.
    ///
    /// # Arguments
    ///
    /// * `prev` - first grayscale frame.
    /// * `next` - second grayscale frame, same size as `prev`.
    pub fn estimate_flow(&self, prev: &Plane, next: &Plane) -> Result<MotionField> {
        FlowError::check_dims(plane_dim(prev), plane_dim(next))?;

        let (width, height) = plane_dim(prev);

        if width == 0 || height == 0 {
            return Ok(MotionField::new(width, height));
        }

        let kernel = ExpansionKernel::new(self.poly_n, self.poly_sigma)?;
        let levels = self.pyramid_levels(width, height);

        debug!("Farneback on {}x{} with {} levels", width, height, levels + 1);

        let mut flow: Option<(Plane, Plane)> = None;

        for level in (0..=levels).rev() {
            let scale = self.pyr_scale.powi(level as i32);
            let sigma = (1.0 / scale - 1.0) * 0.5;
            let smooth_size = (((sigma * 5.0).round() as usize) | 1).max(3);

            let lw = ((width as f32 * scale).round() as usize).max(1);
            let lh = ((height as f32 * scale).round() as usize).max(1);

            let (mut u, mut v) = match flow.take() {
                Some((u, v)) => (
                    resize_plane(&u, lw, lh) / self.pyr_scale,
                    resize_plane(&v, lw, lh) / self.pyr_scale,
                ),
                None => (Plane::zeros(lh, lw), Plane::zeros(lh, lw)),
            };

            let expand = |img: &Plane| {
                let smoothed = gaussian_blur(img, smooth_size, sigma);
                kernel.expand(&resize_plane(&smoothed, lw, lh))
            };

            let r0 = expand(prev);
            let r1 = expand(next);

            let mut equations = update_matrices(&r0, &r1, &u, &v);

            for i in 0..self.iterations {
                solve_flow(&equations, self.win_size, &mut u, &mut v);

                if i + 1 < self.iterations {
                    equations = update_matrices(&r0, &r1, &u, &v);
                }
            }

            flow = Some((u, v));
        }

        let (u, v) = flow.ok_or_else(|| anyhow!("no pyramid levels processed"))?;

        MotionField::from_components(&u, &v)
    }
}

impl Estimator for FarnebackEstimator {
    fn estimate(&mut self, pair: &FramePair) -> Result<FlowOutput> {
        let (prev, next) = pair.gray_planes();
        self.estimate_flow(&prev, &next).map(FlowOutput::Field)
    }
}

/// Quadratic polynomial coefficients of every pixel neighbourhood.
///
/// Per pixel the entries are the linear `y` and `x` terms, then the `yy`, `xx` and `xy` terms.
/// The constant term is not needed and not stored.
struct Expansion {
    width: usize,
    height: usize,
    coeffs: Vec<[f32; 5]>,
}

impl Expansion {
    fn at(&self, x: usize, y: usize) -> &[f32; 5] {
        &self.coeffs[y * self.width + x]
    }
}

/// Separable Gaussian weights of the expansion, and the entries of the inverted normal equations
/// they lead to.
struct ExpansionKernel {
    g: Vec<f32>,
    xg: Vec<f32>,
    xxg: Vec<f32>,
    ig11: f32,
    ig03: f32,
    ig33: f32,
    ig55: f32,
}

impl ExpansionKernel {
    fn new(n: usize, sigma: f32) -> Result<Self> {
        let sigma = if sigma < f32::EPSILON {
            n as f32 * 0.3
        } else {
            sigma
        };

        let scale = -0.5 / (f64::from(sigma) * f64::from(sigma));

        let mut g = (0..=n)
            .map(|x| ((x * x) as f64 * scale).exp())
            .collect::<Vec<_>>();

        let sum = g[0] + 2.0 * g[1..].iter().sum::<f64>();
        g.iter_mut().for_each(|v| *v /= sum);

        let weight = |i: isize| g[i.unsigned_abs()];

        // Normal equations of the basis 1, x, y, x^2, y^2, xy under the weights.
        let mut gm = na::Matrix6::<f64>::zeros();
        let n = n as isize;

        for y in -n..=n {
            for x in -n..=n {
                let w = weight(y) * weight(x);
                let (xf, yf) = (x as f64, y as f64);
                gm[(0, 0)] += w;
                gm[(1, 1)] += w * xf * xf;
                gm[(3, 3)] += w * xf.powi(4);
                gm[(5, 5)] += w * xf * xf * yf * yf;
            }
        }

        let g11 = gm[(1, 1)];
        gm[(2, 2)] = g11;
        gm[(0, 3)] = g11;
        gm[(0, 4)] = g11;
        gm[(3, 0)] = g11;
        gm[(4, 0)] = g11;
        gm[(4, 4)] = gm[(3, 3)];
        gm[(3, 4)] = gm[(5, 5)];
        gm[(4, 3)] = gm[(5, 5)];

        let inv = gm
            .try_inverse()
            .ok_or_else(|| anyhow!("polynomial expansion with n = {} is degenerate", n))?;

        Ok(Self {
            xg: g
                .iter()
                .enumerate()
                .map(|(x, g)| (x as f64 * g) as f32)
                .collect(),
            xxg: g
                .iter()
                .enumerate()
                .map(|(x, g)| ((x * x) as f64 * g) as f32)
                .collect(),
            g: g.iter().map(|&g| g as f32).collect(),
            ig11: inv[(1, 1)] as f32,
            ig03: inv[(0, 3)] as f32,
            ig33: inv[(3, 3)] as f32,
            ig55: inv[(5, 5)] as f32,
        })
    }

    fn n(&self) -> usize {
        self.g.len() - 1
    }

    /// Fit polynomials to every neighbourhood of the image.
    ///
    /// Rows and columns outside of the image replicate the nearest edge.
    fn expand(&self, img: &Plane) -> Expansion {
        let (width, height) = plane_dim(img);
        let n = self.n();
        let (g, xg, xxg) = (&self.g, &self.xg, &self.xxg);

        let mut coeffs = Vec::with_capacity(width * height);
        let mut row = vec![[0f32; 3]; width];

        for y in 0..height {
            // Vertical pass: weighted sum, first and second moment along y.
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = [img[(y, x)] * g[0], 0.0, 0.0];

                for k in 1..=n {
                    let up = img[(replicate(y as isize - k as isize, height), x)];
                    let down = img[(replicate((y + k) as isize, height), x)];
                    acc[0] += g[k] * (up + down);
                    acc[1] += xg[k] * (down - up);
                    acc[2] += xxg[k] * (up + down);
                }

                *out = acc;
            }

            // Horizontal pass.
            for x in 0..width {
                let c = row[x];
                let (mut b1, mut b2, mut b3) = (c[0] * g[0], 0.0, c[1] * g[0]);
                let (mut b4, mut b5, mut b6) = (0.0, c[2] * g[0], 0.0);

                for k in 1..=n {
                    let l = row[replicate(x as isize - k as isize, width)];
                    let r = row[replicate((x + k) as isize, width)];

                    let sum = r[0] + l[0];
                    b1 += sum * g[k];
                    b4 += sum * xxg[k];
                    b2 += (r[0] - l[0]) * xg[k];
                    b3 += (r[1] + l[1]) * g[k];
                    b6 += (r[1] - l[1]) * xg[k];
                    b5 += (r[2] + l[2]) * g[k];
                }

                coeffs.push([
                    b3 * self.ig11,
                    b2 * self.ig11,
                    b1 * self.ig03 + b5 * self.ig33,
                    b1 * self.ig03 + b4 * self.ig33,
                    b6 * self.ig55,
                ]);
            }
        }

        Expansion {
            width,
            height,
            coeffs,
        }
    }
}

/// Build the per-pixel displacement equations for the current flow estimate.
///
/// Every entry holds the upper triangle of `AᵀA` followed by `Aᵀb`, where `A` is the average
/// quadratic term of both expansions and `b` the change of the linear term after warping the
/// second expansion by the current flow.
fn update_matrices(r0: &Expansion, r1: &Expansion, u: &Plane, v: &Plane) -> Vec<[f32; 5]> {
    let (width, height) = (r0.width, r0.height);
    let mut out = Vec::with_capacity(width * height);

    for y in 0..height {
        for x in 0..width {
            let p0 = r0.at(x, y);
            let (dx, dy) = (u[(y, x)], v[(y, x)]);

            let fx = x as f32 + dx;
            let fy = y as f32 + dy;
            let (x1, y1) = (fx.floor(), fy.floor());

            let in_bounds =
                x1 >= 0.0 && y1 >= 0.0 && x1 < (width - 1) as f32 && y1 < (height - 1) as f32;

            let (r2, r3, r4, r5, r6) = if in_bounds {
                let (x1, y1) = (x1 as usize, y1 as usize);
                let (ax, ay) = (fx - x1 as f32, fy - y1 as f32);

                let a00 = (1.0 - ax) * (1.0 - ay);
                let a01 = ax * (1.0 - ay);
                let a10 = (1.0 - ax) * ay;
                let a11 = ax * ay;

                let (q00, q01) = (r1.at(x1, y1), r1.at(x1 + 1, y1));
                let (q10, q11) = (r1.at(x1, y1 + 1), r1.at(x1 + 1, y1 + 1));
                let sample = |c: usize| a00 * q00[c] + a01 * q01[c] + a10 * q10[c] + a11 * q11[c];

                (
                    sample(0),
                    sample(1),
                    (p0[2] + sample(2)) * 0.5,
                    (p0[3] + sample(3)) * 0.5,
                    (p0[4] + sample(4)) * 0.25,
                )
            } else {
                (0.0, 0.0, p0[2], p0[3], p0[4] * 0.5)
            };

            let r2 = (p0[0] - r2) * 0.5 + r4 * dy + r6 * dx;
            let r3 = (p0[1] - r3) * 0.5 + r6 * dy + r5 * dx;

            let scale = border_scale(x, width) * border_scale(y, height);

            let (r2, r3, r4, r5, r6) = (r2 * scale, r3 * scale, r4 * scale, r5 * scale, r6 * scale);

            out.push([
                r4 * r4 + r6 * r6,
                (r4 + r5) * r6,
                r5 * r5 + r6 * r6,
                r4 * r2 + r6 * r3,
                r6 * r2 + r5 * r3,
            ]);
        }
    }

    out
}

fn border_scale(i: usize, len: usize) -> f32 {
    let near = BORDER.len();
    let mut scale = 1.0;

    if i < near {
        scale *= BORDER[i];
    }

    if i + near >= len {
        scale *= BORDER[len - i - 1];
    }

    scale
}

/// Average the equations over the window and solve them for the flow.
fn solve_flow(equations: &[[f32; 5]], win_size: usize, u: &mut Plane, v: &mut Plane) {
    let (width, height) = plane_dim(u);
    let half = (win_size / 2) as isize;
    let norm = 1.0 / (win_size * win_size) as f32;

    let sum_window = |data: &[[f32; 5]], x: usize, y: usize, step: (usize, usize)| {
        let mut acc = [0f32; 5];
        for k in -half..=half {
            let (sx, sy) = if step.0 == 1 {
                (replicate(x as isize + k, width), y)
            } else {
                (x, replicate(y as isize + k, height))
            };
            let e = &data[sy * width + sx];
            for c in 0..5 {
                acc[c] += e[c];
            }
        }
        acc
    };

    let vertical = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| sum_window(equations, x, y, (0, 1)))
        .collect::<Vec<_>>();

    for y in 0..height {
        for x in 0..width {
            let m = sum_window(&vertical, x, y, (1, 0)).map(|e| e * norm);
            let [g11, g12, g22, h1, h2] = m;

            let idet = 1.0 / (g11 * g22 - g12 * g12 + 1e-3);

            u[(y, x)] = (g11 * h2 - g12 * h1) * idet;
            v[(y, x)] = (g22 * h1 - g12 * h2) * idet;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn square(x0: usize) -> Plane {
        Plane::from_fn(96, 96, |y, x| {
            if (43..53).contains(&y) && (x0..x0 + 10).contains(&x) {
                255.0
            } else {
                0.0
            }
        })
    }

    fn blob(cx: f32, cy: f32) -> Plane {
        Plane::from_fn(64, 64, |y, x| {
            let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
            200.0 * (-d2 / (2.0 * 36.0)).exp()
        })
    }

    #[test]
    fn level_clamping() {
        let est = FarnebackEstimator::default();
        assert_eq!(est.pyramid_levels(96, 96), 1);
        assert_eq!(est.pyramid_levels(640, 780), 3);
        assert_eq!(est.pyramid_levels(40, 400), 0);
        assert_eq!(est.clone().levels(0).pyramid_levels(640, 780), 0);
    }

    #[test]
    fn expansion_of_plane() {
        let kernel = ExpansionKernel::new(5, 1.2).unwrap();
        assert_approx_eq!(kernel.g[0] + 2.0 * kernel.g[1..].iter().sum::<f32>(), 1.0, 1e-5);

        // I = 3x - 2y has constant linear terms and no quadratic ones.
        let img = Plane::from_fn(32, 32, |y, x| 3.0 * x as f32 - 2.0 * y as f32);
        let exp = kernel.expand(&img);
        let c = exp.at(16, 16);
        assert_approx_eq!(c[0], -2.0, 1e-3);
        assert_approx_eq!(c[1], 3.0, 1e-3);
        assert_approx_eq!(c[4], 0.0, 1e-3);
        assert_approx_eq!(c[2], c[3], 1e-3);
    }

    #[test]
    fn identical_frames_have_no_flow() {
        let img = square(40);
        let field = FarnebackEstimator::default()
            .estimate_flow(&img, &img)
            .unwrap();

        assert_eq!(field.dim(), (96, 96));
        for (_, _, m) in field.iter() {
            assert!(m.norm() < 1e-3, "{:?}", m);
        }
    }

    #[test]
    fn square_translation() {
        let field = FarnebackEstimator::default()
            .estimate_flow(&square(43), &square(48))
            .unwrap();

        // The whole square moves by 5 pixels.
        for y in 44..52 {
            for x in 44..52 {
                let m = field.get_motion(x, y);
                assert_approx_eq!(m.x, 5.0, 1.0);
                assert!(m.y.abs() < 1.0, "{:?} at {}, {}", m, x, y);
            }
        }

        let mean = field.mean_motion(44..52, 44..52);
        assert_approx_eq!(mean.x, 5.0, 0.5);
        assert_approx_eq!(mean.y, 0.0, 0.25);

        // Beyond the reach of the averaging window nothing moves.
        for x in (0..=29).chain(65..96) {
            assert!(field.get_motion(x, 48).norm() < 0.1, "moving at {}", x);
        }

        assert!(field.get_motion(5, 5).norm() < 0.1);
        assert!(field.get_motion(90, 10).norm() < 0.1);
    }

    #[test]
    fn smooth_blob_translation() {
        let field = FarnebackEstimator::default()
            .estimate_flow(&blob(32.0, 32.0), &blob(33.0, 32.0))
            .unwrap();

        let mean = field.mean_motion(28..37, 28..37);
        assert_approx_eq!(mean.x, 1.0, 0.5);
        assert_approx_eq!(mean.y, 0.0, 0.25);
    }

    #[test]
    fn mismatched_frames() {
        let err = FarnebackEstimator::default()
            .estimate_flow(&Plane::zeros(40, 40), &Plane::zeros(40, 41))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn estimator_renders_field() {
        use image::Rgb;

        let a = Frame::from_pixel(48, 40, Rgb([30, 30, 30]));
        let pair = FramePair::new(a.clone(), a).unwrap();
        let output = FarnebackEstimator::default().estimate(&pair).unwrap();
        assert_eq!(output.field().map(|f| f.dim()), Some((48, 40)));
    }
}
