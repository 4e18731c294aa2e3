//! # Image filtering primitives
//!
//! All filters operate on floating point [`Plane`]s and, unless stated otherwise, extend the
//! image past its edges by reflection without repeating the edge sample (`gfedcb|abcdefgh|gfedcba`).

use crate::frame::Plane;

/// Map a possibly out-of-range coordinate back into `0..len` by reflection.
pub fn reflect_101(mut i: isize, len: usize) -> usize {
    let len = len as isize;

    if len == 1 {
        return 0;
    }

    loop {
        if i < 0 {
            i = -i;
        } else if i >= len {
            i = 2 * len - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Clamp a possibly out-of-range coordinate to `0..len`.
pub fn replicate(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

/// Build a normalised 1D Gaussian kernel.
///
/// A non-positive `sigma` is derived from the kernel size. Sizes up to 7 then use fixed binomial
/// taps, larger ones `sigma = 0.3 * ((ksize - 1) * 0.5 - 1) + 0.8`.
///
/// # Arguments
///
/// * `ksize` - odd kernel size.
/// * `sigma` - standard deviation of the Gaussian.
pub fn gaussian_kernel(ksize: usize, sigma: f32) -> Vec<f32> {
    assert!(ksize % 2 == 1, "kernel size must be odd");

    if sigma <= 0.0 {
        let fixed: Option<&[f32]> = match ksize {
            1 => Some(&[1.0]),
            3 => Some(&[0.25, 0.5, 0.25]),
            5 => Some(&[0.0625, 0.25, 0.375, 0.25, 0.0625]),
            7 => Some(&[
                0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
            ]),
            _ => None,
        };

        if let Some(fixed) = fixed {
            return fixed.to_vec();
        }
    }

    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };

    let half = (ksize / 2) as isize;
    let scale = -0.5 / (sigma * sigma);

    let mut kernel = (-half..=half)
        .map(|x| ((x * x) as f32 * scale).exp())
        .collect::<Vec<_>>();

    let sum = kernel.iter().sum::<f32>();
    kernel.iter_mut().for_each(|k| *k /= sum);

    kernel
}

/// Convolve rows and then columns with 1D kernels.
///
/// Kernels are applied as correlations and must have odd lengths.
pub fn separable_filter(src: &Plane, kx: &[f32], ky: &[f32]) -> Plane {
    let (rows, cols) = src.shape();
    let hx = (kx.len() / 2) as isize;
    let hy = (ky.len() / 2) as isize;

    let horizontal = Plane::from_fn(rows, cols, |y, x| {
        kx.iter()
            .enumerate()
            .map(|(i, k)| k * src[(y, reflect_101(x as isize + i as isize - hx, cols))])
            .sum()
    });

    Plane::from_fn(rows, cols, |y, x| {
        ky.iter()
            .enumerate()
            .map(|(i, k)| k * horizontal[(reflect_101(y as isize + i as isize - hy, rows), x)])
            .sum()
    })
}

/// Gaussian blur with a square kernel.
///
/// # Arguments
///
/// * `src` - plane to blur.
/// * `ksize` - odd kernel size.
/// * `sigma` - standard deviation, derived from `ksize` if zero.
pub fn gaussian_blur(src: &Plane, ksize: usize, sigma: f32) -> Plane {
    let kernel = gaussian_kernel(ksize, sigma);
    separable_filter(src, &kernel, &kernel)
}

/// Normalised box filter of a square window.
pub fn box_filter(src: &Plane, ksize: usize) -> Plane {
    let kernel = vec![1.0 / ksize as f32; ksize];
    separable_filter(src, &kernel, &kernel)
}

/// Horizontal and vertical 3x3 Sobel derivatives.
pub fn sobel(src: &Plane) -> (Plane, Plane) {
    const SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];
    const DIFF: [f32; 3] = [-1.0, 0.0, 1.0];

    (
        separable_filter(src, &DIFF, &SMOOTH),
        separable_filter(src, &SMOOTH, &DIFF),
    )
}

/// Horizontal and vertical 3x3 Scharr derivatives, scaled to intensity units per pixel.
pub fn scharr(src: &Plane) -> (Plane, Plane) {
    const SMOOTH: [f32; 3] = [3.0 / 32.0, 10.0 / 32.0, 3.0 / 32.0];
    const DIFF: [f32; 3] = [-1.0, 0.0, 1.0];

    (
        separable_filter(src, &DIFF, &SMOOTH),
        separable_filter(src, &SMOOTH, &DIFF),
    )
}

/// Sample a plane at fractional coordinates with bilinear interpolation.
///
/// Coordinates outside of the plane are clamped to its edge.
pub fn bilinear(src: &Plane, x: f32, y: f32) -> f32 {
    let (rows, cols) = src.shape();

    let x = x.clamp(0.0, (cols - 1) as f32);
    let y = y.clamp(0.0, (rows - 1) as f32);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(cols - 1);
    let y1 = (y0 + 1).min(rows - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let top = src[(y0, x0)] * (1.0 - fx) + src[(y0, x1)] * fx;
    let bottom = src[(y1, x0)] * (1.0 - fx) + src[(y1, x1)] * fx;

    top * (1.0 - fy) + bottom * fy
}

/// Resize a plane with bilinear interpolation.
///
/// Pixel centres are aligned, so destination `x` samples source `(x + 0.5) * scale - 0.5`.
pub fn resize_plane(src: &Plane, width: usize, height: usize) -> Plane {
    let (rows, cols) = src.shape();

    if (cols, rows) == (width, height) {
        return src.clone();
    }

    let sx = cols as f32 / width as f32;
    let sy = rows as f32 / height as f32;

    Plane::from_fn(height, width, |y, x| {
        bilinear(
            src,
            (x as f32 + 0.5) * sx - 0.5,
            (y as f32 + 0.5) * sy - 0.5,
        )
    })
}

/// Blur with a 5x5 binomial kernel and drop every other row and column.
///
/// The result is `((width + 1) / 2, (height + 1) / 2)` in size.
pub fn pyr_down(src: &Plane) -> Plane {
    let blurred = gaussian_blur(src, 5, 0.0);
    let (rows, cols) = src.shape();

    Plane::from_fn((rows + 1) / 2, (cols + 1) / 2, |y, x| blurred[(y * 2, x * 2)])
}
