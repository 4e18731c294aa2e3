//! # Drawing helpers for overlays

use crate::error::FlowError;
use crate::frame::{frame_dim, Frame};
use anyhow::Result;
use image::{Rgb, RgbImage};

/// Set a pixel if it lies inside the image.
fn put_clipped(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Draw a filled circle, clipped to the image.
pub fn draw_filled_circle(img: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>) {
    let (cx, cy) = center;
    let r2 = radius * radius;

    for y in (cy - radius)..=(cy + radius) {
        for x in (cx - radius)..=(cx + radius) {
            if (x - cx).pow(2) + (y - cy).pow(2) <= r2 {
                put_clipped(img, x, y, color);
            }
        }
    }
}

/// Draw a line segment with Bresenham's algorithm, clipped to the image.
///
/// Lines thicker than one pixel stamp a disc of `thickness / 2` radius at every step.
pub fn draw_line(
    img: &mut RgbImage,
    from: (i32, i32),
    to: (i32, i32),
    color: Rgb<u8>,
    thickness: i32,
) {
    let (mut x0, mut y0) = from;
    let (x1, y1) = to;

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let radius = thickness / 2;

    loop {
        if radius > 0 {
            draw_filled_circle(img, (x0, y0), radius, color);
        } else {
            put_clipped(img, x0, y0, color);
        }

        if x0 == x1 && y0 == y1 {
            break;
        }

        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Add two images channel-wise, saturating at 255.
pub fn saturating_add(a: &Frame, b: &Frame) -> Result<Frame> {
    FlowError::check_dims(frame_dim(a), frame_dim(b))?;

    let mut out = a.clone();
    for (o, p) in out.pixels_mut().zip(b.pixels()) {
        for c in 0..3 {
            o[c] = o[c].saturating_add(p[c]);
        }
    }

    Ok(out)
}
