//! # Flow to colour encoding
//!
//! Direction becomes hue and magnitude becomes brightness, with saturation at its maximum.

use crate::frame::Frame;
use crate::motion_field::MotionField;
use image::{Rgb, RgbImage};

/// Convert an 8-bit HSV triple to RGB.
///
/// Hue is in the `0..180` range (two degrees per step), saturation and value in `0..=255`.
pub fn hsv_to_rgb(h: u8, s: u8, v: u8) -> [u8; 3] {
    let s = f32::from(s) / 255.0;
    let v = f32::from(v) / 255.0;

    let mut h = f32::from(h) * 2.0 / 60.0;
    if h >= 6.0 {
        h -= 6.0;
    }

    let sector = h.floor();
    let f = h - sector;

    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match sector as u8 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    [r, g, b].map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8)
}

/// Render a motion field as a colour image.
///
/// The angle of each vector is folded into the 8-bit hue range, and its magnitude is min-max
/// normalised over the whole field into the value channel. A field without any magnitude spread
/// renders black.
pub fn flow_to_color(field: &MotionField) -> Frame {
    let (width, height) = field.dim();
    let polar = field.polar().collect::<Vec<_>>();

    let (min, max) = polar
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &(m, _)| {
            (min.min(m), max.max(m))
        });

    let range = max - min;
    let scale = if range > f32::EPSILON {
        255.0 / range
    } else {
        0.0
    };

    let mut out = RgbImage::new(width as u32, height as u32);

    for ((magnitude, angle), pixel) in polar.into_iter().zip(out.pixels_mut()) {
        let hue = (angle.to_degrees() / 2.0).round() as u32 % 180;
        let value = ((magnitude - min) * scale).round().clamp(0.0, 255.0);
        *pixel = Rgb(hsv_to_rgb(hue as u8, 255, value as u8));
    }

    out
}
