//! # Frame difference motion detector

use crate::frame::{gray_to_plane, luma};
use crate::imgproc::gaussian_blur;
use crate::prelude::v1::*;
use image::{GrayImage, Luma, Rgb};
use log::*;

/// Highlights pixels that changed between two consecutive frames.
///
/// The channel-wise absolute difference of the pair is converted to luma, smoothed with a 5x5
/// Gaussian and thresholded. Active pixels of the current frame are then blended with the
/// highlight colour, while all others are left untouched.
#[derive(Clone, Debug)]
pub struct DifferenceDetector {
    threshold: u8,
    blur_size: usize,
    highlight: Rgb<u8>,
    frame_weight: f32,
}

impl Default for DifferenceDetector {
    fn default() -> Self {
        Self {
            threshold: 20,
            blur_size: 5,
            highlight: Rgb([255, 0, 0]),
            frame_weight: 0.7,
        }
    }
}

impl DifferenceDetector {
    /// Set the smoothed intensity difference at which a pixel becomes active.
    pub fn threshold(self, threshold: u8) -> Self {
        Self { threshold, ..self }
    }

    /// Set the colour active pixels are blended with.
    pub fn highlight(self, highlight: Rgb<u8>) -> Self {
        Self { highlight, ..self }
    }

    /// Set the weight of the original frame in the blend. The highlight gets the remainder.
    pub fn frame_weight(self, frame_weight: f32) -> Self {
        Self {
            frame_weight: frame_weight.clamp(0.0, 1.0),
            ..self
        }
    }

    /// Compute the binary motion mask of a pair.
    ///
    /// Active samples are 255, inactive ones 0.
    pub fn motion_mask(&self, pair: &FramePair) -> GrayImage {
        let (w, h) = pair.current().dimensions();

        let diff = GrayImage::from_fn(w, h, |x, y| {
            let a = pair.previous().get_pixel(x, y).0;
            let b = pair.current().get_pixel(x, y).0;
            let d = [0, 1, 2].map(|c| a[c].abs_diff(b[c]));
            Luma([luma(d)])
        });

        let blurred = gaussian_blur(&gray_to_plane(&diff), self.blur_size, 0.0);
        let threshold = f32::from(self.threshold);

        GrayImage::from_fn(w, h, |x, y| {
            let v = blurred[(y as usize, x as usize)].round();
            Luma([if v >= threshold { 255 } else { 0 }])
        })
    }

    /// Render the current frame with its changed regions highlighted.
    pub fn highlight_frame(&self, pair: &FramePair) -> Frame {
        let mask = self.motion_mask(pair);
        let mut out = pair.current().clone();

        let fw = self.frame_weight;
        let hw = 1.0 - fw;
        let mut active = 0usize;

        for (pixel, m) in out.pixels_mut().zip(mask.pixels()) {
            if m[0] == 0 {
                continue;
            }

            active += 1;

            for c in 0..3 {
                let v = f32::from(pixel[c]) * fw + f32::from(self.highlight[c]) * hw;
                pixel[c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }

        debug!("{} active pixels", active);

        out
    }
}

impl Estimator for DifferenceDetector {
    fn estimate(&mut self, pair: &FramePair) -> Result<FlowOutput> {
        Ok(FlowOutput::Overlay(self.highlight_frame(pair)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_frame(x0: u32) -> Frame {
        Frame::from_fn(32, 32, |x, y| {
            if (x0..x0 + 8).contains(&x) && (12..20).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([10, 40, 90])
            }
        })
    }

    #[test]
    fn identical_frames_are_untouched() {
        let frame = square_frame(4);
        let pair = FramePair::new(frame.clone(), frame.clone()).unwrap();
        let detector = DifferenceDetector::default();

        assert!(detector.motion_mask(&pair).pixels().all(|p| p[0] == 0));
        assert_eq!(detector.highlight_frame(&pair), frame);
    }

    #[test]
    fn moved_square_is_highlighted() {
        let pair = FramePair::new(square_frame(4), square_frame(12)).unwrap();
        let mut detector = DifferenceDetector::default();

        let mask = detector.motion_mask(&pair);
        assert_eq!(mask.get_pixel(6, 15)[0], 255);
        assert_eq!(mask.get_pixel(16, 15)[0], 255);
        assert_eq!(mask.get_pixel(28, 2)[0], 0);

        let out = detector.estimate(&pair).unwrap().render();
        // 0.7 * 255 + 0.3 * 255 for red, 0.7 * 255 for the others.
        let [r, g, b] = out.get_pixel(16, 15).0;
        assert_eq!(r, 255);
        assert!((178..=179).contains(&g) && g == b);
        assert_eq!(out.get_pixel(28, 2).0, [10, 40, 90]);
    }

    #[test]
    fn highlight_colour_and_weight() {
        let pair = FramePair::new(square_frame(4), square_frame(12)).unwrap();

        let solid = DifferenceDetector::default()
            .highlight(Rgb([0, 0, 255]))
            .frame_weight(0.0);
        let out = solid.highlight_frame(&pair);
        assert_eq!(out.get_pixel(16, 15).0, [0, 0, 255]);
        assert_eq!(out.get_pixel(28, 2).0, [10, 40, 90]);

        // Weights above one are clamped, leaving the frame as it is.
        let invisible = DifferenceDetector::default().frame_weight(1.5);
        assert_eq!(invisible.highlight_frame(&pair), square_frame(12));
    }

    #[test]
    fn small_changes_stay_below_threshold() {
        let a = Frame::from_pixel(16, 16, Rgb([100, 100, 100]));
        let b = Frame::from_pixel(16, 16, Rgb([110, 110, 110]));
        let pair = FramePair::new(a, b).unwrap();

        let detector = DifferenceDetector::default();
        assert!(detector.motion_mask(&pair).pixels().all(|p| p[0] == 0));

        let sensitive = DifferenceDetector::default().threshold(10);
        assert!(sensitive.motion_mask(&pair).pixels().all(|p| p[0] == 255));
    }
}
