//! Common `FrameSource` and `Estimator` loader.

use farneback_estimator::FarnebackEstimator;
use horn_schunck_estimator::HornSchunckEstimator;
use log::*;
use lucas_kanade_tracker::LucasKanadeTracker;
use ofvis::prelude::v1::*;
use std::path::Path;

mod sequence;
pub use sequence::ImageSequence;

#[cfg(feature = "opencv")]
mod cv;
#[cfg(feature = "opencv")]
pub use cv::{CvDisplaySink, CvVideoSource};

/// Create a frame source depending on the input.
///
/// A directory is read as a sequence of image files in name order. Any other existing path is
/// treated as a video file, which requires the `opencv` feature.
pub fn create_source(input: &str) -> Result<Box<dyn FrameSource>> {
    let path = Path::new(input);

    if path.is_dir() {
        debug!("Opening {} as an image sequence", path.display());
        return Ok(Box::new(ImageSequence::open(path)?));
    }

    if !path.exists() {
        return Err(FlowError::SourceUnavailable(format!("{input} does not exist")).into());
    }

    open_video(input)
}

#[cfg(feature = "opencv")]
fn open_video(input: &str) -> Result<Box<dyn FrameSource>> {
    debug!("Opening {input} as a video");
    Ok(Box::new(CvVideoSource::open(input)?))
}

#[cfg(not(feature = "opencv"))]
fn open_video(input: &str) -> Result<Box<dyn FrameSource>> {
    Err(FlowError::SourceUnavailable(format!(
        "{input} is not a directory, and video decoding needs the opencv feature"
    ))
    .into())
}

/// Create the estimator that implements a mode.
///
/// Horn-Schunck takes its smoothness weight and iteration count from `config`. Every other
/// estimator runs with its default parameters.
pub fn create_estimator(mode: Mode, config: &Config) -> Box<dyn Estimator> {
    match mode {
        Mode::Difference => Box::new(DifferenceDetector::default()),
        Mode::Farneback => Box::new(FarnebackEstimator::default()),
        Mode::LucasKanade => Box::new(LucasKanadeTracker::default()),
        Mode::HornSchunck => Box::new(
            HornSchunckEstimator::default()
                .alpha(config.alpha)
                .iterations(config.iterations),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn pair() -> FramePair {
        let prev = Frame::from_fn(40, 40, |x, y| {
            if (10..20).contains(&x) && (10..20).contains(&y) {
                Rgb([220, 220, 220])
            } else {
                Rgb([30, 30, 30])
            }
        });
        let next = Frame::from_fn(40, 40, |x, y| {
            if (12..22).contains(&x) && (10..20).contains(&y) {
                Rgb([220, 220, 220])
            } else {
                Rgb([30, 30, 30])
            }
        });
        FramePair::new(prev, next).unwrap()
    }

    #[test]
    fn missing_input_is_unavailable() {
        let err = create_source("/definitely/not/a/real/input.mp4")
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn every_mode_renders_a_frame() {
        let config = Config {
            iterations: 5,
            ..Default::default()
        };
        let pair = pair();

        for mode in Mode::ALL {
            let mut estimator = create_estimator(mode, &config);
            let image = estimator.estimate(&pair).unwrap().render();
            assert_eq!(image.dimensions(), (40, 40), "{mode}");
        }
    }

    #[test]
    fn only_flow_modes_yield_fields() {
        let pair = pair();
        let config = Config::default();

        let mut difference = create_estimator(Mode::Difference, &config);
        assert!(difference.estimate(&pair).unwrap().field().is_none());

        let mut hs = create_estimator(Mode::HornSchunck, &config);
        assert!(hs.estimate(&pair).unwrap().field().is_some());
    }
}
