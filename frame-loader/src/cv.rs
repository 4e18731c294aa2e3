//! OpenCV video decoding and window display.

use log::*;
use ofvis::prelude::v1::*;
use ofvis::sink::save_image;
use opencv::core::{Mat, Scalar, Vec3b, CV_8UC3};
use opencv::highgui;
use opencv::prelude::*;
use opencv::videoio::*;
use std::path::Path;

const ESC: i32 = 27;

/// Frame source decoding a video file with OpenCV.
pub struct CvVideoSource {
    capture: VideoCapture,
    frame: Mat,
}

impl CvVideoSource {
    pub fn open(input: &str) -> Result<Self> {
        let capture = VideoCapture::from_file(input, CAP_ANY)?;

        if !capture.is_opened()? {
            return Err(FlowError::SourceUnavailable(format!("cannot open video {input}")).into());
        }

        Ok(Self {
            capture,
            frame: Default::default(),
        })
    }

    fn property(&self, prop: i32) -> Option<f64> {
        self.capture.get(prop).ok().filter(|&v| v > 0.0)
    }
}

impl FrameSource for CvVideoSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        if !self.capture.read(&mut self.frame)? || self.frame.rows() == 0 {
            return Ok(None);
        }

        let (w, h) = (self.frame.cols(), self.frame.rows());
        let mut out = Frame::new(w as u32, h as u32);

        for y in 0..h {
            for x in 0..w {
                let bgr: &Vec3b = self.frame.at_2d(y, x)?;
                out.put_pixel(x as u32, y as u32, image::Rgb([bgr[2], bgr[1], bgr[0]]));
            }
        }

        Ok(Some(out))
    }

    fn seek_to_start(&mut self) -> Result<()> {
        if !self.capture.set(CAP_PROP_POS_FRAMES, 0.0)? {
            warn!("Video backend refused to seek to the first frame");
        }
        Ok(())
    }

    fn dimensions(&self) -> Option<(usize, usize)> {
        Some((
            self.property(CAP_PROP_FRAME_WIDTH)? as usize,
            self.property(CAP_PROP_FRAME_HEIGHT)? as usize,
        ))
    }

    fn frame_count(&self) -> Option<usize> {
        self.property(CAP_PROP_FRAME_COUNT).map(|c| c as usize)
    }

    fn framerate(&self) -> Option<f64> {
        self.property(CAP_PROP_FPS)
    }
}

/// Sink that shows every rendered image in a window and writes snapshots to files.
///
/// The sink reports [`SinkStatus::Closed`] once ESC is pressed or the window is closed.
pub struct CvDisplaySink {
    window: String,
    opened: bool,
    written: usize,
}

impl CvDisplaySink {
    pub fn new(window: impl Into<String>) -> Self {
        Self {
            window: window.into(),
            opened: false,
            written: 0,
        }
    }

    /// Number of images written so far.
    pub fn written(&self) -> usize {
        self.written
    }
}

fn to_mat(image: &Frame) -> Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(
        image.height() as i32,
        image.width() as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )?;

    for (x, y, px) in image.enumerate_pixels() {
        let bgr: &mut Vec3b = mat.at_2d_mut(y as i32, x as i32)?;
        bgr[0] = px[2];
        bgr[1] = px[1];
        bgr[2] = px[0];
    }

    Ok(mat)
}

impl FrameSink for CvDisplaySink {
    fn display(&mut self, image: &Frame) -> Result<SinkStatus> {
        // Once shown, a window that is no longer visible was closed by the user.
        if self.opened
            && highgui::get_window_property(&self.window, highgui::WND_PROP_VISIBLE)? < 1.0
        {
            info!("Window closed");
            return Ok(SinkStatus::Closed);
        }

        highgui::imshow(&self.window, &to_mat(image)?)?;
        self.opened = true;

        if highgui::wait_key(1)? == ESC {
            info!("ESC pressed");
            return Ok(SinkStatus::Closed);
        }

        Ok(SinkStatus::Open)
    }

    fn persist(&mut self, image: &Frame, path: &Path) -> Result<()> {
        save_image(image, path)?;
        self.written += 1;
        info!("Image saved: {}", path.display());
        Ok(())
    }

    fn progress(&mut self, progress: &Progress) {
        match progress.eta() {
            Some(eta) => info!(
                "Processed {} frames, ETA {:.0}s",
                progress.processed,
                eta.as_secs_f64()
            ),
            None => info!("Processed {} frames", progress.processed),
        }
    }
}

impl Drop for CvDisplaySink {
    fn drop(&mut self) {
        if self.opened {
            let _ = highgui::destroy_window(&self.window);
        }
    }
}
