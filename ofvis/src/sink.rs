//! # Output sinks

use crate::prelude::v1::*;
use log::*;
use std::path::Path;
use std::time::Duration;

/// Whether a sink still accepts frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkStatus {
    Open,
    /// The sink went away (for instance, its window was closed) and the run should stop.
    Closed,
}

/// Batch progress report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Progress {
    /// Frames processed so far.
    pub processed: usize,
    /// Total number of frames in the stream, if known.
    pub total: Option<usize>,
    /// Time spent so far.
    pub elapsed: Duration,
}

impl Progress {
    /// Estimated time left, extrapolated from the average time per frame.
    pub fn eta(&self) -> Option<Duration> {
        let total = self.total?;

        if self.processed == 0 {
            return None;
        }

        let left = total.saturating_sub(self.processed) as f64;
        let per_frame = self.elapsed.as_secs_f64() / self.processed as f64;

        Some(Duration::from_secs_f64(left * per_frame))
    }

    /// Completed fraction in `[0, 1]`, if the total is known.
    pub fn fraction(&self) -> Option<f32> {
        self.total
            .filter(|&t| t > 0)
            .map(|t| (self.processed as f32 / t as f32).min(1.0))
    }
}

/// Destination of rendered images.
pub trait FrameSink {
    /// Show an image live.
    ///
    /// Sinks without a screen accept the image and do nothing.
    fn display(&mut self, image: &Frame) -> Result<SinkStatus>;

    /// Write an image to durable storage under the given path.
    ///
    /// Failures are reported as [`FlowError::WriteError`].
    fn persist(&mut self, image: &Frame, path: &Path) -> Result<()>;

    /// Report batch progress.
    fn progress(&mut self, _progress: &Progress) {}
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn display(&mut self, image: &Frame) -> Result<SinkStatus> {
        (**self).display(image)
    }

    fn persist(&mut self, image: &Frame, path: &Path) -> Result<()> {
        (**self).persist(image, path)
    }

    fn progress(&mut self, progress: &Progress) {
        (**self).progress(progress)
    }
}

/// Write an image as a file, creating parent directories as needed.
///
/// The format is picked from the file extension.
pub fn save_image(image: &Frame, path: &Path) -> Result<()> {
    let write = || -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        image.save(path)?;
        Ok(())
    };

    write().map_err(|source| {
        FlowError::WriteError {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// Headless sink that only writes files and logs progress.
#[derive(Clone, Debug, Default)]
pub struct FileSink {
    written: usize,
}

impl FileSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of images written so far.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl FrameSink for FileSink {
    fn display(&mut self, _image: &Frame) -> Result<SinkStatus> {
        Ok(SinkStatus::Open)
    }

    fn persist(&mut self, image: &Frame, path: &Path) -> Result<()> {
        save_image(image, path)?;
        self.written += 1;
        info!("Image saved: {}", path.display());
        Ok(())
    }

    fn progress(&mut self, progress: &Progress) {
        match (progress.total, progress.eta()) {
            (Some(total), Some(eta)) => info!(
                "Processed {}/{} frames, ETA {:.0}s",
                progress.processed,
                total,
                eta.as_secs_f64()
            ),
            (Some(total), None) => info!("Processed {}/{} frames", progress.processed, total),
            _ => info!("Processed {} frames", progress.processed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use image::Rgb;

    #[test]
    fn eta_extrapolates() {
        let progress = Progress {
            processed: 10,
            total: Some(40),
            elapsed: Duration::from_secs(5),
        };
        assert_approx_eq!(progress.eta().unwrap().as_secs_f64(), 15.0, 1e-9);
        assert_approx_eq!(progress.fraction().unwrap(), 0.25);

        let unknown = Progress {
            total: None,
            ..progress
        };
        assert!(unknown.eta().is_none());
        assert!(unknown.fraction().is_none());

        let start = Progress {
            processed: 0,
            ..progress
        };
        assert!(start.eta().is_none());
    }

    #[test]
    fn file_sink_writes_png() {
        let dir = std::env::temp_dir().join(format!("ofvis-sink-{}", std::process::id()));
        let path = dir.join("nested").join("motion_0.png");

        let image = Frame::from_pixel(4, 3, Rgb([10, 20, 30]));
        let mut sink = FileSink::new();
        assert_eq!(sink.display(&image).unwrap(), SinkStatus::Open);
        sink.persist(&image, &path).unwrap();
        assert_eq!(sink.written(), 1);

        let loaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded, image);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unwritable_path_is_write_error() {
        let dir = std::env::temp_dir().join(format!("ofvis-sink-err-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        // A regular file where a directory is expected.
        let blocker = dir.join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let err = FileSink::new()
            .persist(&Frame::new(2, 2), &blocker.join("out.png"))
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::WriteError { .. })
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
