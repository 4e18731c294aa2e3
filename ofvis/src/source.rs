//! # Frame sources

use crate::prelude::v1::*;

/// Ordered, restartable sequence of colour frames.
pub trait FrameSource {
    /// Read the next frame of the stream.
    ///
    /// Returns `Ok(None)` once the stream is exhausted. End of stream is not an error.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Rewind the stream so that the next [`read`](FrameSource::read) yields the first frame.
    fn seek_to_start(&mut self) -> Result<()>;

    /// Get the native frame dimensions of the stream, if known.
    fn dimensions(&self) -> Option<(usize, usize)>;

    /// Get the total number of frames in the stream, if known.
    fn frame_count(&self) -> Option<usize>;

    /// Get the framerate of the stream.
    ///
    /// This will return `Some(framerate)` if it is known. Image sequences and synthetic streams
    /// usually do not have one.
    fn framerate(&self) -> Option<f64> {
        None
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn read(&mut self) -> Result<Option<Frame>> {
        (**self).read()
    }

    fn seek_to_start(&mut self) -> Result<()> {
        (**self).seek_to_start()
    }

    fn dimensions(&self) -> Option<(usize, usize)> {
        (**self).dimensions()
    }

    fn frame_count(&self) -> Option<usize> {
        (**self).frame_count()
    }

    fn framerate(&self) -> Option<f64> {
        (**self).framerate()
    }
}

/// Frame source backed by frames held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    frames: Vec<Frame>,
    pos: usize,
    framerate: Option<f64>,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            pos: 0,
            framerate: None,
        }
    }

    /// Attach a nominal framerate to the stream.
    pub fn with_framerate(self, framerate: f64) -> Self {
        Self {
            framerate: Some(framerate),
            ..self
        }
    }
}

impl From<Vec<Frame>> for MemorySource {
    fn from(frames: Vec<Frame>) -> Self {
        Self::new(frames)
    }
}

impl FrameSource for MemorySource {
    fn read(&mut self) -> Result<Option<Frame>> {
        let frame = self.frames.get(self.pos).cloned();
        if frame.is_some() {
            self.pos += 1;
        }
        Ok(frame)
    }

    fn seek_to_start(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn dimensions(&self) -> Option<(usize, usize)> {
        self.frames.first().map(|f| {
            let (w, h) = f.dimensions();
            (w as usize, h as usize)
        })
    }

    fn frame_count(&self) -> Option<usize> {
        Some(self.frames.len())
    }

    fn framerate(&self) -> Option<f64> {
        self.framerate
    }
}
