//! # Pipeline orchestrator
//!
//! The pipeline pulls frames from a [`FrameSource`], keeps the two most recent ones in a
//! [`FramePair`], runs the selected [`Estimator`] on every pair and hands the rendered image to a
//! [`FrameSink`]. Every `snapshot_interval` processed frames the image is also persisted.
//!
//! Execution is single threaded. The only way to interrupt a run from the outside is the stop
//! handle, which is checked once per step.

use crate::frame::resize_frame;
use crate::prelude::v1::*;
use log::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Current stage of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// The next step reads the two frames of a fresh pair.
    AwaitingFirstPair,
    /// A pair is ready to be processed.
    Running,
    /// The stream ran out and is going to be replayed from the start.
    Looping,
    /// The stream ran out and the run is about to finish.
    Draining,
    Stopped,
}

/// Statistics of a finished (or ongoing) run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Frame pairs processed.
    pub frames: usize,
    /// Snapshots successfully persisted.
    pub snapshots: usize,
    /// Snapshots that failed to persist.
    pub write_failures: usize,
    /// Number of times the stream was replayed from the start.
    pub loops: usize,
}

pub struct Pipeline<S, K> {
    source: S,
    sink: K,
    estimator: Box<dyn Estimator>,
    mode: Mode,
    width: u32,
    height: u32,
    snapshot_interval: usize,
    output_dir: PathBuf,
    max_frames: Option<usize>,
    state: PipelineState,
    pair: Option<FramePair>,
    stop: Arc<AtomicBool>,
    summary: RunSummary,
    started: Option<Instant>,
}

impl<S: FrameSource, K: FrameSink> Pipeline<S, K> {
    /// Create a new pipeline.
    ///
    /// # Arguments
    ///
    /// * `source` - stream of input frames.
    /// * `sink` - destination of rendered images.
    /// * `estimator` - detector or flow estimator to run on every pair.
    /// * `mode` - mode the estimator implements. It picks snapshot names and end-of-stream
    /// behaviour.
    /// * `config` - run configuration.
    pub fn new(
        source: S,
        sink: K,
        estimator: Box<dyn Estimator>,
        mode: Mode,
        config: &Config,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            source,
            sink,
            estimator,
            mode,
            width: config.width,
            height: config.height,
            snapshot_interval: config.snapshot_interval(mode),
            output_dir: config.output_dir.clone(),
            max_frames: config.max_frames,
            state: PipelineState::AwaitingFirstPair,
            pair: None,
            stop: Arc::new(AtomicBool::new(false)),
            summary: RunSummary::default(),
            started: None,
        })
    }

    /// Get a handle that stops the run when set to `true`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Run until the pipeline stops.
    pub fn run(&mut self) -> Result<RunSummary> {
        info!("Starting {} run", self.mode);

        while self.state != PipelineState::Stopped {
            self.step()?;
        }

        info!(
            "Finished {} run: {} frames, {} snapshots, {} failed writes",
            self.mode,
            self.summary.frames,
            self.summary.snapshots,
            self.summary.write_failures
        );

        Ok(self.summary)
    }

    /// Advance the state machine by one step.
    ///
    /// A step in the `Running` state processes exactly one frame pair.
    pub fn step(&mut self) -> Result<PipelineState> {
        if self.state != PipelineState::Stopped && self.stop.load(Ordering::Relaxed) {
            info!("Stop requested");
            self.state = PipelineState::Stopped;
        }

        self.state = match self.state {
            PipelineState::AwaitingFirstPair => self.read_first_pair()?,
            PipelineState::Running => self.process_pair()?,
            PipelineState::Looping => {
                self.source.seek_to_start()?;
                self.summary.loops += 1;
                debug!("Replaying stream ({} loops)", self.summary.loops);
                PipelineState::AwaitingFirstPair
            }
            PipelineState::Draining => {
                info!("Stream exhausted");
                PipelineState::Stopped
            }
            PipelineState::Stopped => PipelineState::Stopped,
        };

        Ok(self.state)
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let (width, height) = (self.width, self.height);
        Ok(self
            .source
            .read()?
            .map(|frame| resize_frame(frame, width, height)))
    }

    fn read_first_pair(&mut self) -> Result<PipelineState> {
        let previous = self.read_frame()?;
        let current = self.read_frame()?;

        match previous.zip(current) {
            Some((previous, current)) => {
                self.pair = Some(FramePair::new(previous, current)?);
                self.started.get_or_insert_with(Instant::now);
                Ok(PipelineState::Running)
            }
            None => Err(FlowError::SourceUnavailable(
                "the stream does not contain two frames".into(),
            )
            .into()),
        }
    }

    fn process_pair(&mut self) -> Result<PipelineState> {
        if let Some(max) = self.max_frames {
            if self.summary.frames >= max {
                info!("Reached the limit of {} frames", max);
                return Ok(PipelineState::Stopped);
            }
        }

        let pair = self
            .pair
            .as_ref()
            .ok_or_else(|| anyhow!("no frame pair to process"))?;

        let image = self.estimator.estimate(pair)?.render();

        let status = self.sink.display(&image)?;

        let frame_idx = self.summary.frames;

        if frame_idx % self.snapshot_interval == 0 {
            self.persist(&image);
        }

        self.summary.frames += 1;
        debug!("Processed frame {}", frame_idx);

        if !self.mode.loops() {
            let progress = Progress {
                processed: self.summary.frames,
                total: self.source.frame_count().map(|n| n.saturating_sub(1)),
                elapsed: self.started.map(|s| s.elapsed()).unwrap_or_default(),
            };
            self.sink.progress(&progress);
        }

        if status == SinkStatus::Closed {
            info!("Sink closed");
            return Ok(PipelineState::Stopped);
        }

        match self.read_frame()? {
            Some(next) => {
                if let Some(pair) = &mut self.pair {
                    pair.advance(next)?;
                }
                Ok(PipelineState::Running)
            }
            None if self.mode.loops() => Ok(PipelineState::Looping),
            None => Ok(PipelineState::Draining),
        }
    }

    fn persist(&mut self, image: &Frame) {
        let path = self
            .output_dir
            .join(self.mode.snapshot_path(self.summary.snapshots));

        match self.sink.persist(image, &path) {
            Ok(()) => self.summary.snapshots += 1,
            Err(e) => {
                // Write failures only affect the current frame.
                error!("{}", e);
                self.summary.write_failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::path::Path;

    #[derive(Default)]
    struct RecordingSink {
        displayed: usize,
        persisted: Vec<PathBuf>,
        progress: Vec<Progress>,
        fail_writes: bool,
        close_after: Option<usize>,
    }

    impl FrameSink for RecordingSink {
        fn display(&mut self, _image: &Frame) -> Result<SinkStatus> {
            self.displayed += 1;
            Ok(match self.close_after {
                Some(n) if self.displayed >= n => SinkStatus::Closed,
                _ => SinkStatus::Open,
            })
        }

        fn persist(&mut self, _image: &Frame, path: &Path) -> Result<()> {
            if self.fail_writes {
                return Err(FlowError::WriteError {
                    path: path.to_path_buf(),
                    source: anyhow!("disk full"),
                }
                .into());
            }
            self.persisted.push(path.to_path_buf());
            Ok(())
        }

        fn progress(&mut self, progress: &Progress) {
            self.progress.push(*progress);
        }
    }

    struct StillEstimator;

    impl Estimator for StillEstimator {
        fn estimate(&mut self, pair: &FramePair) -> Result<FlowOutput> {
            let (w, h) = pair.dim();
            Ok(FlowOutput::Field(MotionField::new(w, h)))
        }
    }

    fn frames(count: u8) -> MemorySource {
        MemorySource::new(
            (0..count)
                .map(|i| {
                    Frame::from_fn(24, 16, |x, _| {
                        if x / 4 == u32::from(i) {
                            Rgb([255, 255, 255])
                        } else {
                            Rgb([0, 0, 0])
                        }
                    })
                })
                .collect(),
        )
    }

    fn config(interval: usize, max_frames: Option<usize>) -> Config {
        Config {
            width: 24,
            height: 16,
            snapshot_interval: Some(interval),
            output_dir: PathBuf::from("out"),
            max_frames,
            ..Default::default()
        }
    }

    #[test]
    fn difference_snapshots_are_numbered() {
        let mut pipeline = Pipeline::new(
            frames(3),
            RecordingSink::default(),
            Box::new(DifferenceDetector::default()),
            Mode::Difference,
            &config(1, Some(3)),
        )
        .unwrap();

        let summary = pipeline.run().unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.snapshots, 3);
        assert_eq!(summary.loops, 1);

        let expected = (0..3)
            .map(|i| Path::new("out").join(format!("motion_{i}.png")))
            .collect::<Vec<_>>();
        assert_eq!(pipeline.sink().persisted, expected);
        assert!(pipeline.sink().progress.is_empty());
    }

    #[test]
    fn difference_mode_loops() {
        let mut pipeline = Pipeline::new(
            frames(3),
            RecordingSink::default(),
            Box::new(DifferenceDetector::default()),
            Mode::Difference,
            &config(50, None),
        )
        .unwrap();

        let states = (0..12)
            .map(|_| pipeline.step().unwrap())
            .collect::<Vec<_>>();

        use PipelineState::*;
        assert_eq!(
            &states[..7],
            &[Running, Running, Looping, AwaitingFirstPair, Running, Running, Looping]
        );
        assert!(!states.contains(&Stopped));
        assert!(pipeline.summary().loops >= 2);
        assert!(pipeline.summary().frames >= 6);
        // Only the very first frame falls on the interval.
        assert_eq!(pipeline.summary().snapshots, 1);
    }

    #[test]
    fn batch_mode_stops_at_end() {
        let mut pipeline = Pipeline::new(
            frames(4),
            RecordingSink::default(),
            Box::new(StillEstimator),
            Mode::HornSchunck,
            &config(1, None),
        )
        .unwrap();

        let summary = pipeline.run().unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.loops, 0);
        assert_eq!(pipeline.state(), PipelineState::Stopped);

        let sink = pipeline.sink();
        assert_eq!(
            sink.persisted.last().unwrap(),
            &Path::new("out").join("horn-schunck").join("frame_0002.png")
        );
        assert_eq!(sink.progress.len(), 3);
        assert_eq!(sink.progress[2].processed, 3);
        assert_eq!(sink.progress[2].total, Some(3));
    }

    #[test]
    fn single_frame_source_is_unavailable() {
        let mut pipeline = Pipeline::new(
            frames(1),
            RecordingSink::default(),
            Box::new(StillEstimator),
            Mode::Farneback,
            &config(1, None),
        )
        .unwrap();

        let err = pipeline.run().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::SourceUnavailable(_))
        ));
        assert_eq!(pipeline.sink().displayed, 0);
    }

    #[test]
    fn write_failures_do_not_stop_the_run() {
        let sink = RecordingSink {
            fail_writes: true,
            ..Default::default()
        };

        let mut pipeline = Pipeline::new(
            frames(4),
            sink,
            Box::new(StillEstimator),
            Mode::Farneback,
            &config(1, None),
        )
        .unwrap();

        let summary = pipeline.run().unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.snapshots, 0);
        assert_eq!(summary.write_failures, 3);
    }

    #[test]
    fn stop_handle_and_closed_sink() {
        let mut pipeline = Pipeline::new(
            frames(3),
            RecordingSink::default(),
            Box::new(DifferenceDetector::default()),
            Mode::Difference,
            &config(1, None),
        )
        .unwrap();

        pipeline.stop_handle().store(true, Ordering::Relaxed);
        assert_eq!(pipeline.run().unwrap().frames, 0);

        let sink = RecordingSink {
            close_after: Some(2),
            ..Default::default()
        };

        let mut pipeline = Pipeline::new(
            frames(3),
            sink,
            Box::new(DifferenceDetector::default()),
            Mode::Difference,
            &config(1, None),
        )
        .unwrap();

        assert_eq!(pipeline.run().unwrap().frames, 2);
    }

    #[test]
    fn frames_are_resized() {
        let big = MemorySource::new(vec![Frame::new(48, 32), Frame::new(48, 32)]);

        let mut pipeline = Pipeline::new(
            big,
            RecordingSink::default(),
            Box::new(StillEstimator),
            Mode::Farneback,
            &config(1, None),
        )
        .unwrap();

        pipeline.step().unwrap();
        assert_eq!(pipeline.pair.as_ref().unwrap().dim(), (24, 16));
    }
}
