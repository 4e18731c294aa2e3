//! # Run configuration

use crate::error::FlowError;
use anyhow::{anyhow, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which detector or estimator a run uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Mode {
    /// Highlight pixels that changed between consecutive frames.
    Difference,
    /// Dense polynomial expansion flow.
    Farneback,
    /// Sparse corner tracking.
    LucasKanade,
    /// Iterative smoothness-regularised flow.
    HornSchunck,
}

impl Mode {
    pub const ALL: [Mode; 4] = [
        Mode::Difference,
        Mode::Farneback,
        Mode::LucasKanade,
        Mode::HornSchunck,
    ];

    /// Name used for output directories and logs.
    pub fn name(self) -> &'static str {
        match self {
            Mode::Difference => "difference",
            Mode::Farneback => "farneback",
            Mode::LucasKanade => "lucas-kanade",
            Mode::HornSchunck => "horn-schunck",
        }
    }

    /// Number of the entry in the interactive menu.
    pub fn menu_index(self) -> usize {
        match self {
            Mode::Difference => 0,
            Mode::Farneback => 1,
            Mode::LucasKanade => 2,
            Mode::HornSchunck => 3,
        }
    }

    /// Whether the stream is replayed from the start once it runs out.
    ///
    /// Difference mode is the interactive viewer and loops forever. The flow modes are batch
    /// jobs that stop at the end of the stream.
    pub fn loops(self) -> bool {
        matches!(self, Mode::Difference)
    }

    /// Relative path of the `index`-th snapshot inside the output directory.
    pub fn snapshot_path(self, index: usize) -> PathBuf {
        match self {
            Mode::Difference => PathBuf::from(format!("motion_{index}.png")),
            _ => Path::new(self.name()).join(format!("frame_{index:04}.png")),
        }
    }

    fn default_snapshot_interval(self) -> usize {
        if self.loops() {
            50
        } else {
            1
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "difference" | "diff" | "motion" => Ok(Mode::Difference),
            "1" | "farneback" | "dense" => Ok(Mode::Farneback),
            "2" | "lucas-kanade" | "lucas_kanade" | "lk" | "sparse" => Ok(Mode::LucasKanade),
            "3" | "horn-schunck" | "horn_schunck" | "hs" | "iterative" => Ok(Mode::HornSchunck),
            _ => Err(FlowError::InvalidModeSelection(s.to_string())),
        }
    }
}

/// Options recognised by a run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Working width every frame is resized to.
    pub width: u32,
    /// Working height every frame is resized to.
    pub height: u32,
    /// Frames between persisted snapshots. `None` picks the mode's default.
    pub snapshot_interval: Option<usize>,
    /// Selected mode. `None` lets the front-end ask for one.
    pub mode: Option<Mode>,
    /// Smoothness weight of the Horn-Schunck estimator.
    pub alpha: f32,
    /// Iteration count of the Horn-Schunck estimator.
    pub iterations: usize,
    /// Root directory for snapshots.
    pub output_dir: PathBuf,
    /// Stop after this many processed frames.
    pub max_frames: Option<usize>,
    /// Show frames live if the sink supports it.
    pub display: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: 640,
            height: 780,
            snapshot_interval: None,
            mode: None,
            alpha: 10.0,
            iterations: 100,
            output_dir: PathBuf::from("output"),
            max_frames: None,
            display: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// Missing keys keep their default values.
    #[cfg(feature = "serde")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow!("cannot open config {}: {e}", path.display()))?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Selected mode, or `InvalidModeSelection` if none was chosen.
    pub fn mode(&self) -> Result<Mode> {
        self.mode
            .ok_or_else(|| FlowError::InvalidModeSelection("<none>".into()).into())
    }

    /// Snapshot interval, falling back to the default of the given mode.
    pub fn snapshot_interval(&self, mode: Mode) -> usize {
        self.snapshot_interval
            .unwrap_or_else(|| mode.default_snapshot_interval())
    }

    /// Reject values that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!(
                "working resolution must be non-zero, got {}x{}",
                self.width,
                self.height
            ));
        }

        if self.snapshot_interval == Some(0) {
            return Err(anyhow!("snapshot interval must be at least 1"));
        }

        if self.iterations == 0 {
            return Err(anyhow!("iteration count must be at least 1"));
        }

        if !(self.alpha > 0.0) {
            return Err(anyhow!("alpha must be positive, got {}", self.alpha));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_modes() {
        assert_eq!("1".parse::<Mode>().unwrap(), Mode::Farneback);
        assert_eq!("Lucas-Kanade".parse::<Mode>().unwrap(), Mode::LucasKanade);
        assert_eq!(" iterative ".parse::<Mode>().unwrap(), Mode::HornSchunck);
        assert_eq!("diff".parse::<Mode>().unwrap(), Mode::Difference);

        for mode in Mode::ALL {
            assert_eq!(mode.name().parse::<Mode>().unwrap(), mode);
            assert_eq!(mode.menu_index().to_string().parse::<Mode>().unwrap(), mode);
        }

        assert!(matches!(
            "4".parse::<Mode>(),
            Err(FlowError::InvalidModeSelection(_))
        ));
    }

    #[test]
    fn snapshot_paths() {
        assert_eq!(
            Mode::Difference.snapshot_path(3),
            PathBuf::from("motion_3.png")
        );
        assert_eq!(
            Mode::HornSchunck.snapshot_path(12),
            Path::new("horn-schunck").join("frame_0012.png")
        );
    }

    #[test]
    fn interval_defaults() {
        let config = Config::default();
        assert_eq!(config.snapshot_interval(Mode::Difference), 50);
        assert_eq!(config.snapshot_interval(Mode::Farneback), 1);

        let config = Config {
            snapshot_interval: Some(7),
            ..Default::default()
        };
        assert_eq!(config.snapshot_interval(Mode::LucasKanade), 7);
    }

    #[test]
    fn validation() {
        assert!(Config::default().validate().is_ok());

        let bad = [
            Config {
                width: 0,
                ..Default::default()
            },
            Config {
                snapshot_interval: Some(0),
                ..Default::default()
            },
            Config {
                iterations: 0,
                ..Default::default()
            },
            Config {
                alpha: 0.0,
                ..Default::default()
            },
        ];

        for config in bad {
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }

    #[test]
    fn missing_mode_is_invalid_selection() {
        let err = Config::default().mode().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::InvalidModeSelection(_))
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json() {
        let config: Config =
            serde_json::from_str(r#"{ "mode": "horn-schunck", "alpha": 4.0 }"#).unwrap();
        assert_eq!(config.mode, Some(Mode::HornSchunck));
        assert_eq!(config.alpha, 4.0);
        assert_eq!(config.width, 640);
        assert_eq!(config.iterations, 100);
    }
}
