//! # Error taxonomy
//!
//! Fallible functions return `anyhow::Result`. The variants below are the failures callers may
//! need to tell apart; they travel inside `anyhow::Error` and can be recovered with
//! `downcast_ref::<FlowError>()`.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum FlowError {
    /// The input cannot be opened, or it does not yield an initial pair of frames.
    SourceUnavailable(String),
    /// Two frames that must share dimensions do not.
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    /// A rendered image could not be written.
    WriteError {
        path: PathBuf,
        source: anyhow::Error,
    },
    /// An unrecognised estimator mode was requested.
    InvalidModeSelection(String),
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::SourceUnavailable(reason) => write!(f, "source unavailable: {reason}"),
            FlowError::DimensionMismatch { expected, found } => write!(
                f,
                "dimension mismatch: expected {}x{}, found {}x{}",
                expected.0, expected.1, found.0, found.1
            ),
            FlowError::WriteError { path, source } => {
                write!(f, "failed to write {}: {source}", path.display())
            }
            FlowError::InvalidModeSelection(mode) => write!(f, "invalid mode selection: {mode}"),
        }
    }
}

impl std::error::Error for FlowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FlowError::WriteError { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl FlowError {
    /// Check that two `(width, height)` pairs agree.
    pub fn check_dims(expected: (usize, usize), found: (usize, usize)) -> Result<(), Self> {
        if expected == found {
            Ok(())
        } else {
            Err(FlowError::DimensionMismatch { expected, found })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_through_anyhow() {
        let err: anyhow::Error = FlowError::InvalidModeSelection("4".into()).into();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::InvalidModeSelection(m)) if m == "4"
        ));
    }

    #[test]
    fn dims_check() {
        assert!(FlowError::check_dims((4, 3), (4, 3)).is_ok());
        let err = FlowError::check_dims((4, 3), (3, 4)).unwrap_err();
        assert_eq!(err.to_string(), "dimension mismatch: expected 4x3, found 3x4");
    }
}
