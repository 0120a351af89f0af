//! Error and warning types for the deformation engine.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Fatal errors. Any of these aborts the deformation computation and no
/// partial field is produced.
#[derive(Error, Debug)]
pub enum VirtueError {
    /// Empty or degenerate mask or surface.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Missing, conflicting or out-of-range parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Filesystem failure. Cache failures are downgraded to a [`Warning`]
    /// by the lookup builder.
    #[error("I/O error on '{}': {message}", path.display())]
    Io { path: PathBuf, message: String },

    /// Malformed or unsupported NIfTI image.
    #[error("NIfTI error: {0}")]
    Nifti(String),
}

impl VirtueError {
    /// Create a Geometry error.
    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::Geometry(msg.into())
    }

    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an Io error tied to a path.
    pub fn io(path: impl AsRef<Path>, msg: impl fmt::Display) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            message: msg.to_string(),
        }
    }

    /// Create a Nifti error.
    pub fn nifti(msg: impl Into<String>) -> Self {
        Self::Nifti(msg.into())
    }

    /// Whether the run can carry on after this error (cache failures only).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

impl From<std::io::Error> for VirtueError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for VirtueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            message: format!("malformed lookup table: {err}"),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, VirtueError>;

/// Non-fatal conditions, reported next to a successfully produced field.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// Points coincident with the growth centre had their elevation replaced
    /// by the sentinel value.
    NumericDegeneracy { stage: &'static str, substitutions: usize },

    /// The lookup cache could not be read or written; the table was computed
    /// from the surfaces instead.
    CacheUnavailable { path: PathBuf, reason: String },

    /// Directions where the tumour radius was not inside the brain radius
    /// (Dt > Db): sampled tumour directions during "lookup", voxel
    /// directions during "field".
    GeometryViolation { stage: &'static str, directions: usize },

    /// Decimation ran out of legal edge collapses before reaching the target.
    DecimationShortfall { surface: &'static str, target: usize, achieved: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NumericDegeneracy { stage, substitutions } => write!(
                f,
                "{substitutions} zero-radius point(s) given sentinel elevation during {stage}"
            ),
            Self::CacheUnavailable { path, reason } => write!(
                f,
                "distance lookup cache '{}' unavailable ({reason}); recomputed",
                path.display()
            ),
            Self::GeometryViolation { stage, directions } => write!(
                f,
                "tumour surface lies outside the brain surface along {directions} direction(s) during {stage}"
            ),
            Self::DecimationShortfall { surface, target, achieved } => write!(
                f,
                "{surface} surface decimated to {achieved} faces, target was {target}"
            ),
        }
    }
}
