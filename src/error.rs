use std::sync::Arc;

use glam::UVec3;

pub type PyramidResult<T> = Result<T, PyramidError>;

#[derive(thiserror::Error, Debug)]
pub enum PyramidError {
    #[error("unsupported sample type: {0}")]
    UnsupportedSampleType(String),

    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("resolution level {level} is out of range, the pyramid has {count} levels")]
    LevelOutOfRange { level: usize, count: usize },

    #[error("timepoint {timepoint} is out of range, the pyramid has {count} timepoints")]
    TimepointOutOfRange { timepoint: usize, count: usize },

    #[error("region at {origin} with shape {shape} exceeds bounds {bounds}")]
    RegionOutOfBounds {
        origin: UVec3,
        shape: UVec3,
        bounds: UVec3,
    },

    #[error("reader error: {0}")]
    Reader(String),

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0} lock poisoned")]
    Poisoned(&'static str),

    #[error(transparent)]
    Shared(#[from] Arc<PyramidError>),
}

impl PyramidError {
    pub fn unsupported_sample_type(msg: impl Into<String>) -> Self {
        Self::UnsupportedSampleType(msg.into())
    }

    pub fn unsupported_configuration(msg: impl Into<String>) -> Self {
        Self::UnsupportedConfiguration(msg.into())
    }

    pub fn reader(msg: impl Into<String>) -> Self {
        Self::Reader(msg.into())
    }

    /// Returns the error that originally caused this one, looking through errors shared between
    /// the waiters of a single cache load.
    pub fn root(&self) -> &PyramidError {
        match self {
            PyramidError::Shared(inner) => inner.root(),
            other => other,
        }
    }

    /// Whether this error stems from decoding data, as opposed to a misconfigured request.
    pub fn is_io(&self) -> bool {
        matches!(
            self.root(),
            PyramidError::Reader(_) | PyramidError::ShortRead { .. } | PyramidError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(PyramidError::unsupported_sample_type("x")
            .to_string()
            .contains("unsupported sample type:"));
        assert!(PyramidError::unsupported_configuration("x")
            .to_string()
            .contains("unsupported configuration:"));
        assert!(PyramidError::reader("x").to_string().contains("reader error:"));
        assert_eq!(
            PyramidError::LevelOutOfRange { level: 4, count: 2 }.to_string(),
            "resolution level 4 is out of range, the pyramid has 2 levels"
        );
    }

    #[test]
    fn shared_errors_are_transparent() {
        let shared = PyramidError::Shared(Arc::new(PyramidError::reader("disk on fire")));
        assert_eq!(shared.to_string(), "reader error: disk on fire");
        assert!(matches!(shared.root(), PyramidError::Reader(_)));
        assert!(shared.is_io());
    }

    #[test]
    fn configuration_errors_are_not_io() {
        assert!(!PyramidError::LevelOutOfRange { level: 1, count: 1 }.is_io());
        let io = PyramidError::from(std::io::Error::other("boom"));
        assert!(io.is_io());
        assert!(io.to_string().contains("boom"));
    }
}
