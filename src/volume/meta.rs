use glam::{DVec3, UVec3};
use serde::{Deserialize, Serialize};

/// One resolution of a pyramid.
/// Level 0 is the highest resolution, pixel dimensions do not increase with the level index.
#[readonly::make]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PyramidLevel {
    /// This level's index in the pyramid.
    pub index: usize,

    /// The size of this level in pixels.
    pub dimensions: UVec3,
}

impl PyramidLevel {
    pub fn new(index: usize, dimensions: UVec3) -> Self {
        Self { index, dimensions }
    }
}

/// Identifies one materialized pixel grid of a source.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct CacheKey {
    pub timepoint: usize,
    pub level: usize,
}

impl CacheKey {
    pub fn new(timepoint: usize, level: usize) -> Self {
        Self { timepoint, level }
    }
}

/// The physical size of a level-0 voxel.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct VoxelSize {
    pub size: DVec3,
    pub unit: String,
}

impl VoxelSize {
    pub fn new(size: DVec3, unit: impl Into<String>) -> Self {
        Self {
            size,
            unit: unit.into(),
        }
    }
}

impl Default for VoxelSize {
    fn default() -> Self {
        Self::new(DVec3::ONE, "pixel")
    }
}
