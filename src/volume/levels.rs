use std::sync::OnceLock;

use glam::{DAffine3, DMat3, DVec3, UVec3};

use crate::error::{PyramidError, PyramidResult};
use crate::volume::meta::PyramidLevel;

/// Maps every resolution level of a pyramid to world space.
///
/// Level 0 uses the root transform verbatim. Every other level scales the root transform's linear
/// part per axis by the ratio of level-0 pixels to that level's pixels, so that all levels cover
/// the same physical region. The translation is in world units and stays unchanged.
#[derive(Debug)]
pub struct LevelRegistry {
    root: DAffine3,
    levels: Vec<PyramidLevel>,

    /// Transforms are computed on first request and memoized per level.
    transforms: Vec<OnceLock<DAffine3>>,
}

impl LevelRegistry {
    pub fn new(root: DAffine3, dimensions: Vec<UVec3>) -> PyramidResult<Self> {
        if dimensions.is_empty() {
            return Err(PyramidError::unsupported_configuration(
                "a pyramid needs at least one resolution level",
            ));
        }
        for (level, pair) in dimensions.windows(2).enumerate() {
            if pair[1].cmpgt(pair[0]).any() {
                return Err(PyramidError::unsupported_configuration(format!(
                    "level {} ({}) is larger than level {} ({})",
                    level + 1,
                    pair[1],
                    level,
                    pair[0]
                )));
            }
        }
        let levels: Vec<PyramidLevel> = dimensions
            .into_iter()
            .enumerate()
            .map(|(index, dimensions)| PyramidLevel::new(index, dimensions))
            .collect();
        let transforms = levels.iter().map(|_| OnceLock::new()).collect();
        Ok(Self {
            root,
            levels,
            transforms,
        })
    }

    pub fn root(&self) -> &DAffine3 {
        &self.root
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    pub fn level(&self, level: usize) -> PyramidResult<&PyramidLevel> {
        self.levels.get(level).ok_or(PyramidError::LevelOutOfRange {
            level,
            count: self.levels.len(),
        })
    }

    pub fn dimensions(&self, level: usize) -> PyramidResult<UVec3> {
        Ok(self.level(level)?.dimensions)
    }

    /// The per-axis ratio of level-0 pixels to pixels at `level`.
    /// Axes reporting zero pixels count as one pixel.
    pub fn downsampling_factors(&self, level: usize) -> PyramidResult<DVec3> {
        let full = self.levels[0].dimensions;
        let scaled = self.level(level)?.dimensions;
        if scaled.cmpeq(UVec3::ZERO).any() {
            log::debug!("level {level} reports an empty axis ({scaled}), counting it as 1 pixel");
        }
        let full = full.max(UVec3::ONE);
        let scaled = scaled.max(UVec3::ONE);
        Ok(DVec3::new(
            full.x as f64 / scaled.x as f64,
            full.y as f64 / scaled.y as f64,
            full.z as f64 / scaled.z as f64,
        ))
    }

    pub fn transform_for(&self, level: usize) -> PyramidResult<DAffine3> {
        let slot = self.transforms.get(level).ok_or(PyramidError::LevelOutOfRange {
            level,
            count: self.levels.len(),
        })?;
        if let Some(transform) = slot.get() {
            return Ok(*transform);
        }
        let transform = if level == 0 {
            self.root
        } else {
            scale_linear_part(&self.root, self.downsampling_factors(level)?)
        };
        Ok(*slot.get_or_init(|| transform))
    }
}

/// Scales the columns of `transform`'s linear part by `factors`, i.e., applies the scaling in
/// pixel space before `transform`. The translation is kept as is.
pub fn scale_linear_part(transform: &DAffine3, factors: DVec3) -> DAffine3 {
    DAffine3 {
        matrix3: DMat3::from_cols(
            transform.matrix3.x_axis * factors.x,
            transform.matrix3.y_axis * factors.y,
            transform.matrix3.z_axis * factors.z,
        ),
        translation: transform.translation,
    }
}

/// The length of one pixel step along each axis in world units.
pub fn voxel_spacing(transform: &DAffine3) -> DVec3 {
    DVec3::new(
        transform.matrix3.x_axis.length(),
        transform.matrix3.y_axis.length(),
        transform.matrix3.z_axis.length(),
    )
}
