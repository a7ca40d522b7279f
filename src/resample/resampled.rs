use std::sync::Arc;

use glam::{DAffine3, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::{PyramidError, PyramidResult};
use crate::resample::transform::checked_inverse;
use crate::volume::cache::CachePolicy;
use crate::volume::cell::CellBounds;
use crate::volume::continuous::Boundary;
use crate::volume::grid::CellLoader;
use crate::volume::levels::voxel_spacing;
use crate::volume::meta::CacheKey;
use crate::volume::sample::Sample;
use crate::volume::source::{CachedSource, PyramidGeometry, PyramidSource, SourceOptions};

/// Settings of a resampled source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResampleOptions {
    /// Defaults to the source's name with a suffix.
    pub name: String,

    /// How the source is extended beyond its bounds.
    pub boundary: Boundary,

    /// Sample coarser source levels for coarser model levels instead of always sampling level 0.
    #[serde(rename = "reuseMipmaps")]
    pub reuse_mipmaps: bool,

    #[serde(rename = "cachePolicy")]
    pub cache_policy: CachePolicy,
}

impl<T: Sample> CachedSource<T> {
    /// Samples `source` on the pixel grids of `model`.
    ///
    /// Level `l` at timepoint `t` of the result has the dimensions and the transform of `model`'s
    /// level `l`. Each of its pixels is the interpolated value of `source` at the world position
    /// of that pixel. The result is present at timepoints where both `source` and `model` are.
    pub fn resampled(
        source: Arc<dyn PyramidSource<T>>,
        model: Arc<dyn PyramidGeometry>,
        options: ResampleOptions,
    ) -> PyramidResult<Self> {
        if source.num_dimensions() != 3 || model.num_dimensions() != 3 {
            return Err(PyramidError::unsupported_configuration(format!(
                "only 3D to 3D resampling is supported, got a {}D source and a {}D model",
                source.num_dimensions(),
                model.num_dimensions()
            )));
        }
        let timepoints = source.timepoint_count().min(model.timepoint_count());
        let root_transform = if model.timepoint_count() > 0 {
            model.transform(0, 0)?
        } else {
            DAffine3::IDENTITY
        };
        let level_dimensions = (0..model.mipmap_level_count())
            .map(|level| model.dimensions(level))
            .collect::<PyramidResult<Vec<_>>>()?;
        let name = if options.name.is_empty() {
            format!("{} (resampled)", source.name())
        } else {
            options.name.clone()
        };
        let source_options = SourceOptions::new(name)
            .root_transform(root_transform)
            .voxel_size(model.voxel_size().clone())
            .cache_policy(options.cache_policy.clone());
        let loader = Arc::new(ResampleLoader {
            source,
            model,
            boundary: options.boundary,
            reuse_mipmaps: options.reuse_mipmaps,
        });
        Self::new(source_options, timepoints, level_dimensions, None, loader)
    }
}

struct ResampleLoader<T: Sample> {
    source: Arc<dyn PyramidSource<T>>,
    model: Arc<dyn PyramidGeometry>,
    boundary: Boundary,
    reuse_mipmaps: bool,
}

impl<T: Sample> ResampleLoader<T> {
    /// The coarsest source level whose voxels are not larger than the model's voxels at `level`.
    fn source_level(&self, timepoint: usize, level: usize) -> PyramidResult<usize> {
        if !self.reuse_mipmaps {
            return Ok(0);
        }
        let target = voxel_spacing(&self.model.transform(timepoint, level)?) * (1.0 + 1e-9);
        let mut best = 0;
        for candidate in 1..self.source.mipmap_level_count() {
            let spacing = voxel_spacing(&self.source.transform(timepoint, candidate)?);
            if spacing.cmple(target).all() {
                best = candidate;
            } else {
                break;
            }
        }
        Ok(best)
    }
}

impl<T: Sample> CellLoader<T> for ResampleLoader<T> {
    fn load(&self, key: CacheKey, bounds: &CellBounds) -> PyramidResult<Vec<T>> {
        let source_level = self.source_level(key.timepoint, key.level)?;
        let model_transform = self.model.transform(key.timepoint, key.level)?;
        let source_transform = self.source.transform(key.timepoint, source_level)?;
        let model_to_source = checked_inverse(&source_transform)? * model_transform;
        log::trace!(
            "resampling {} at t={} level={} from source level {}",
            self.source.name(),
            key.timepoint,
            key.level,
            source_level
        );

        let grid = self
            .source
            .interpolated(key.timepoint, source_level, self.boundary)?;
        let mut cursor = grid.cursor();
        let mut data = Vec::with_capacity(bounds.num_samples());
        for z in bounds.origin.z..bounds.origin.z + bounds.shape.z {
            for y in bounds.origin.y..bounds.origin.y + bounds.shape.y {
                for x in bounds.origin.x..bounds.origin.x + bounds.shape.x {
                    let pixel = DVec3::new(x as f64, y as f64, z as f64);
                    data.push(cursor.sample(model_to_source.transform_point3(pixel))?);
                }
            }
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::memory_reader::MemoryReader;
    use crate::volume::reader::SharedReader;
    use glam::UVec3;

    fn open(reader: MemoryReader, root: DAffine3) -> Arc<CachedSource<u8>> {
        let reader = Arc::new(SharedReader::open(Box::new(reader)).unwrap());
        let options = SourceOptions::new("source").root_transform(root);
        Arc::new(CachedSource::from_reader(reader, options).unwrap())
    }

    fn ramp() -> Vec<u8> {
        (0..8 * 8 * 2).map(|i| (i % 8) as u8 * 10).collect()
    }

    #[test]
    fn identical_grids_resample_to_the_source() {
        let source = open(
            MemoryReader::from_u8_volume(UVec3::new(8, 8, 2), &ramp(), 1),
            DAffine3::IDENTITY,
        );
        let resampled = CachedSource::<u8>::resampled(
            source.clone(),
            source.clone(),
            ResampleOptions::default(),
        )
        .unwrap();
        assert_eq!(resampled.name(), "source (resampled)");
        let expected = source.grid(0, 0).unwrap();
        let actual = resampled.grid(0, 0).unwrap();
        assert_eq!(
            actual.read_region(UVec3::ZERO, UVec3::new(8, 8, 2)).unwrap(),
            expected.read_region(UVec3::ZERO, UVec3::new(8, 8, 2)).unwrap()
        );
    }

    #[test]
    fn shifted_models_interpolate_between_source_pixels() {
        let source = open(
            MemoryReader::from_u8_volume(UVec3::new(8, 8, 2), &ramp(), 1),
            DAffine3::IDENTITY,
        );
        let model = open(
            MemoryReader::from_u8_volume(UVec3::new(4, 4, 1), &[0; 16], 1),
            DAffine3::from_translation(DVec3::new(0.5, 1.0, 0.0)),
        );
        let resampled =
            CachedSource::<u8>::resampled(source, model, ResampleOptions::default()).unwrap();
        let grid = resampled.grid(0, 0).unwrap();
        assert_eq!(grid.dimensions(), UVec3::new(4, 4, 1));
        // x = 2.5 in source pixels, halfway between 20 and 30
        assert_eq!(grid.get(UVec3::new(2, 0, 0)).unwrap(), 25);
    }

    #[test]
    fn zero_boundary_blanks_pixels_outside_the_source() {
        let source = open(
            MemoryReader::from_u8_volume(UVec3::new(8, 8, 2), &[9; 128], 1),
            DAffine3::IDENTITY,
        );
        let model = open(
            MemoryReader::from_u8_volume(UVec3::new(4, 1, 1), &[0; 4], 1),
            DAffine3::from_translation(DVec3::new(6.0, 0.0, 0.0)),
        );
        let options = ResampleOptions {
            boundary: Boundary::Zero,
            ..ResampleOptions::default()
        };
        let resampled = CachedSource::<u8>::resampled(source, model, options).unwrap();
        let grid = resampled.grid(0, 0).unwrap();
        assert_eq!(
            grid.read_region(UVec3::ZERO, UVec3::new(4, 1, 1)).unwrap(),
            vec![9, 9, 0, 0]
        );
    }

    #[test]
    fn mipmaps_are_reused_for_coarse_models() {
        let source = open(
            MemoryReader::from_u8_volume(UVec3::new(16, 16, 1), &[1; 256], 3),
            DAffine3::IDENTITY,
        );
        let model = open(
            MemoryReader::from_u8_volume(UVec3::new(8, 8, 1), &[0; 64], 2),
            DAffine3::from_scale(DVec3::new(2.0, 2.0, 1.0)),
        );
        let loader: ResampleLoader<u8> = ResampleLoader {
            source,
            model,
            boundary: Boundary::Border,
            reuse_mipmaps: true,
        };
        assert_eq!(loader.source_level(0, 0).unwrap(), 1);
        assert_eq!(loader.source_level(0, 1).unwrap(), 2);
        let loader = ResampleLoader {
            reuse_mipmaps: false,
            ..loader
        };
        assert_eq!(loader.source_level(0, 1).unwrap(), 0);
    }

    #[test]
    fn options_read_camel_case() {
        let options: ResampleOptions =
            serde_json::from_str(r#"{"boundary": "zero", "reuseMipmaps": true}"#).unwrap();
        assert_eq!(options.boundary, Boundary::Zero);
        assert!(options.reuse_mipmaps);
        assert_eq!(options.cache_policy, CachePolicy::default());
    }
}
