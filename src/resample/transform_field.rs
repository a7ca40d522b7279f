use std::sync::Arc;

use glam::{DAffine3, DVec3, UVec3};
use serde::{Deserialize, Serialize};

use crate::error::{PyramidError, PyramidResult};
use crate::resample::transform::{check_3d, checked_inverse, RealTransform};
use crate::volume::cache::{CachePolicy, CacheStats};
use crate::volume::cell::CellBounds;
use crate::volume::continuous::{Boundary, InterpolatedGrid};
use crate::volume::grid::{CachedGrid, CellLoader};
use crate::volume::meta::{CacheKey, VoxelSize};
use crate::volume::source::{CachedSource, PyramidGeometry, PyramidSource, SourceOptions};

/// What a transform field stores at each lattice point.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldMode {
    /// The transformed world position of the lattice point.
    #[default]
    Position,

    /// The transformed world position minus the world position of the lattice point.
    Displacement,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldOptions {
    pub name: String,
    pub mode: FieldMode,

    /// How the field is extended beyond the model's bounds when used as a transform.
    pub boundary: Boundary,

    #[serde(rename = "cachePolicy")]
    pub cache_policy: CachePolicy,
}

/// A [`RealTransform`] discretized on the pixel grids of a model pyramid.
///
/// Fields are cached like any other pyramid and can be turned back into a continuous transform
/// with [`TransformFieldSource::as_transform`], which is typically much cheaper to evaluate than
/// the transform the field was sampled from.
pub struct TransformFieldSource {
    field: CachedSource<DVec3>,
    mode: FieldMode,
    boundary: Boundary,
}

impl TransformFieldSource {
    pub fn new(
        transform: Arc<dyn RealTransform>,
        model: Arc<dyn PyramidGeometry>,
        options: FieldOptions,
    ) -> PyramidResult<Self> {
        check_3d(transform.as_ref())?;
        if model.num_dimensions() != 3 {
            return Err(PyramidError::unsupported_configuration(format!(
                "transform fields need a 3D model, got {}D",
                model.num_dimensions()
            )));
        }
        let root_transform = if model.timepoint_count() > 0 {
            model.transform(0, 0)?
        } else {
            DAffine3::IDENTITY
        };
        let level_dimensions = (0..model.mipmap_level_count())
            .map(|level| model.dimensions(level))
            .collect::<PyramidResult<Vec<_>>>()?;
        let source_options = SourceOptions::new(options.name)
            .root_transform(root_transform)
            .voxel_size(model.voxel_size().clone())
            .cache_policy(options.cache_policy);
        let timepoints = model.timepoint_count();
        let loader = Arc::new(FieldLoader {
            transform,
            model,
            mode: options.mode,
        });
        Ok(Self {
            field: CachedSource::new(source_options, timepoints, level_dimensions, None, loader)?,
            mode: options.mode,
            boundary: options.boundary,
        })
    }

    pub fn mode(&self) -> FieldMode {
        self.mode
    }

    pub fn stats(&self) -> CacheStats {
        self.field.stats()
    }

    /// The field of `level` at `timepoint` as a transform of world coordinates.
    pub fn as_transform(&self, timepoint: usize, level: usize) -> PyramidResult<FieldTransform> {
        Ok(FieldTransform {
            world_to_pixel: checked_inverse(&self.field.transform(timepoint, level)?)?,
            field: self.field.interpolated(timepoint, level, self.boundary)?,
            mode: self.mode,
        })
    }
}

impl PyramidGeometry for TransformFieldSource {
    fn name(&self) -> &str {
        self.field.name()
    }

    fn mipmap_level_count(&self) -> usize {
        self.field.mipmap_level_count()
    }

    fn timepoint_count(&self) -> usize {
        self.field.timepoint_count()
    }

    fn dimensions(&self, level: usize) -> PyramidResult<UVec3> {
        self.field.dimensions(level)
    }

    fn transform(&self, timepoint: usize, level: usize) -> PyramidResult<DAffine3> {
        self.field.transform(timepoint, level)
    }

    fn voxel_size(&self) -> &VoxelSize {
        self.field.voxel_size()
    }
}

impl PyramidSource<DVec3> for TransformFieldSource {
    fn grid(&self, timepoint: usize, level: usize) -> PyramidResult<Arc<CachedGrid<DVec3>>> {
        self.field.grid(timepoint, level)
    }
}

struct FieldLoader {
    transform: Arc<dyn RealTransform>,
    model: Arc<dyn PyramidGeometry>,
    mode: FieldMode,
}

impl CellLoader<DVec3> for FieldLoader {
    fn load(&self, key: CacheKey, bounds: &CellBounds) -> PyramidResult<Vec<DVec3>> {
        let pixel_to_world = self.model.transform(key.timepoint, key.level)?;
        let mut data = Vec::with_capacity(bounds.num_samples());
        for z in bounds.origin.z..bounds.origin.z + bounds.shape.z {
            for y in bounds.origin.y..bounds.origin.y + bounds.shape.y {
                for x in bounds.origin.x..bounds.origin.x + bounds.shape.x {
                    let world =
                        pixel_to_world.transform_point3(DVec3::new(x as f64, y as f64, z as f64));
                    let target = self.transform.apply(world)?;
                    data.push(match self.mode {
                        FieldMode::Position => target,
                        FieldMode::Displacement => target - world,
                    });
                }
            }
        }
        Ok(data)
    }
}

/// A transform field sampled with n-linear interpolation at arbitrary world positions.
#[derive(Debug, Clone)]
pub struct FieldTransform {
    world_to_pixel: DAffine3,
    field: InterpolatedGrid<DVec3>,
    mode: FieldMode,
}

impl RealTransform for FieldTransform {
    fn source_dimensions(&self) -> usize {
        3
    }

    fn target_dimensions(&self) -> usize {
        3
    }

    fn apply(&self, point: DVec3) -> PyramidResult<DVec3> {
        let value = self
            .field
            .sample(self.world_to_pixel.transform_point3(point))?;
        Ok(match self.mode {
            FieldMode::Position => value,
            FieldMode::Displacement => point + value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::memory_reader::MemoryReader;
    use crate::volume::reader::SharedReader;

    fn model(root: DAffine3) -> Arc<CachedSource<u8>> {
        let reader = MemoryReader::from_u8_volume(UVec3::new(8, 8, 4), &[0; 256], 2);
        let reader = Arc::new(SharedReader::open(Box::new(reader)).unwrap());
        let options = SourceOptions::new("model").root_transform(root);
        Arc::new(CachedSource::from_reader(reader, options).unwrap())
    }

    fn rotation() -> DAffine3 {
        DAffine3::from_rotation_z(0.25) * DAffine3::from_translation(DVec3::new(1.0, 2.0, 0.5))
    }

    fn assert_close(a: DVec3, b: DVec3) {
        assert!(a.abs_diff_eq(b, 1e-9), "{a} != {b}");
    }

    #[test]
    fn position_fields_store_transformed_lattice_points() {
        let root = DAffine3::from_scale(DVec3::new(0.5, 0.5, 2.0));
        let field = TransformFieldSource::new(
            Arc::new(rotation()),
            model(root),
            FieldOptions::default(),
        )
        .unwrap();
        let grid = field.grid(0, 0).unwrap();
        let world = root.transform_point3(DVec3::new(3.0, 5.0, 1.0));
        assert_close(
            grid.get(UVec3::new(3, 5, 1)).unwrap(),
            rotation().transform_point3(world),
        );
    }

    #[test]
    fn affine_fields_reproduce_the_transform_between_lattice_points() {
        let root = DAffine3::from_scale(DVec3::new(0.5, 0.5, 2.0));
        for mode in [FieldMode::Position, FieldMode::Displacement] {
            let options = FieldOptions {
                mode,
                ..FieldOptions::default()
            };
            let field =
                TransformFieldSource::new(Arc::new(rotation()), model(root), options).unwrap();
            assert_eq!(field.mode(), mode);
            for level in 0..2 {
                let transform = field.as_transform(0, level).unwrap();
                let point = DVec3::new(1.3, 2.05, 3.1);
                assert_close(transform.apply(point).unwrap(), rotation().transform_point3(point));
            }
        }
    }

    #[test]
    fn fields_are_cached_like_pyramids() {
        let field = TransformFieldSource::new(
            Arc::new(DAffine3::IDENTITY),
            model(DAffine3::IDENTITY),
            FieldOptions::default(),
        )
        .unwrap();
        assert_eq!(field.mipmap_level_count(), 2);
        assert_eq!(field.dimensions(1).unwrap(), UVec3::new(4, 4, 2));
        assert_eq!(field.sample_type(), crate::volume::sample::SampleType::Vector3);
        let first = field.grid(0, 1).unwrap();
        assert!(Arc::ptr_eq(&first, &field.grid(0, 1).unwrap()));
        first.load_all().unwrap();
        assert_eq!(field.stats().grids_constructed, 1);
        assert_eq!(
            first.get(UVec3::new(1, 1, 1)).unwrap(),
            DVec3::new(2.0, 2.0, 2.0)
        );
    }

    #[test]
    fn displacement_fields_of_the_identity_are_zero() {
        let options = FieldOptions {
            mode: FieldMode::Displacement,
            ..FieldOptions::default()
        };
        let field = TransformFieldSource::new(
            Arc::new(DAffine3::IDENTITY),
            model(DAffine3::IDENTITY),
            options,
        )
        .unwrap();
        let grid = field.grid(0, 0).unwrap();
        let samples = grid.read_region(UVec3::ZERO, UVec3::new(8, 8, 4)).unwrap();
        assert!(samples.iter().all(|v| *v == DVec3::ZERO));
    }
}
