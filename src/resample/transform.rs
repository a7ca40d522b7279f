use glam::{DAffine3, DVec3};

use crate::error::{PyramidError, PyramidResult};

/// A mapping between real coordinate spaces.
///
/// Only mappings from 3D to 3D can be resampled, see [`check_3d`].
pub trait RealTransform: Send + Sync {
    fn source_dimensions(&self) -> usize;

    fn target_dimensions(&self) -> usize;

    fn apply(&self, point: DVec3) -> PyramidResult<DVec3>;
}

impl RealTransform for DAffine3 {
    fn source_dimensions(&self) -> usize {
        3
    }

    fn target_dimensions(&self) -> usize {
        3
    }

    fn apply(&self, point: DVec3) -> PyramidResult<DVec3> {
        Ok(self.transform_point3(point))
    }
}

/// Fails unless `transform` maps 3D points to 3D points.
pub fn check_3d(transform: &dyn RealTransform) -> PyramidResult<()> {
    match (transform.source_dimensions(), transform.target_dimensions()) {
        (3, 3) => Ok(()),
        (n, m) => Err(PyramidError::unsupported_configuration(format!(
            "only 3D to 3D transforms are supported, got {n}D to {m}D"
        ))),
    }
}

/// Returns the inverse of `transform`, failing if it is singular.
pub fn checked_inverse(transform: &DAffine3) -> PyramidResult<DAffine3> {
    let determinant = transform.matrix3.determinant();
    if determinant == 0.0 || !determinant.is_finite() {
        return Err(PyramidError::unsupported_configuration(format!(
            "transform is not invertible: {transform:?}"
        )));
    }
    Ok(transform.inverse())
}
