pub mod resampled;
pub mod transform;
pub mod transform_field;

pub use resampled::ResampleOptions;
pub use transform::{check_3d, checked_inverse, RealTransform};
pub use transform_field::{FieldMode, FieldOptions, FieldTransform, TransformFieldSource};
