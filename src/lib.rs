//! Lazily decoded, tile-cached, multi-resolution image pyramids.
//!
//! A [`CachedSource`] exposes one channel of a multi-resolution [`FormatReader`] as a pyramid of
//! pixel grids, one per (timepoint, level). Grids are constructed on first request and decode
//! their cells on demand into a bounded cache shared by all grids of the source. Grids can be
//! sampled at real-valued positions through [`InterpolatedGrid`], and resampled onto the grids of
//! another pyramid with [`CachedSource::resampled`].

pub mod error;
pub mod resample;
pub mod util;
pub mod volume;

pub use error::{PyramidError, PyramidResult};
pub use resample::{
    FieldMode, FieldOptions, FieldTransform, RealTransform, ResampleOptions, TransformFieldSource,
};
pub use volume::{
    AnySource, Argb, Boundary, CachePolicy, CacheStats, CachedGrid, CachedSource, FormatReader,
    InterpolatedGrid, MemoryReader, PixelType, PyramidGeometry, PyramidSource, Sample, SampleType,
    SourceOptions, VoxelSize,
};
