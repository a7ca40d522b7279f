use std::sync::Arc;

use glam::{DAffine3, UVec3};
use serde::{Deserialize, Serialize};

use crate::error::{PyramidError, PyramidResult};
use crate::volume::cache::{CachePolicy, CacheStats};
use crate::volume::cell::CellBounds;
use crate::volume::continuous::{Boundary, InterpolatedGrid};
use crate::volume::grid::{CachedGrid, CellLoader};
use crate::volume::levels::LevelRegistry;
use crate::volume::meta::{CacheKey, VoxelSize};
use crate::volume::reader::{FormatReader, SharedReader};
use crate::volume::sample::{Argb, Sample, SampleType};
use crate::volume::tiled::TiledCache;

/// The sample-type independent part of a pyramid source.
pub trait PyramidGeometry: Send + Sync {
    fn name(&self) -> &str;

    /// The number of spatial axes.
    fn num_dimensions(&self) -> usize {
        3
    }

    fn mipmap_level_count(&self) -> usize;

    fn timepoint_count(&self) -> usize;

    fn is_present(&self, timepoint: usize) -> bool {
        timepoint < self.timepoint_count()
    }

    /// The size of `level` in pixels.
    fn dimensions(&self, level: usize) -> PyramidResult<UVec3>;

    /// Maps pixel coordinates of `level` at `timepoint` to world coordinates.
    fn transform(&self, timepoint: usize, level: usize) -> PyramidResult<DAffine3>;

    /// The physical size of a level-0 voxel.
    fn voxel_size(&self) -> &VoxelSize;
}

/// A multi-resolution, multi-timepoint pyramid of samples of type `T`.
pub trait PyramidSource<T: Sample>: PyramidGeometry {
    /// Returns the pixel grid of `level` at `timepoint`, constructing it on first request.
    fn grid(&self, timepoint: usize, level: usize) -> PyramidResult<Arc<CachedGrid<T>>>;

    fn sample_type(&self) -> SampleType {
        T::SAMPLE_TYPE
    }

    /// Returns the pixel grid of `level` at `timepoint` extended by `boundary`, to be sampled at
    /// real-valued pixel coordinates.
    fn interpolated(
        &self,
        timepoint: usize,
        level: usize,
        boundary: Boundary,
    ) -> PyramidResult<InterpolatedGrid<T>> {
        Ok(InterpolatedGrid::new(self.grid(timepoint, level)?, boundary))
    }
}

impl<T: Sample, S: PyramidSource<T> + ?Sized> PyramidSource<T> for Arc<S> {
    fn grid(&self, timepoint: usize, level: usize) -> PyramidResult<Arc<CachedGrid<T>>> {
        (**self).grid(timepoint, level)
    }
}

impl<S: PyramidGeometry + ?Sized> PyramidGeometry for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn num_dimensions(&self) -> usize {
        (**self).num_dimensions()
    }

    fn mipmap_level_count(&self) -> usize {
        (**self).mipmap_level_count()
    }

    fn timepoint_count(&self) -> usize {
        (**self).timepoint_count()
    }

    fn is_present(&self, timepoint: usize) -> bool {
        (**self).is_present(timepoint)
    }

    fn dimensions(&self, level: usize) -> PyramidResult<UVec3> {
        (**self).dimensions(level)
    }

    fn transform(&self, timepoint: usize, level: usize) -> PyramidResult<DAffine3> {
        (**self).transform(timepoint, level)
    }

    fn voxel_size(&self) -> &VoxelSize {
        (**self).voxel_size()
    }
}

/// Settings fixed when a source is opened.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceOptions {
    pub name: String,

    /// The reader channel the source exposes.
    pub channel: u32,

    /// Maps level-0 pixel coordinates to world coordinates.
    #[serde(rename = "rootTransform")]
    pub root_transform: DAffine3,

    #[serde(rename = "voxelSize")]
    pub voxel_size: VoxelSize,

    #[serde(rename = "cachePolicy")]
    pub cache_policy: CachePolicy,
}

impl SourceOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn channel(mut self, channel: u32) -> Self {
        self.channel = channel;
        self
    }

    pub fn root_transform(mut self, root_transform: DAffine3) -> Self {
        self.root_transform = root_transform;
        self
    }

    pub fn voxel_size(mut self, voxel_size: VoxelSize) -> Self {
        self.voxel_size = voxel_size;
        self
    }

    pub fn cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }
}

/// A pyramid whose grids are built lazily from cells cached in a [`TiledCache`].
///
/// Sources over format readers are opened with [`CachedSource::from_reader`], resampled sources
/// are built by [`CachedSource::resampled`].
pub struct CachedSource<T: Sample> {
    name: String,
    voxel_size: VoxelSize,
    timepoints: usize,
    levels: LevelRegistry,
    cache: TiledCache<T>,
}

impl<T: Sample> CachedSource<T> {
    pub(crate) fn new(
        options: SourceOptions,
        timepoints: usize,
        level_dimensions: Vec<UVec3>,
        preferred_cell_shape: Option<UVec3>,
        loader: Arc<dyn CellLoader<T>>,
    ) -> PyramidResult<Self> {
        let levels = LevelRegistry::new(options.root_transform, level_dimensions.clone())?;
        let cache = TiledCache::new(
            level_dimensions,
            &options.cache_policy,
            preferred_cell_shape,
            loader,
        );
        Ok(Self {
            name: options.name,
            voxel_size: options.voxel_size,
            timepoints,
            levels,
            cache,
        })
    }

    /// Opens channel `options.channel` of `reader` as a source of `T`.
    ///
    /// Fails if the reader's samples are not of type `T` or the channel does not exist.
    pub fn from_reader(reader: Arc<SharedReader>, options: SourceOptions) -> PyramidResult<Self> {
        if reader.sample_type() != T::SAMPLE_TYPE {
            return Err(PyramidError::unsupported_sample_type(format!(
                "reader holds {:?} samples, requested {:?}",
                reader.sample_type(),
                T::SAMPLE_TYPE
            )));
        }
        if options.channel >= reader.size_c() {
            return Err(PyramidError::unsupported_configuration(format!(
                "channel {} does not exist, the reader has {} channels",
                options.channel,
                reader.size_c()
            )));
        }
        let loader = Arc::new(ReaderCellLoader {
            reader: reader.clone(),
            channel: options.channel,
        });
        Self::new(
            options,
            reader.size_t() as usize,
            reader.level_dimensions().to_vec(),
            reader.tile_size(),
            loader,
        )
    }

    pub fn levels(&self) -> &LevelRegistry {
        &self.levels
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drops all decoded cells of all grids. Grids stay valid and decode cells again on demand.
    pub fn invalidate_cells(&self) {
        self.cache.invalidate_cells();
    }

    pub fn resident_cells(&self) -> u64 {
        self.cache.resident_cells()
    }

    fn check_timepoint(&self, timepoint: usize) -> PyramidResult<()> {
        if self.is_present(timepoint) {
            Ok(())
        } else {
            Err(PyramidError::TimepointOutOfRange {
                timepoint,
                count: self.timepoints,
            })
        }
    }
}

impl<T: Sample> PyramidGeometry for CachedSource<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn mipmap_level_count(&self) -> usize {
        self.levels.level_count()
    }

    fn timepoint_count(&self) -> usize {
        self.timepoints
    }

    fn dimensions(&self, level: usize) -> PyramidResult<UVec3> {
        self.levels.dimensions(level)
    }

    fn transform(&self, timepoint: usize, level: usize) -> PyramidResult<DAffine3> {
        self.check_timepoint(timepoint)?;
        self.levels.transform_for(level)
    }

    fn voxel_size(&self) -> &VoxelSize {
        &self.voxel_size
    }
}

impl<T: Sample> PyramidSource<T> for CachedSource<T> {
    fn grid(&self, timepoint: usize, level: usize) -> PyramidResult<Arc<CachedGrid<T>>> {
        self.check_timepoint(timepoint)?;
        self.cache.grid_for(timepoint, level)
    }
}

impl<T: Sample> std::fmt::Debug for CachedSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSource")
            .field("name", &self.name)
            .field("sample_type", &T::SAMPLE_TYPE)
            .field("timepoints", &self.timepoints)
            .field("levels", &self.levels.levels())
            .finish()
    }
}

/// Decodes cells of one reader channel.
struct ReaderCellLoader {
    reader: Arc<SharedReader>,
    channel: u32,
}

impl<T: Sample> CellLoader<T> for ReaderCellLoader {
    fn load(&self, key: CacheKey, bounds: &CellBounds) -> PyramidResult<Vec<T>> {
        let timepoint =
            u32::try_from(key.timepoint).map_err(|_| PyramidError::TimepointOutOfRange {
                timepoint: key.timepoint,
                count: self.reader.size_t() as usize,
            })?;
        let planes = self
            .reader
            .read_planes(key.level, self.channel, timepoint, bounds)?;
        let bytes_per_sample = self.reader.sample_type().bytes_per_sample();
        let plane_len = (bounds.shape.x * bounds.shape.y) as usize * bytes_per_sample;
        let mut data = Vec::with_capacity(bounds.num_samples());
        for plane in planes {
            if plane.len() != plane_len {
                return Err(PyramidError::ShortRead {
                    expected: plane_len,
                    actual: plane.len(),
                });
            }
            T::decode(&plane, self.reader.layout(), &mut data)?;
        }
        Ok(data)
    }
}

/// A reader-backed source of whichever sample type the reader holds.
///
/// The sample type is resolved once when the source is opened.
#[derive(Debug)]
pub enum AnySource {
    U8(CachedSource<u8>),
    U16(CachedSource<u16>),
    Rgb(CachedSource<Argb>),
    F32(CachedSource<f32>),
}

impl AnySource {
    pub fn open(reader: Box<dyn FormatReader>, options: SourceOptions) -> PyramidResult<Self> {
        let reader = Arc::new(SharedReader::open(reader)?);
        match reader.sample_type() {
            SampleType::U8 => Ok(AnySource::U8(CachedSource::from_reader(reader, options)?)),
            SampleType::U16 => Ok(AnySource::U16(CachedSource::from_reader(reader, options)?)),
            SampleType::Rgb24 => Ok(AnySource::Rgb(CachedSource::from_reader(reader, options)?)),
            SampleType::F32 => Ok(AnySource::F32(CachedSource::from_reader(reader, options)?)),
            SampleType::Vector3 => Err(PyramidError::unsupported_sample_type(
                "vector samples cannot be read from a reader",
            )),
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            AnySource::U8(_) => SampleType::U8,
            AnySource::U16(_) => SampleType::U16,
            AnySource::Rgb(_) => SampleType::Rgb24,
            AnySource::F32(_) => SampleType::F32,
        }
    }

    pub fn geometry(&self) -> &dyn PyramidGeometry {
        match self {
            AnySource::U8(source) => source,
            AnySource::U16(source) => source,
            AnySource::Rgb(source) => source,
            AnySource::F32(source) => source,
        }
    }

    pub fn stats(&self) -> CacheStats {
        match self {
            AnySource::U8(source) => source.stats(),
            AnySource::U16(source) => source.stats(),
            AnySource::Rgb(source) => source.stats(),
            AnySource::F32(source) => source.stats(),
        }
    }

    pub fn as_u8(&self) -> Option<&CachedSource<u8>> {
        match self {
            AnySource::U8(source) => Some(source),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<&CachedSource<u16>> {
        match self {
            AnySource::U16(source) => Some(source),
            _ => None,
        }
    }

    pub fn as_rgb(&self) -> Option<&CachedSource<Argb>> {
        match self {
            AnySource::Rgb(source) => Some(source),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&CachedSource<f32>> {
        match self {
            AnySource::F32(source) => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::memory_reader::MemoryReader;
    use crate::volume::sample::PixelType;
    use glam::DVec3;
    use std::sync::atomic::Ordering;

    fn shared(reader: MemoryReader) -> Arc<SharedReader> {
        Arc::new(SharedReader::open(Box::new(reader)).unwrap())
    }

    fn two_timepoints() -> MemoryReader {
        // two channels, two timepoints, plane value = 10 * t + c + z
        let planes = (0..2)
            .flat_map(|t| (0..2).flat_map(move |c| (0..2).map(move |z| vec![10 * t + c + z; 16])))
            .collect();
        MemoryReader::new(PixelType::Uint8, false)
            .channels(2)
            .timepoints(2)
            .with_level(UVec3::new(4, 4, 2), planes)
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: SourceOptions =
            serde_json::from_str(r#"{"name": "nuclei", "cachePolicy": {"maxCells": 4}}"#).unwrap();
        assert_eq!(options.name, "nuclei");
        assert_eq!(options.channel, 0);
        assert_eq!(options.root_transform, DAffine3::IDENTITY);
        assert_eq!(options.voxel_size, VoxelSize::default());
        assert_eq!(options.cache_policy.max_cells, 4);
    }

    #[test]
    fn options_are_built_fluently() {
        let options = SourceOptions::new("membranes")
            .channel(1)
            .voxel_size(VoxelSize::new(DVec3::new(0.2, 0.2, 1.0), "µm"))
            .root_transform(DAffine3::from_translation(DVec3::X));
        assert_eq!(options.channel, 1);
        assert_eq!(options.voxel_size.unit, "µm");
        assert_eq!(options.root_transform.translation, DVec3::X);
    }

    #[test]
    fn sources_read_their_channel_and_timepoint() {
        let options = SourceOptions::new("c1").channel(1);
        let source = CachedSource::<u8>::from_reader(shared(two_timepoints()), options).unwrap();
        assert_eq!(source.timepoint_count(), 2);
        assert!(source.is_present(1));
        assert!(!source.is_present(2));
        let grid = source.grid(1, 0).unwrap();
        assert_eq!(grid.get(UVec3::new(0, 0, 0)).unwrap(), 11);
        assert_eq!(grid.get(UVec3::new(3, 3, 1)).unwrap(), 12);
        assert!(matches!(
            source.grid(2, 0),
            Err(PyramidError::TimepointOutOfRange { timepoint: 2, count: 2 })
        ));
        assert!(source.transform(2, 0).is_err());
    }

    #[test]
    fn mismatched_types_and_channels_are_rejected() {
        assert!(matches!(
            CachedSource::<u16>::from_reader(shared(two_timepoints()), SourceOptions::default()),
            Err(PyramidError::UnsupportedSampleType(_))
        ));
        assert!(matches!(
            CachedSource::<u8>::from_reader(
                shared(two_timepoints()),
                SourceOptions::default().channel(2)
            ),
            Err(PyramidError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn short_tiles_are_io_errors() {
        let reader = MemoryReader::new(PixelType::Uint16, false)
            .with_level(UVec3::new(2, 2, 1), vec![vec![0; 7]]);
        let source = CachedSource::<u16>::from_reader(shared(reader), SourceOptions::default())
            .unwrap();
        let err = source.grid(0, 0).unwrap().get(UVec3::ZERO).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn any_source_dispatches_on_the_reader_type() {
        let data: Vec<u16> = (0..64).collect();
        let reader = MemoryReader::from_u16_volume(UVec3::new(4, 4, 4), &data, 2, false);
        let source = AnySource::open(Box::new(reader), SourceOptions::new("ramp")).unwrap();
        assert_eq!(source.sample_type(), SampleType::U16);
        assert_eq!(source.geometry().mipmap_level_count(), 2);
        assert_eq!(source.geometry().name(), "ramp");
        let source = source.as_u16().unwrap();
        assert_eq!(source.sample_type(), SampleType::U16);
        assert_eq!(
            source.grid(0, 0).unwrap().get(UVec3::new(1, 2, 3)).unwrap(),
            57
        );

        let rgb = MemoryReader::new(PixelType::Uint8, true)
            .with_level(UVec3::new(1, 1, 1), vec![vec![1, 2, 3]]);
        let source = AnySource::open(Box::new(rgb), SourceOptions::default()).unwrap();
        let grid = source.as_rgb().unwrap().grid(0, 0).unwrap();
        assert_eq!(grid.get(UVec3::ZERO).unwrap(), Argb::from_rgb(1, 2, 3));
        assert!(source.as_u8().is_none());
    }

    #[test]
    fn cells_follow_the_reader_tile_size() {
        let reader = MemoryReader::from_u8_volume(UVec3::new(8, 8, 1), &[5; 64], 1).tile_size(4, 2);
        let counter = reader.read_counter();
        let source = CachedSource::<u8>::from_reader(shared(reader), SourceOptions::default())
            .unwrap();
        let grid = source.grid(0, 0).unwrap();
        assert_eq!(grid.layout().cell_shape(), UVec3::new(4, 2, 1));
        grid.load_all().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        assert_eq!(source.stats().cells_decoded, 8);
    }

    #[test]
    fn coarser_levels_cover_the_same_region() {
        let reader = MemoryReader::from_u8_volume(UVec3::new(8, 8, 4), &[1; 256], 3);
        let root = DAffine3::from_scale(DVec3::new(0.5, 0.5, 2.0));
        let source = CachedSource::<u8>::from_reader(
            shared(reader),
            SourceOptions::default().root_transform(root),
        )
        .unwrap();
        assert_eq!(source.mipmap_level_count(), 3);
        for level in 0..3 {
            let extent = source.dimensions(level).unwrap().as_dvec3();
            let world = source.transform(0, level).unwrap().transform_vector3(extent);
            assert_eq!(world, DVec3::new(4.0, 4.0, 8.0));
        }
    }
}
