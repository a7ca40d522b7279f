use std::sync::Mutex;

use glam::UVec3;

use crate::error::{PyramidError, PyramidResult};
use crate::volume::cell::CellBounds;
use crate::volume::sample::{ByteLayout, PixelType, SampleType};

/// A stateful decoder for one image series of a (typically on-disk) multi-resolution format.
///
/// Readers are not expected to be safe for concurrent use: the current resolution level is
/// reader state, and `open_bytes` reads from whichever level was selected last. Wrap a reader in
/// a [`SharedReader`] to use it from several threads.
pub trait FormatReader: Send {
    /// The number of resolution levels of the series.
    fn resolution_count(&self) -> usize;

    /// Selects the resolution level subsequent calls refer to.
    fn set_resolution(&mut self, level: usize) -> PyramidResult<()>;

    /// The currently selected resolution level.
    fn resolution(&self) -> usize;

    /// Width of the current resolution level in pixels.
    fn size_x(&self) -> u32;

    /// Height of the current resolution level in pixels.
    fn size_y(&self) -> u32;

    /// Number of planes along z at the current resolution level.
    fn size_z(&self) -> u32;

    /// Number of effective channels. An interleaved RGB image counts as one channel.
    fn size_c(&self) -> u32;

    /// Number of timepoints.
    fn size_t(&self) -> u32;

    fn pixel_type(&self) -> PixelType;

    fn is_rgb(&self) -> bool;

    fn is_interleaved(&self) -> bool;

    fn is_little_endian(&self) -> bool;

    /// The plane holding slice `z` of channel `c` at timepoint `t`, in ZCT order by default.
    fn plane_index(&self, z: u32, c: u32, t: u32) -> u32 {
        z + self.size_z() * (c + self.size_c() * t)
    }

    /// The tile size the format stores natively, if any.
    fn optimal_tile_size(&self) -> Option<(u32, u32)> {
        None
    }

    /// Reads the bytes of the `w` x `h` region at (`x`, `y`) of `plane`.
    fn open_bytes(
        &mut self,
        plane: u32,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> PyramidResult<Vec<u8>>;
}

/// A [`FormatReader`] shared between threads.
///
/// All calls into the wrapped reader are serialized by a single lock. Selecting the resolution
/// level and reading the planes of a cell happen within the same critical section. Metadata that
/// does not change after opening is read once up front and served without locking.
pub struct SharedReader {
    reader: Mutex<Box<dyn FormatReader>>,
    sample_type: SampleType,
    layout: ByteLayout,
    level_dimensions: Vec<UVec3>,
    size_c: u32,
    size_t: u32,
    tile_size: Option<UVec3>,
}

impl SharedReader {
    pub fn open(mut reader: Box<dyn FormatReader>) -> PyramidResult<Self> {
        let sample_type = SampleType::from_reader(reader.pixel_type(), reader.is_rgb())?;
        let layout = ByteLayout {
            little_endian: reader.is_little_endian(),
            interleaved: reader.is_interleaved(),
        };
        sample_type.check_layout(layout)?;

        let resolution_count = reader.resolution_count();
        if resolution_count == 0 {
            return Err(PyramidError::reader("reader reports no resolution levels"));
        }
        let mut level_dimensions = Vec::with_capacity(resolution_count);
        for level in 0..resolution_count {
            reader.set_resolution(level)?;
            level_dimensions.push(UVec3::new(
                reader.size_x(),
                reader.size_y(),
                reader.size_z(),
            ));
        }
        reader.set_resolution(0)?;

        let tile_size = reader
            .optimal_tile_size()
            .filter(|(w, h)| *w > 0 && *h > 0)
            .map(|(w, h)| UVec3::new(w, h, 1));
        let size_c = reader.size_c();
        let size_t = reader.size_t();

        log::debug!(
            "opened reader: {:?} samples, {} levels, {} channels, {} timepoints",
            sample_type,
            resolution_count,
            size_c,
            size_t
        );

        Ok(Self {
            reader: Mutex::new(reader),
            sample_type,
            layout,
            level_dimensions,
            size_c,
            size_t,
            tile_size,
        })
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    pub fn layout(&self) -> ByteLayout {
        self.layout
    }

    pub fn level_dimensions(&self) -> &[UVec3] {
        &self.level_dimensions
    }

    pub fn size_c(&self) -> u32 {
        self.size_c
    }

    pub fn size_t(&self) -> u32 {
        self.size_t
    }

    /// The reader's native tile size as a planar cell shape.
    pub fn tile_size(&self) -> Option<UVec3> {
        self.tile_size
    }

    /// Reads the raw bytes of every plane intersecting `bounds`, one buffer per z slice.
    pub fn read_planes(
        &self,
        level: usize,
        channel: u32,
        timepoint: u32,
        bounds: &CellBounds,
    ) -> PyramidResult<Vec<Vec<u8>>> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|_| PyramidError::Poisoned("reader"))?;
        if reader.resolution() != level {
            log::trace!("switching reader from level {} to {}", reader.resolution(), level);
            reader.set_resolution(level)?;
        }
        (bounds.origin.z..bounds.origin.z + bounds.shape.z)
            .map(|z| {
                let plane = reader.plane_index(z, channel, timepoint);
                reader.open_bytes(
                    plane,
                    bounds.origin.x,
                    bounds.origin.y,
                    bounds.shape.x,
                    bounds.shape.y,
                )
            })
            .collect()
    }
}

impl std::fmt::Debug for SharedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedReader")
            .field("sample_type", &self.sample_type)
            .field("layout", &self.layout)
            .field("level_dimensions", &self.level_dimensions)
            .field("size_c", &self.size_c)
            .field("size_t", &self.size_t)
            .finish()
    }
}
