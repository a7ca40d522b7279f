use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::UVec3;

use crate::error::{PyramidError, PyramidResult};
use crate::util::extent::box_volume;
use crate::volume::reader::FormatReader;
use crate::volume::sample::{PixelType, SampleType};

#[derive(Clone, Debug)]
struct MemoryLevel {
    dimensions: UVec3,

    /// Raw bytes per plane, indexed by plane index.
    planes: Vec<Vec<u8>>,
}

/// A [`FormatReader`] over planes held in memory.
///
/// Useful for synthetic pyramids and as a reference for the reader contract. Every call to
/// `open_bytes` is counted, see [`MemoryReader::read_counter`].
#[derive(Clone, Debug)]
pub struct MemoryReader {
    pixel_type: PixelType,
    rgb: bool,
    interleaved: bool,
    little_endian: bool,
    size_c: u32,
    size_t: u32,
    tile_size: Option<(u32, u32)>,
    levels: Vec<MemoryLevel>,
    current: usize,
    reads: Arc<AtomicUsize>,
}

impl MemoryReader {
    pub fn new(pixel_type: PixelType, rgb: bool) -> Self {
        Self {
            pixel_type,
            rgb,
            interleaved: true,
            little_endian: true,
            size_c: 1,
            size_t: 1,
            tile_size: None,
            levels: Vec::new(),
            current: 0,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn little_endian(mut self, little_endian: bool) -> Self {
        self.little_endian = little_endian;
        self
    }

    pub fn interleaved(mut self, interleaved: bool) -> Self {
        self.interleaved = interleaved;
        self
    }

    pub fn channels(mut self, size_c: u32) -> Self {
        self.size_c = size_c;
        self
    }

    pub fn timepoints(mut self, size_t: u32) -> Self {
        self.size_t = size_t;
        self
    }

    pub fn tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_size = Some((width, height));
        self
    }

    /// Appends a resolution level. `planes` holds the raw bytes of each plane in ZCT order.
    pub fn with_level(mut self, dimensions: UVec3, planes: Vec<Vec<u8>>) -> Self {
        self.levels.push(MemoryLevel { dimensions, planes });
        self
    }

    /// A single-channel, single-timepoint 8-bit pyramid built from a level-0 volume (x fastest) by
    /// repeated 2x box downsampling.
    ///
    /// # Panics
    /// Panics if `data` holds fewer samples than `dimensions` describe.
    pub fn from_u8_volume(dimensions: UVec3, data: &[u8], num_levels: usize) -> Self {
        let values = data.iter().map(|v| *v as f64).collect();
        let levels = downsampled_levels(dimensions, values, num_levels);
        levels.into_iter().fold(
            Self::new(PixelType::Uint8, false),
            |reader, (dimensions, values)| {
                let bytes = values.iter().map(|v| v.round() as u8).collect();
                reader.with_level(dimensions, split_planes(dimensions, bytes, 1))
            },
        )
    }

    /// A single-channel, single-timepoint 16-bit pyramid, see [`MemoryReader::from_u8_volume`].
    pub fn from_u16_volume(
        dimensions: UVec3,
        data: &[u16],
        num_levels: usize,
        little_endian: bool,
    ) -> Self {
        let values = data.iter().map(|v| *v as f64).collect();
        let levels = downsampled_levels(dimensions, values, num_levels);
        levels.into_iter().fold(
            Self::new(PixelType::Uint16, false).little_endian(little_endian),
            |reader, (dimensions, values)| {
                let bytes = values
                    .iter()
                    .flat_map(|v| {
                        let v = v.round() as u16;
                        if little_endian {
                            v.to_le_bytes()
                        } else {
                            v.to_be_bytes()
                        }
                    })
                    .collect();
                reader.with_level(dimensions, split_planes(dimensions, bytes, 2))
            },
        )
    }

    /// A shared counter of `open_bytes` calls.
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }

    fn level(&self) -> PyramidResult<&MemoryLevel> {
        self.levels
            .get(self.current)
            .ok_or_else(|| PyramidError::reader("no resolution level selected"))
    }

    fn bytes_per_pixel(&self) -> usize {
        match SampleType::from_reader(self.pixel_type, self.rgb) {
            Ok(sample_type) => sample_type.bytes_per_sample(),
            Err(_) => 1,
        }
    }
}

impl FormatReader for MemoryReader {
    fn resolution_count(&self) -> usize {
        self.levels.len()
    }

    fn set_resolution(&mut self, level: usize) -> PyramidResult<()> {
        if level >= self.levels.len() {
            return Err(PyramidError::LevelOutOfRange {
                level,
                count: self.levels.len(),
            });
        }
        self.current = level;
        Ok(())
    }

    fn resolution(&self) -> usize {
        self.current
    }

    fn size_x(&self) -> u32 {
        self.level().map(|l| l.dimensions.x).unwrap_or(0)
    }

    fn size_y(&self) -> u32 {
        self.level().map(|l| l.dimensions.y).unwrap_or(0)
    }

    fn size_z(&self) -> u32 {
        self.level().map(|l| l.dimensions.z).unwrap_or(0)
    }

    fn size_c(&self) -> u32 {
        self.size_c
    }

    fn size_t(&self) -> u32 {
        self.size_t
    }

    fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    fn is_rgb(&self) -> bool {
        self.rgb
    }

    fn is_interleaved(&self) -> bool {
        self.interleaved
    }

    fn is_little_endian(&self) -> bool {
        self.little_endian
    }

    fn optimal_tile_size(&self) -> Option<(u32, u32)> {
        self.tile_size
    }

    fn open_bytes(
        &mut self,
        plane: u32,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> PyramidResult<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let bytes_per_pixel = self.bytes_per_pixel();
        let level = self.level()?;
        let dimensions = level.dimensions;
        let exceeds_x = x as u64 + w as u64 > dimensions.x as u64;
        let exceeds_y = y as u64 + h as u64 > dimensions.y as u64;
        if exceeds_x || exceeds_y {
            return Err(PyramidError::RegionOutOfBounds {
                origin: UVec3::new(x, y, 0),
                shape: UVec3::new(w, h, 1),
                bounds: UVec3::new(dimensions.x, dimensions.y, 1),
            });
        }
        let data = level
            .planes
            .get(plane as usize)
            .ok_or_else(|| PyramidError::reader(format!("no plane {plane}")))?;
        let row_len = dimensions.x as usize * bytes_per_pixel;
        if data.len() < row_len * dimensions.y as usize {
            return Err(PyramidError::ShortRead {
                expected: row_len * dimensions.y as usize,
                actual: data.len(),
            });
        }

        let mut out = Vec::with_capacity(w as usize * h as usize * bytes_per_pixel);
        for row in y..y + h {
            let start = row as usize * row_len + x as usize * bytes_per_pixel;
            out.extend_from_slice(&data[start..start + w as usize * bytes_per_pixel]);
        }
        Ok(out)
    }
}

fn split_planes(dimensions: UVec3, bytes: Vec<u8>, bytes_per_pixel: usize) -> Vec<Vec<u8>> {
    let plane_len = (dimensions.x * dimensions.y) as usize * bytes_per_pixel;
    if plane_len == 0 {
        return vec![Vec::new(); dimensions.z as usize];
    }
    bytes.chunks(plane_len).map(|c| c.to_vec()).collect()
}

/// Level 0 followed by `num_levels - 1` levels, each averaging 2x2x2 blocks of its predecessor.
/// Axes of a single pixel are not downsampled.
fn downsampled_levels(
    dimensions: UVec3,
    data: Vec<f64>,
    num_levels: usize,
) -> Vec<(UVec3, Vec<f64>)> {
    let mut levels = vec![(dimensions, data)];
    while levels.len() < num_levels {
        let (previous_dimensions, previous) = &levels[levels.len() - 1];
        let next_dimensions = (*previous_dimensions / 2).max(UVec3::ONE);
        let factor = *previous_dimensions / next_dimensions;
        let mut next = Vec::with_capacity(box_volume(&next_dimensions) as usize);
        for z in 0..next_dimensions.z {
            for y in 0..next_dimensions.y {
                for x in 0..next_dimensions.x {
                    let mut sum = 0.0;
                    let mut count = 0.0;
                    for dz in 0..factor.z {
                        for dy in 0..factor.y {
                            for dx in 0..factor.x {
                                let p = UVec3::new(x, y, z) * factor + UVec3::new(dx, dy, dz);
                                let index = p.x
                                    + previous_dimensions.x
                                        * (p.y + previous_dimensions.y * p.z);
                                sum += previous[index as usize];
                                count += 1.0;
                            }
                        }
                    }
                    next.push(sum / count);
                }
            }
        }
        levels.push((next_dimensions, next));
    }
    levels
}
