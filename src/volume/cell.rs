use glam::UVec3;

use crate::error::{PyramidError, PyramidResult};
use crate::util::extent::{box_volume, box_within, div_ceil, IndexToSubscript, SubscriptToIndex};
use crate::volume::meta::CacheKey;
use crate::volume::sample::Sample;

/// The cell shape used when neither the cache policy nor the reader prefers one.
pub const DEFAULT_CELL_SHAPE: UVec3 = UVec3::new(512, 512, 1);

/// Identifies one cell of one grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub grid: CacheKey,

    /// The cell's position in the grid's cell raster.
    pub index: UVec3,
}

/// The box of pixels covered by a cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CellBounds {
    pub origin: UVec3,
    pub shape: UVec3,
}

impl CellBounds {
    pub fn new(origin: UVec3, shape: UVec3) -> Self {
        Self { origin, shape }
    }

    pub fn num_samples(&self) -> usize {
        box_volume(&self.shape) as usize
    }

    pub fn contains(&self, position: UVec3) -> bool {
        position.cmpge(self.origin).all() && position.cmplt(self.origin + self.shape).all()
    }
}

/// A fully decoded block of samples.
///
/// Cells only ever exist in their decoded state: they are created from a complete sample buffer
/// and never mutated afterwards.
#[derive(Debug)]
pub struct Cell<T> {
    bounds: CellBounds,
    data: Vec<T>,
}

impl<T: Sample> Cell<T> {
    pub fn new(bounds: CellBounds, data: Vec<T>) -> PyramidResult<Self> {
        if data.len() != bounds.num_samples() {
            return Err(PyramidError::ShortRead {
                expected: bounds.num_samples() * std::mem::size_of::<T>(),
                actual: data.len() * std::mem::size_of::<T>(),
            });
        }
        Ok(Self { bounds, data })
    }

    pub fn bounds(&self) -> &CellBounds {
        &self.bounds
    }

    /// The samples of this cell, x varying fastest.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn byte_size(&self) -> usize {
        std::mem::size_of_val(self.data.as_slice())
    }

    /// The sample at a position relative to the cell's origin.
    pub fn get_local(&self, local: UVec3) -> T {
        self.data[local.to_index(&self.bounds.shape) as usize]
    }
}

/// Partitions a grid into cells of a fixed shape. Cells at the upper borders are truncated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CellLayout {
    dimensions: UVec3,
    cell_shape: UVec3,
    cells_per_dimension: UVec3,
}

impl CellLayout {
    /// Creates a layout for a grid of `dimensions`, clipping `cell_shape` to the grid.
    pub fn new(dimensions: UVec3, cell_shape: UVec3) -> Self {
        let clipped = cell_shape.min(dimensions).max(UVec3::ONE);
        if clipped != cell_shape {
            log::debug!("clipped cell shape {cell_shape} to {clipped} for grid of {dimensions}");
        }
        Self {
            dimensions,
            cell_shape: clipped,
            cells_per_dimension: div_ceil(&dimensions, &clipped),
        }
    }

    pub fn dimensions(&self) -> UVec3 {
        self.dimensions
    }

    pub fn cell_shape(&self) -> UVec3 {
        self.cell_shape
    }

    pub fn cells_per_dimension(&self) -> UVec3 {
        self.cells_per_dimension
    }

    pub fn num_cells(&self) -> usize {
        box_volume(&self.cells_per_dimension) as usize
    }

    /// The index of the cell containing `position`.
    pub fn cell_index_of(&self, position: UVec3) -> UVec3 {
        position / self.cell_shape
    }

    pub fn cell_bounds(&self, index: UVec3) -> PyramidResult<CellBounds> {
        if !index.cmplt(self.cells_per_dimension).all() {
            return Err(PyramidError::RegionOutOfBounds {
                origin: index,
                shape: UVec3::ONE,
                bounds: self.cells_per_dimension,
            });
        }
        let origin = index * self.cell_shape;
        let shape = self.cell_shape.min(self.dimensions - origin);
        Ok(CellBounds::new(origin, shape))
    }

    /// All cell indices in raster order.
    pub fn cell_indices(&self) -> impl Iterator<Item = UVec3> + '_ {
        (0..self.num_cells() as u64).map(|i| self.cells_per_dimension.index_to_subscript(i))
    }

    /// Fails unless the box at `origin` with `shape` lies within the grid.
    pub fn check_region(&self, origin: UVec3, shape: UVec3) -> PyramidResult<()> {
        if box_within(&origin, &shape, &self.dimensions) {
            Ok(())
        } else {
            Err(PyramidError::RegionOutOfBounds {
                origin,
                shape,
                bounds: self.dimensions,
            })
        }
    }
}
