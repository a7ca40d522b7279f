use std::sync::Arc;

use glam::UVec3;
use rayon::prelude::*;

use crate::error::PyramidResult;
use crate::util::extent::{box_volume, subscript_to_index};
use crate::volume::cache::{CellCache, StatsCounters};
use crate::volume::cell::{Cell, CellBounds, CellKey, CellLayout};
use crate::volume::meta::CacheKey;
use crate::volume::sample::Sample;

/// Produces the samples of a cell.
///
/// Loading must be a pure function of the grid key and the cell bounds, so that evicted cells can
/// be loaded again with identical results.
pub trait CellLoader<T: Sample>: Send + Sync {
    /// Returns the samples within `bounds` of the grid identified by `key`, x varying fastest.
    fn load(&self, key: CacheKey, bounds: &CellBounds) -> PyramidResult<Vec<T>>;
}

/// The pixel grid of one (timepoint, level) of a source.
///
/// A grid is a lazy view: cells are loaded on first access and kept in the source's bounded cell
/// cache, from which they may be evicted and loaded again at any time.
pub struct CachedGrid<T: Sample> {
    key: CacheKey,
    layout: CellLayout,
    cells: Arc<CellCache<T>>,
    loader: Arc<dyn CellLoader<T>>,
    stats: Arc<StatsCounters>,
}

impl<T: Sample> CachedGrid<T> {
    pub(crate) fn new(
        key: CacheKey,
        layout: CellLayout,
        cells: Arc<CellCache<T>>,
        loader: Arc<dyn CellLoader<T>>,
        stats: Arc<StatsCounters>,
    ) -> Self {
        Self {
            key,
            layout,
            cells,
            loader,
            stats,
        }
    }

    pub fn key(&self) -> CacheKey {
        self.key
    }

    pub fn dimensions(&self) -> UVec3 {
        self.layout.dimensions()
    }

    pub fn layout(&self) -> &CellLayout {
        &self.layout
    }

    /// Returns the cell at `index` in the cell raster, loading it if it is not resident.
    pub fn cell(&self, index: UVec3) -> PyramidResult<Arc<Cell<T>>> {
        let bounds = self.layout.cell_bounds(index)?;
        self.stats.cell_requested();
        let key = CellKey {
            grid: self.key,
            index,
        };
        self.cells.get_or_load(key, || {
            self.stats.cell_decoded();
            log::trace!(
                "loading cell {} ({} + {}) of t={} level={}",
                index,
                bounds.origin,
                bounds.shape,
                self.key.timepoint,
                self.key.level
            );
            let data = self.loader.load(self.key, &bounds)?;
            Cell::new(bounds, data)
        })
    }

    /// Returns the sample at `position`.
    pub fn get(&self, position: UVec3) -> PyramidResult<T> {
        self.layout.check_region(position, UVec3::ONE)?;
        let cell = self.cell(self.layout.cell_index_of(position))?;
        Ok(cell.get_local(position - cell.bounds().origin))
    }

    /// Copies the box at `origin` with `shape` into a buffer, x varying fastest.
    pub fn read_region(&self, origin: UVec3, shape: UVec3) -> PyramidResult<Vec<T>> {
        self.layout.check_region(origin, shape)?;
        let mut out = vec![T::zeroed(); box_volume(&shape) as usize];
        if out.is_empty() {
            return Ok(out);
        }
        let end = origin + shape;
        let first = self.layout.cell_index_of(origin);
        let last = self.layout.cell_index_of(end - UVec3::ONE);
        for cz in first.z..=last.z {
            for cy in first.y..=last.y {
                for cx in first.x..=last.x {
                    let cell = self.cell(UVec3::new(cx, cy, cz))?;
                    let bounds = cell.bounds();
                    let lo = bounds.origin.max(origin);
                    let hi = (bounds.origin + bounds.shape).min(end);
                    for z in lo.z..hi.z {
                        for y in lo.y..hi.y {
                            let row = UVec3::new(lo.x, y, z);
                            let src =
                                subscript_to_index(&(row - bounds.origin), &bounds.shape) as usize;
                            let dst = subscript_to_index(&(row - origin), &shape) as usize;
                            let len = (hi.x - lo.x) as usize;
                            out[dst..dst + len].copy_from_slice(&cell.data()[src..src + len]);
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Loads every cell of this grid in parallel. Fails if any cell fails to load.
    pub fn load_all(&self) -> PyramidResult<()> {
        let indices: Vec<UVec3> = self.layout.cell_indices().collect();
        let result = indices
            .par_iter()
            .try_for_each(|index| self.cell(*index).map(|_| ()));
        if let Err(err) = &result {
            log::error!(
                "failed to load grid t={} level={}: {}",
                self.key.timepoint,
                self.key.level,
                err
            );
        }
        result
    }
}

impl<T: Sample> std::fmt::Debug for CachedGrid<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedGrid")
            .field("key", &self.key)
            .field("layout", &self.layout)
            .finish()
    }
}
