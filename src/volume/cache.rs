use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::UVec3;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};

use crate::error::{PyramidError, PyramidResult};
use crate::volume::cell::{Cell, CellKey, DEFAULT_CELL_SHAPE};
use crate::volume::sample::Sample;

fn default_max_cells() -> u64 {
    1000
}

/// Bounds and shapes the cells cached by a source.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CachePolicy {
    /// The shape of a cell. If not set, the reader's native tile size is used, or
    /// [`DEFAULT_CELL_SHAPE`] if the reader has none.
    /// Cells are clipped to the grid they belong to.
    #[serde(rename = "cellShape")]
    #[serde(default)]
    pub cell_shape: Option<UVec3>,

    /// The maximum number of resident cells. Ignored if `max_bytes` is set.
    #[serde(rename = "maxCells")]
    #[serde(default = "default_max_cells")]
    pub max_cells: u64,

    /// The maximum number of bytes held by resident cells.
    #[serde(rename = "maxBytes")]
    #[serde(default)]
    pub max_bytes: Option<u64>,
}

impl CachePolicy {
    /// Picks the cell shape for a source whose reader prefers `preferred`.
    pub fn cell_shape_or(&self, preferred: Option<UVec3>) -> UVec3 {
        self.cell_shape
            .or(preferred)
            .unwrap_or(DEFAULT_CELL_SHAPE)
            .max(UVec3::ONE)
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            cell_shape: None,
            max_cells: default_max_cells(),
            max_bytes: None,
        }
    }
}

/// A snapshot of a cache's counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Grids constructed, at most one per (timepoint, level).
    pub grids_constructed: u64,

    /// Cell decodes started, including failed ones and reloads after eviction.
    pub cells_decoded: u64,

    /// Cell lookups, whether they hit the cache or not.
    pub cell_requests: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    grids_constructed: AtomicU64,
    cells_decoded: AtomicU64,
    cell_requests: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn grid_constructed(&self) {
        self.grids_constructed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cell_decoded(&self) {
        self.cells_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cell_requested(&self) {
        self.cell_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            grids_constructed: self.grids_constructed.load(Ordering::Relaxed),
            cells_decoded: self.cells_decoded.load(Ordering::Relaxed),
            cell_requests: self.cell_requests.load(Ordering::Relaxed),
        }
    }
}

/// A bounded cache of decoded cells, evicting least recently used cells when over budget.
///
/// Loading a cell is single-flight: concurrent requests for a missing cell wait for one load
/// and share its result. A cell only becomes resident, and thus evictable, once it is fully
/// decoded. Evicted cells are decoded again on their next request.
pub struct CellCache<T: Sample> {
    cells: Cache<CellKey, Arc<Cell<T>>>,
}

impl<T: Sample> CellCache<T> {
    pub fn new(policy: &CachePolicy) -> Self {
        let builder = Cache::builder().eviction_policy(EvictionPolicy::lru());
        let cells = match policy.max_bytes {
            Some(max_bytes) => builder
                .weigher(|_key: &CellKey, cell: &Arc<Cell<T>>| {
                    u32::try_from(cell.byte_size()).unwrap_or(u32::MAX)
                })
                .max_capacity(max_bytes)
                .build(),
            None => builder.max_capacity(policy.max_cells).build(),
        };
        Self { cells }
    }

    /// Returns the cell for `key`, running `load` if it is not resident.
    /// Errors are not cached: a failed load is retried by the next request.
    pub fn get_or_load(
        &self,
        key: CellKey,
        load: impl FnOnce() -> PyramidResult<Cell<T>>,
    ) -> PyramidResult<Arc<Cell<T>>> {
        self.cells
            .try_get_with(key, || load().map(Arc::new))
            .map_err(PyramidError::Shared)
    }

    pub fn get(&self, key: &CellKey) -> Option<Arc<Cell<T>>> {
        self.cells.get(key)
    }

    pub fn invalidate_all(&self) {
        for (key, _) in self.cells.iter() {
            self.cells.invalidate(key.as_ref());
        }
        self.cells.run_pending_tasks();
    }

    /// The number of resident cells after applying pending evictions.
    pub fn resident_cells(&self) -> u64 {
        self.cells.run_pending_tasks();
        self.cells.entry_count()
    }
}
