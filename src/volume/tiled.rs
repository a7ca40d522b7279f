use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use glam::UVec3;

use crate::error::{PyramidError, PyramidResult};
use crate::volume::cache::{CachePolicy, CacheStats, CellCache, StatsCounters};
use crate::volume::cell::CellLayout;
use crate::volume::grid::{CachedGrid, CellLoader};
use crate::volume::meta::CacheKey;
use crate::volume::sample::Sample;

type GridSlot<T> = Arc<OnceLock<Arc<CachedGrid<T>>>>;

/// Lazily constructs and caches the grids of a multi-resolution source.
///
/// Each (timepoint, level) key maps to exactly one [`CachedGrid`] for the lifetime of the cache.
/// Concurrent first requests for a key block on that key's slot while a single caller constructs
/// the grid, requests for other keys proceed independently. All grids share one bounded
/// [`CellCache`] and one [`CellLoader`].
pub struct TiledCache<T: Sample> {
    level_dimensions: Vec<UVec3>,
    cell_shape: UVec3,
    loader: Arc<dyn CellLoader<T>>,
    cells: Arc<CellCache<T>>,
    grids: Mutex<HashMap<CacheKey, GridSlot<T>>>,
    stats: Arc<StatsCounters>,
}

impl<T: Sample> TiledCache<T> {
    /// `preferred_cell_shape` is used if `policy` does not define a cell shape.
    pub fn new(
        level_dimensions: Vec<UVec3>,
        policy: &CachePolicy,
        preferred_cell_shape: Option<UVec3>,
        loader: Arc<dyn CellLoader<T>>,
    ) -> Self {
        Self {
            level_dimensions,
            cell_shape: policy.cell_shape_or(preferred_cell_shape),
            loader,
            cells: Arc::new(CellCache::new(policy)),
            grids: Mutex::new(HashMap::new()),
            stats: Arc::new(StatsCounters::default()),
        }
    }

    pub fn level_count(&self) -> usize {
        self.level_dimensions.len()
    }

    /// The unclipped cell shape used for all levels.
    pub fn cell_shape(&self) -> UVec3 {
        self.cell_shape
    }

    /// Returns the grid for `timepoint` and `level`, constructing it on first request.
    /// Timepoints are not validated here, sources check presence before calling.
    pub fn grid_for(&self, timepoint: usize, level: usize) -> PyramidResult<Arc<CachedGrid<T>>> {
        let dimensions =
            *self
                .level_dimensions
                .get(level)
                .ok_or(PyramidError::LevelOutOfRange {
                    level,
                    count: self.level_dimensions.len(),
                })?;
        let key = CacheKey::new(timepoint, level);
        let slot = {
            let mut grids = self
                .grids
                .lock()
                .map_err(|_| PyramidError::Poisoned("grid registry"))?;
            grids.entry(key).or_default().clone()
        };
        let grid = slot.get_or_init(|| {
            self.stats.grid_constructed();
            let layout = CellLayout::new(dimensions, self.cell_shape);
            log::debug!(
                "constructing grid t={} level={}: {} in {} cells of {}",
                timepoint,
                level,
                dimensions,
                layout.num_cells(),
                layout.cell_shape()
            );
            Arc::new(CachedGrid::new(
                key,
                layout,
                self.cells.clone(),
                self.loader.clone(),
                self.stats.clone(),
            ))
        });
        Ok(grid.clone())
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Drops all resident cells. Grids stay valid and reload cells on demand.
    pub fn invalidate_cells(&self) {
        self.cells.invalidate_all();
    }

    pub fn resident_cells(&self) -> u64 {
        self.cells.resident_cells()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::cell::CellBounds;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    /// Fills every cell with `x + 100 * y + 1000 * z + 10000 * level` and counts loads.
    #[derive(Default)]
    struct RampLoader {
        loads: AtomicUsize,
    }

    impl CellLoader<f32> for RampLoader {
        fn load(&self, key: CacheKey, bounds: &CellBounds) -> PyramidResult<Vec<f32>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let mut data = Vec::with_capacity(bounds.num_samples());
            for z in bounds.origin.z..bounds.origin.z + bounds.shape.z {
                for y in bounds.origin.y..bounds.origin.y + bounds.shape.y {
                    for x in bounds.origin.x..bounds.origin.x + bounds.shape.x {
                        data.push((x + 100 * y + 1000 * z + 10000 * key.level as u32) as f32);
                    }
                }
            }
            Ok(data)
        }
    }

    struct FailingLoader;

    impl CellLoader<f32> for FailingLoader {
        fn load(&self, _key: CacheKey, _bounds: &CellBounds) -> PyramidResult<Vec<f32>> {
            Err(PyramidError::reader("unreadable tile"))
        }
    }

    fn ramp_cache(policy: CachePolicy) -> (TiledCache<f32>, Arc<RampLoader>) {
        let loader = Arc::new(RampLoader::default());
        let cache = TiledCache::new(
            vec![UVec3::new(20, 10, 2), UVec3::new(10, 5, 1)],
            &policy,
            Some(UVec3::new(8, 8, 1)),
            loader.clone(),
        );
        (cache, loader)
    }

    #[test]
    fn grids_are_constructed_once_per_key() {
        let (cache, _) = ramp_cache(CachePolicy::default());
        let a = cache.grid_for(0, 1).unwrap();
        let b = cache.grid_for(0, 1).unwrap();
        let c = cache.grid_for(1, 1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.stats().grids_constructed, 2);
    }

    #[test]
    fn concurrent_first_requests_share_one_grid_and_one_decode() {
        const THREADS: usize = 16;
        let (cache, loader) = ramp_cache(CachePolicy::default());
        let barrier = Barrier::new(THREADS);
        let grids: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        let grid = cache.grid_for(0, 0).unwrap();
                        assert_eq!(grid.get(UVec3::new(3, 2, 1)).unwrap(), 1203.0);
                        grid
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(grids.iter().all(|g| Arc::ptr_eq(g, &grids[0])));
        assert_eq!(cache.stats().grids_constructed, 1);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cell_shape_comes_from_the_reader_and_is_clipped() {
        let (cache, _) = ramp_cache(CachePolicy::default());
        assert_eq!(cache.cell_shape(), UVec3::new(8, 8, 1));
        let grid = cache.grid_for(0, 1).unwrap();
        assert_eq!(grid.layout().cell_shape(), UVec3::new(8, 5, 1));
        assert_eq!(grid.layout().num_cells(), 2);
    }

    #[test]
    fn samples_are_read_through_cells() {
        let (cache, loader) = ramp_cache(CachePolicy::default());
        let grid = cache.grid_for(0, 0).unwrap();
        assert_eq!(grid.get(UVec3::new(19, 9, 1)).unwrap(), 1919.0);
        assert_eq!(grid.get(UVec3::new(17, 8, 1)).unwrap(), 1817.0);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(grid.get(UVec3::new(20, 0, 0)).is_err());
    }

    #[test]
    fn regions_span_cells() {
        let (cache, _) = ramp_cache(CachePolicy::default());
        let grid = cache.grid_for(0, 0).unwrap();
        let origin = UVec3::new(6, 7, 0);
        let shape = UVec3::new(5, 3, 2);
        let region = grid.read_region(origin, shape).unwrap();
        let mut expected = Vec::new();
        for z in 0..2 {
            for y in 7..10 {
                for x in 6..11 {
                    expected.push((x + 100 * y + 1000 * z) as f32);
                }
            }
        }
        assert_eq!(region, expected);
        assert!(grid.read_region(origin, UVec3::new(15, 1, 1)).is_err());
        assert!(grid.read_region(origin, UVec3::ZERO).unwrap().is_empty());
    }

    #[test]
    fn evicted_cells_reload_identically() {
        let (cache, loader) = ramp_cache(CachePolicy::default());
        let grid = cache.grid_for(0, 0).unwrap();
        let before = grid.cell(UVec3::new(1, 1, 0)).unwrap();
        cache.invalidate_cells();
        assert_eq!(cache.resident_cells(), 0);
        let after = grid.cell(UVec3::new(1, 1, 0)).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(before.as_bytes(), after.as_bytes());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().cells_decoded, 2);
    }

    #[test]
    fn bounded_caches_keep_working_past_their_budget() {
        let policy = CachePolicy {
            cell_shape: Some(UVec3::new(2, 2, 1)),
            max_cells: 3,
            max_bytes: None,
        };
        let (cache, _) = ramp_cache(policy);
        let grid = cache.grid_for(0, 0).unwrap();
        grid.load_all().unwrap();
        assert!(cache.resident_cells() <= 3);
        assert_eq!(grid.get(UVec3::new(0, 0, 0)).unwrap(), 0.0);
        assert_eq!(grid.get(UVec3::new(13, 4, 1)).unwrap(), 1413.0);
    }

    #[test]
    fn load_failures_propagate() {
        let cache = TiledCache::new(
            vec![UVec3::new(4, 4, 1)],
            &CachePolicy::default(),
            None,
            Arc::new(FailingLoader),
        );
        let grid = cache.grid_for(0, 0).unwrap();
        let err = grid.get(UVec3::ZERO).unwrap_err();
        assert!(matches!(err.root(), PyramidError::Reader(_)));
        assert!(grid.load_all().is_err());
        assert_eq!(cache.resident_cells(), 0);
    }

    #[test]
    fn unknown_levels_are_rejected() {
        let (cache, _) = ramp_cache(CachePolicy::default());
        assert!(matches!(
            cache.grid_for(0, 2),
            Err(PyramidError::LevelOutOfRange { level: 2, count: 2 })
        ));
    }
}
