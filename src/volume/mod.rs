pub mod cache;
pub mod cell;
pub mod continuous;
pub mod grid;
pub mod levels;
pub mod memory_reader;
pub mod meta;
pub mod reader;
pub mod sample;
pub mod source;
pub mod tiled;

pub use cache::{CachePolicy, CacheStats, CellCache};
pub use cell::{Cell, CellBounds, CellKey, CellLayout, DEFAULT_CELL_SHAPE};
pub use continuous::{Boundary, Cursor, InterpolatedGrid};
pub use grid::{CachedGrid, CellLoader};
pub use levels::LevelRegistry;
pub use memory_reader::MemoryReader;
pub use meta::{CacheKey, PyramidLevel, VoxelSize};
pub use reader::{FormatReader, SharedReader};
pub use sample::{Argb, ByteLayout, PixelType, Sample, SampleType};
pub use source::{AnySource, CachedSource, PyramidGeometry, PyramidSource, SourceOptions};
pub use tiled::TiledCache;
