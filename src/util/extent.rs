use glam::UVec3;

pub fn box_volume(extent: &UVec3) -> u64 {
    extent.to_array().iter().map(|e| *e as u64).product()
}

pub fn index_to_subscript(index: u64, extent: &UVec3) -> UVec3 {
    let width = extent.x as u64;
    let height = extent.y as u64;
    let x = index % width;
    let y = (index - x) / width % height;
    let z = ((index - x) / width - y) / height;
    UVec3::new(x as u32, y as u32, z as u32)
}

pub fn subscript_to_index(subscript: &UVec3, extent: &UVec3) -> u64 {
    subscript.x as u64
        + extent.x as u64 * (subscript.y as u64 + extent.y as u64 * subscript.z as u64)
}

/// Returns true if a box at `origin` with `shape` lies within `[0, bounds)` on every axis.
pub fn box_within(origin: &UVec3, shape: &UVec3, bounds: &UVec3) -> bool {
    (0..3).all(|d| origin[d] as u64 + shape[d] as u64 <= bounds[d] as u64)
}

/// Divides `extent` by `divisor`, rounding up.
pub fn div_ceil(extent: &UVec3, divisor: &UVec3) -> UVec3 {
    UVec3::new(
        (extent.x + divisor.x - 1) / divisor.x,
        (extent.y + divisor.y - 1) / divisor.y,
        (extent.z + divisor.z - 1) / divisor.z,
    )
}

pub trait IndexToSubscript {
    type Size;

    fn index_to_subscript(&self, index: u64) -> Self::Size;
}

pub trait SubscriptToIndex<Size = Self> {
    fn to_index(&self, size: &Size) -> u64;
}

impl IndexToSubscript for UVec3 {
    type Size = Self;

    fn index_to_subscript(&self, index: u64) -> Self::Size {
        index_to_subscript(index, self)
    }
}

impl SubscriptToIndex for UVec3 {
    fn to_index(&self, size: &Self) -> u64 {
        subscript_to_index(self, size)
    }
}
