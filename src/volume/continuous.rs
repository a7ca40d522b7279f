use std::sync::Arc;

use glam::{DVec3, UVec3};
use nlinear::{Lattice, NLinearSampler};
use serde::{Deserialize, Serialize};

use crate::error::{PyramidError, PyramidResult};
use crate::volume::grid::CachedGrid;
use crate::volume::sample::Sample;

/// How a grid is extended beyond its bounds when it is sampled continuously.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    /// Positions outside the grid take the value of the nearest border sample.
    #[default]
    Border,

    /// Positions outside the grid are zero.
    Zero,
}

/// A [`CachedGrid`] extended to all integer positions, which makes it a [`Lattice`] that can be
/// sampled at arbitrary real positions.
///
/// Positions are in the grid's pixel space: the sample at pixel `p` is located at position `p`.
#[derive(Debug, Clone)]
pub struct InterpolatedGrid<T: Sample> {
    grid: Arc<CachedGrid<T>>,
    boundary: Boundary,
}

impl<T: Sample> InterpolatedGrid<T> {
    pub fn new(grid: Arc<CachedGrid<T>>, boundary: Boundary) -> Self {
        Self { grid, boundary }
    }

    pub fn grid(&self) -> &Arc<CachedGrid<T>> {
        &self.grid
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    /// Creates a cursor for repeated queries. A cursor owns its interpolation state and is meant
    /// to be used by a single thread.
    pub fn cursor(&self) -> Cursor<'_, T> {
        Cursor {
            sampler: NLinearSampler::new(self),
            components: vec![0.0; T::COMPONENTS],
        }
    }

    /// Interpolates the grid at `position`. Prefer a [`Cursor`] for repeated queries.
    pub fn sample(&self, position: DVec3) -> PyramidResult<T> {
        self.cursor().sample(position)
    }

    /// Interpolates each component of the grid at `position` without converting back to `T`.
    pub fn sample_components(&self, position: DVec3, out: &mut [f64]) -> PyramidResult<()> {
        nlinear::interpolate(self, &position.to_array(), out)
    }
}

impl<T: Sample> Lattice for InterpolatedGrid<T> {
    type Error = PyramidError;

    fn num_dimensions(&self) -> usize {
        3
    }

    fn num_components(&self) -> usize {
        T::COMPONENTS
    }

    fn read(&self, position: &[i64], out: &mut [f64]) -> Result<(), Self::Error> {
        let dimensions = self.grid.dimensions();
        let inside = (0..3).all(|d| position[d] >= 0 && position[d] < dimensions[d] as i64);
        let pixel = if inside {
            UVec3::new(position[0] as u32, position[1] as u32, position[2] as u32)
        } else {
            match self.boundary {
                Boundary::Zero => {
                    out.iter_mut().for_each(|o| *o = 0.0);
                    return Ok(());
                }
                Boundary::Border if dimensions.cmpeq(UVec3::ZERO).any() => {
                    out.iter_mut().for_each(|o| *o = 0.0);
                    return Ok(());
                }
                Boundary::Border => {
                    let clamp = |d: usize| position[d].clamp(0, dimensions[d] as i64 - 1) as u32;
                    UVec3::new(clamp(0), clamp(1), clamp(2))
                }
            }
        };
        self.grid.get(pixel)?.write_components(out);
        Ok(())
    }
}

/// Samples an [`InterpolatedGrid`] at arbitrary positions, reusing its interpolation state.
pub struct Cursor<'a, T: Sample> {
    sampler: NLinearSampler<&'a InterpolatedGrid<T>>,
    components: Vec<f64>,
}

impl<T: Sample> Cursor<'_, T> {
    pub fn sample(&mut self, position: DVec3) -> PyramidResult<T> {
        self.sampler.sample(&position.to_array(), &mut self.components)?;
        Ok(T::from_components(&self.components))
    }

    /// The corner weights of the last query, see [`nlinear::fill_weights`].
    pub fn weights(&self) -> &[f64] {
        self.sampler.context().weights()
    }
}
