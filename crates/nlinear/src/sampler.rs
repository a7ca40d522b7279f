use crate::lattice::Lattice;
use crate::weights::{fill_weights, gray_code, MAX_DIMENSIONS};

/// Per-query state of an n-linear sampler.
///
/// Holds the floored lattice position of the last query, its fractional offsets, the `2^n` corner
/// weights and scratch space for reading samples. A context is meant to be owned by a single
/// sampler (and thus a single thread); it is reused across queries to avoid allocations.
#[derive(Clone, Debug)]
pub struct InterpolationContext {
    base: Vec<i64>,
    fractions: Vec<f64>,
    weights: Vec<f64>,
    corner: Vec<i64>,
    sample: Vec<f64>,
}

impl InterpolationContext {
    /// # Panics
    /// Panics if `num_dimensions` exceeds [`MAX_DIMENSIONS`].
    pub fn new(num_dimensions: usize, num_components: usize) -> Self {
        assert!(
            num_dimensions <= MAX_DIMENSIONS,
            "{num_dimensions} dimensions exceed the supported maximum of {MAX_DIMENSIONS}"
        );
        Self {
            base: vec![0; num_dimensions],
            fractions: vec![0.0; num_dimensions],
            weights: vec![0.0; 1 << num_dimensions],
            corner: vec![0; num_dimensions],
            sample: vec![0.0; num_components],
        }
    }

    pub fn num_dimensions(&self) -> usize {
        self.base.len()
    }

    /// Floors `position` onto the lattice and recomputes the corner weights.
    ///
    /// Coordinates beyond the `i64` range saturate, and the base stays one below `i64::MAX` so
    /// that every corner is addressable. Non-finite coordinates have no fractional part.
    pub fn locate(&mut self, position: &[f64]) {
        assert_eq!(position.len(), self.num_dimensions());
        for ((base, fraction), p) in self.base.iter_mut().zip(&mut self.fractions).zip(position) {
            let floor = p.floor();
            *base = (floor as i64).min(i64::MAX - 1);
            *fraction = if floor.is_finite() { p - floor } else { 0.0 };
        }
        fill_weights(&self.fractions, &mut self.weights);
    }

    /// The floored lattice position of the last located query.
    pub fn base(&self) -> &[i64] {
        &self.base
    }

    /// The corner weights of the last located query, indexed by corner bit pattern.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Blends the lattice samples around the last located position into `out`.
    ///
    /// Corners are visited in Gray-code order, so each step moves the corner position along a
    /// single axis. Corners with a weight of exactly zero are not read.
    fn accumulate<L: Lattice>(&mut self, lattice: &L, out: &mut [f64]) -> Result<(), L::Error> {
        out.iter_mut().for_each(|o| *o = 0.0);
        self.corner.copy_from_slice(&self.base);
        for i in 0..self.weights.len() {
            let code = gray_code(i);
            if i > 0 {
                let d = i.trailing_zeros() as usize;
                self.corner[d] += if code & (1 << d) != 0 { 1 } else { -1 };
            }
            let weight = self.weights[code];
            if weight == 0.0 {
                continue;
            }
            lattice.read(&self.corner, &mut self.sample)?;
            for (o, s) in out.iter_mut().zip(&self.sample) {
                *o += weight * s;
            }
        }
        Ok(())
    }
}

/// A random-access n-linear sampler over a [`Lattice`].
pub struct NLinearSampler<L: Lattice> {
    lattice: L,
    context: InterpolationContext,
}

impl<L: Lattice> NLinearSampler<L> {
    pub fn new(lattice: L) -> Self {
        let context = InterpolationContext::new(lattice.num_dimensions(), lattice.num_components());
        Self { lattice, context }
    }

    pub fn lattice(&self) -> &L {
        &self.lattice
    }

    pub fn context(&self) -> &InterpolationContext {
        &self.context
    }

    /// Interpolates all components of the lattice at `position` into `out`.
    ///
    /// # Panics
    /// Panics if `position` or `out` do not match the lattice's dimensionality or component count.
    pub fn sample(&mut self, position: &[f64], out: &mut [f64]) -> Result<(), L::Error> {
        assert_eq!(out.len(), self.lattice.num_components());
        self.context.locate(position);
        self.context.accumulate(&self.lattice, out)
    }

    /// Interpolates a single-component lattice at `position`.
    pub fn sample_scalar(&mut self, position: &[f64]) -> Result<f64, L::Error> {
        let mut out = [0.0];
        self.sample(position, &mut out)?;
        Ok(out[0])
    }

}

/// One-shot interpolation of `lattice` at `position`. Allocates a fresh context per call; prefer
/// an [`NLinearSampler`] for repeated queries.
pub fn interpolate<L: Lattice>(
    lattice: &L,
    position: &[f64],
    out: &mut [f64],
) -> Result<(), L::Error> {
    NLinearSampler::new(lattice).sample(position, out)
}
