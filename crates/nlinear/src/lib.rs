//! Multilinear ("n-linear") interpolation over integer lattices of arbitrary dimensionality.
//!
//! A [`Lattice`] exposes samples at integer positions. An [`NLinearSampler`] blends the `2^n`
//! lattice points surrounding a real-valued query position, where `n` is the lattice's
//! dimensionality. Samples may have several components (e.g. the three coordinates of a vector
//! field), each of which is interpolated independently with the same weights.

pub mod lattice;
pub mod sampler;
pub mod weights;

pub use lattice::{DenseLattice, Lattice};
pub use sampler::{interpolate, InterpolationContext, NLinearSampler};
pub use weights::{fill_weights, gray_code, MAX_DIMENSIONS};
