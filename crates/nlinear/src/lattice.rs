use std::convert::Infallible;

/// A discrete field of samples at integer positions.
///
/// A lattice must be readable at every integer position a sampler may touch, i.e., at the floored
/// query position and its successor along each axis. Lattices backed by finite data typically
/// achieve this with an extension policy at their borders.
pub trait Lattice {
    type Error;

    /// The number of axes of this lattice.
    fn num_dimensions(&self) -> usize;

    /// The number of components of a single sample.
    fn num_components(&self) -> usize;

    /// Writes the components of the sample at `position` into `out`.
    /// `position.len()` equals `num_dimensions()` and `out.len()` equals `num_components()`.
    fn read(&self, position: &[i64], out: &mut [f64]) -> Result<(), Self::Error>;
}

impl<L: Lattice + ?Sized> Lattice for &L {
    type Error = L::Error;

    fn num_dimensions(&self) -> usize {
        (**self).num_dimensions()
    }

    fn num_components(&self) -> usize {
        (**self).num_components()
    }

    fn read(&self, position: &[i64], out: &mut [f64]) -> Result<(), Self::Error> {
        (**self).read(position, out)
    }
}

/// An owned, dense lattice in row-major order (axis 0 varies fastest) with interleaved components.
/// Positions outside the lattice are clamped to the nearest border sample.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseLattice {
    shape: Vec<usize>,
    components: usize,
    data: Vec<f64>,
}

impl DenseLattice {
    /// # Panics
    /// Panics if `data.len()` does not match the product of `shape` times `components`, or if any
    /// axis is empty.
    pub fn new(shape: Vec<usize>, components: usize, data: Vec<f64>) -> Self {
        assert!(shape.iter().all(|s| *s > 0), "lattice axes must not be empty");
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>() * components,
            "lattice data does not match its shape"
        );
        Self {
            shape,
            components,
            data,
        }
    }

    /// Creates a scalar lattice by evaluating `f` at every lattice position.
    pub fn from_fn(shape: Vec<usize>, f: impl Fn(&[i64]) -> f64) -> Self {
        let len = shape.iter().product::<usize>();
        let mut position = vec![0i64; shape.len()];
        let mut data = Vec::with_capacity(len);
        for index in 0..len {
            let mut rest = index;
            for (p, s) in position.iter_mut().zip(&shape) {
                *p = (rest % s) as i64;
                rest /= s;
            }
            data.push(f(&position));
        }
        Self::new(shape, 1, data)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn offset(&self, position: &[i64]) -> usize {
        let mut offset = 0;
        let mut stride = 1;
        for (p, s) in position.iter().zip(&self.shape) {
            let clamped = (*p).clamp(0, *s as i64 - 1) as usize;
            offset += clamped * stride;
            stride *= s;
        }
        offset * self.components
    }
}

impl Lattice for DenseLattice {
    type Error = Infallible;

    fn num_dimensions(&self) -> usize {
        self.shape.len()
    }

    fn num_components(&self) -> usize {
        self.components
    }

    fn read(&self, position: &[i64], out: &mut [f64]) -> Result<(), Self::Error> {
        let offset = self.offset(position);
        out.copy_from_slice(&self.data[offset..offset + self.components]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_fn_is_row_major() {
        let lattice = DenseLattice::from_fn(vec![3, 2], |p| (p[0] + 10 * p[1]) as f64);
        let mut out = [0.0];
        lattice.read(&[2, 1], &mut out).unwrap();
        assert_eq!(out[0], 12.0);
        lattice.read(&[1, 0], &mut out).unwrap();
        assert_eq!(out[0], 1.0);
    }

    #[test]
    fn reads_outside_clamp_to_border() {
        let lattice = DenseLattice::from_fn(vec![4], |p| p[0] as f64);
        let mut out = [0.0];
        lattice.read(&[-3], &mut out).unwrap();
        assert_eq!(out[0], 0.0);
        lattice.read(&[17], &mut out).unwrap();
        assert_eq!(out[0], 3.0);
    }

    #[test]
    fn components_are_interleaved() {
        let lattice = DenseLattice::new(vec![2], 2, vec![1.0, 2.0, 3.0, 4.0]);
        let mut out = [0.0; 2];
        lattice.read(&[1], &mut out).unwrap();
        assert_eq!(out, [3.0, 4.0]);
    }

    #[test]
    #[should_panic]
    fn mismatched_data_panics() {
        DenseLattice::new(vec![2, 2], 1, vec![0.0; 3]);
    }
}
