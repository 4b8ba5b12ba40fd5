use crate::PVec;
use bmf_utils::hadamard_into;

/// Read access to the latent factor rows of every mode.
pub trait Factors {
    fn nmodes(&self) -> usize;

    fn num_latent(&self) -> usize;

    /// Latent row `ix` of `mode`
    fn row(&self, mode: usize, ix: usize) -> &[f64];

    /// Element-wise product of the rows at `pos`, skipping mode `skip`.
    fn hadamard(&self, pos: &[usize], skip: Option<usize>) -> Vec<f64> {
        let mut acc = vec![1.0; self.num_latent()];
        pos.iter()
            .enumerate()
            .filter(|(mode, _)| Some(*mode) != skip)
            .for_each(|(mode, &ix)| hadamard_into(&mut acc, self.row(mode, ix)));
        acc
    }

    /// Model value at `pos` (without any centering offset)
    fn predict(&self, pos: &[usize]) -> f64 {
        self.hadamard(pos, None).iter().sum()
    }
}

/// A view of `F` shifted by `start`, so local block coordinates address
/// global factor rows.
pub struct Offset<'a, F: Factors + ?Sized> {
    inner: &'a F,
    start: &'a PVec,
}

impl<'a, F: Factors + ?Sized> Offset<'a, F> {
    pub fn new(inner: &'a F, start: &'a PVec) -> Self {
        Self { inner, start }
    }
}

impl<'a, F: Factors + ?Sized> Factors for Offset<'a, F> {
    fn nmodes(&self) -> usize {
        self.inner.nmodes()
    }

    fn num_latent(&self) -> usize {
        self.inner.num_latent()
    }

    #[inline]
    fn row(&self, mode: usize, ix: usize) -> &[f64] {
        self.inner.row(mode, ix + self.start[mode])
    }
}

#[cfg(test)]
pub(crate) mod test_factors {
    use super::*;

    /// Factors stored as one `Vec<Vec<f64>>` per mode
    pub struct VecFactors(pub Vec<Vec<Vec<f64>>>);

    impl Factors for VecFactors {
        fn nmodes(&self) -> usize {
            self.0.len()
        }

        fn num_latent(&self) -> usize {
            self.0[0][0].len()
        }

        fn row(&self, mode: usize, ix: usize) -> &[f64] {
            &self.0[mode][ix]
        }
    }
}
