use bmf_consts::rv::nalgebra::{DMatrix, DVector};
use bmf_stats::{LinalgError, NormalHyper, NormalWishart};
use rand::Rng;
use rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256Plus;

use super::{NormalPrior, Prior, PriorKind};
use crate::{LatentModel, PriorError};

/// The Normal-Wishart model of [`NormalPrior`], but each latent dimension of
/// a row is drawn from its univariate conditional given the others. Avoids
/// the `K x K` factorization per row at the cost of slower mixing.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalOnePrior {
    inner: NormalPrior,
}

impl NormalOnePrior {
    pub fn new(mode: usize, num_latent: usize) -> Self {
        Self {
            inner: NormalPrior::new(mode, num_latent),
        }
    }

    pub fn with_hyperprior(mode: usize, hyperprior: NormalWishart) -> Self {
        Self {
            inner: NormalPrior::with_hyperprior(mode, hyperprior),
        }
    }
}

impl Prior for NormalOnePrior {
    fn mode(&self) -> usize {
        self.inner.mode()
    }

    fn kind(&self) -> PriorKind {
        PriorKind::NormalOne
    }

    fn hyper(&self) -> &NormalHyper {
        self.inner.hyper()
    }

    fn set_hyper(&mut self, hyper: NormalHyper) -> Result<(), PriorError> {
        self.inner.set_hyper(hyper)
    }

    fn sample_row(
        &self,
        _row: usize,
        mm: DMatrix<f64>,
        rr: DVector<f64>,
        current: &[f64],
        rng: &mut Xoshiro256Plus,
    ) -> Result<Vec<f64>, LinalgError> {
        let (precision, rhs) = self.inner.conditional(mm, rr);
        let mut x = current.to_vec();
        for k in 0..x.len() {
            let pkk = precision[(k, k)];
            if !(pkk.is_finite() && pkk > 0.0) {
                return Err(LinalgError::NotPositiveDefinite {
                    dim: x.len(),
                    jitter: 0.0,
                });
            }
            let others: f64 = x
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != k)
                .map(|(j, xj)| precision[(k, j)] * xj)
                .sum();
            let z: f64 = rng.sample(StandardNormal);
            x[k] = (rhs[k] - others) / pkk + z / pkk.sqrt();
        }

        if x.iter().all(|v| v.is_finite()) {
            Ok(x)
        } else {
            Err(LinalgError::NonFinite("posterior draw"))
        }
    }

    fn update_hyper(
        &mut self,
        model: &LatentModel,
        rng: &mut Xoshiro256Plus,
    ) -> Result<(), PriorError> {
        self.inner.update_hyper(model, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::*;
    use rand::SeedableRng;

    #[test]
    fn conditional_moments_with_diagonal_precision() {
        // with a diagonal precision every dimension is independent
        let prior = NormalOnePrior::new(0, 2);
        let mut rng = Xoshiro256Plus::seed_from_u64(4);
        let mm = DMatrix::from_row_slice(2, 2, &[3.0, 0.0, 0.0, 1.0]);
        let rr = DVector::from_row_slice(&[8.0, -2.0]);

        let n = 20_000;
        let draws: Vec<Vec<f64>> = (0..n)
            .map(|_| {
                prior
                    .sample_row(0, mm.clone(), rr.clone(), &[0.0, 0.0], &mut rng)
                    .unwrap()
            })
            .collect();
        let mean0 = draws.iter().map(|x| x[0]).sum::<f64>() / n as f64;
        let mean1 = draws.iter().map(|x| x[1]).sum::<f64>() / n as f64;
        // precision diag(4, 2), rhs (8, -2)
        assert_relative_eq!(mean0, 2.0, epsilon = 0.02);
        assert_relative_eq!(mean1, -1.0, epsilon = 0.03);
    }

    #[test]
    fn non_finite_input_is_an_error() {
        let prior = NormalOnePrior::new(0, 2);
        let mut rng = Xoshiro256Plus::seed_from_u64(4);
        let mm = DMatrix::from_row_slice(2, 2, &[f64::NAN, 0.0, 0.0, 1.0]);
        let rr = DVector::zeros(2);
        assert!(prior.sample_row(0, mm, rr, &[0.0, 0.0], &mut rng).is_err());
    }
}
