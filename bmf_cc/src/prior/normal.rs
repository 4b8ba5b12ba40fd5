use bmf_consts::rv::nalgebra::{DMatrix, DVector};
use bmf_stats::mvn::draw_from_precision;
use bmf_stats::{LinalgError, NormalHyper, NormalWishart};
use rand_xoshiro::Xoshiro256Plus;

use super::{check_hyper, Prior, PriorKind};
use crate::{LatentModel, PriorError};

/// Rows are `N(μ, Λ⁻¹)` with `(μ, Λ)` under a Normal-Wishart hyperprior.
///
/// Each row is drawn jointly from its `K`-variate Gaussian conditional.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalPrior {
    mode: usize,
    hyperprior: NormalWishart,
    hyper: NormalHyper,
    // cached from `hyper`
    lambda: DMatrix<f64>,
    lambda_mu: DVector<f64>,
}

impl NormalPrior {
    pub fn new(mode: usize, num_latent: usize) -> Self {
        Self::with_hyperprior(mode, NormalWishart::vague(num_latent))
    }

    pub fn with_hyperprior(mode: usize, hyperprior: NormalWishart) -> Self {
        let hyper = NormalHyper::standard(hyperprior.num_latent());
        Self {
            mode,
            lambda: hyper.lambda(),
            lambda_mu: hyper.lambda_mu(),
            hyperprior,
            hyper,
        }
    }

    pub fn hyperprior(&self) -> &NormalWishart {
        &self.hyperprior
    }

    /// Current row precision `Λ`
    pub(super) fn lambda(&self) -> &DMatrix<f64> {
        &self.lambda
    }

    /// Precision and right hand side of a row's full conditional
    pub(super) fn conditional(
        &self,
        mm: DMatrix<f64>,
        rr: DVector<f64>,
    ) -> (DMatrix<f64>, DVector<f64>) {
        (mm + &self.lambda, rr + &self.lambda_mu)
    }

    fn cache(&mut self) {
        self.lambda = self.hyper.lambda();
        self.lambda_mu = self.hyper.lambda_mu();
    }
}

impl Prior for NormalPrior {
    fn mode(&self) -> usize {
        self.mode
    }

    fn kind(&self) -> PriorKind {
        PriorKind::Normal
    }

    fn hyper(&self) -> &NormalHyper {
        &self.hyper
    }

    fn set_hyper(&mut self, hyper: NormalHyper) -> Result<(), PriorError> {
        check_hyper(self.mode, self.hyperprior.num_latent(), &hyper)?;
        self.hyper = hyper;
        self.cache();
        Ok(())
    }

    fn sample_row(
        &self,
        _row: usize,
        mm: DMatrix<f64>,
        rr: DVector<f64>,
        _current: &[f64],
        rng: &mut Xoshiro256Plus,
    ) -> Result<Vec<f64>, LinalgError> {
        let (precision, rhs) = self.conditional(mm, rr);
        draw_from_precision(&precision, &rhs, rng)
            .map(|x| x.iter().copied().collect())
    }

    fn update_hyper(
        &mut self,
        model: &LatentModel,
        rng: &mut Xoshiro256Plus,
    ) -> Result<(), PriorError> {
        self.hyper = self
            .hyperprior
            .posterior_draw(model.factor(self.mode), rng)
            .map_err(|source| PriorError::Hyper {
                mode: self.mode,
                source,
            })?;
        self.cache();
        Ok(())
    }
}
