use bmf_consts::rv::nalgebra::{DMatrix, DVector};
use bmf_consts::{DEFAULT_LAMBDA_BETA, LAMBDA_BETA_MU0, LAMBDA_BETA_NU0};
use bmf_stats::mvn::{
    chol_solve_matrix, cholesky_lower, draw_centered, draw_from_precision,
};
use bmf_stats::{LinalgError, NormalHyper};
use bmf_utils::Matrix;
use rand::Rng;
use rand_distr::{Distribution, Gamma};
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};

use super::{NormalPrior, Prior, PriorKind};
use crate::{LatentModel, PriorError};

fn default_lambda_beta() -> f64 {
    DEFAULT_LAMBDA_BETA
}

fn default_true() -> bool {
    true
}

/// Dense side features for the rows of one mode
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SideInfoConfig {
    pub mode: usize,
    /// One feature vector per row of `mode`
    pub features: Vec<Vec<f64>>,
    /// Initial precision of the link matrix
    #[serde(default = "default_lambda_beta")]
    pub lambda_beta: f64,
    /// Re-draw `lambda_beta` every iteration
    #[serde(default = "default_true")]
    pub sample_lambda_beta: bool,
}

impl SideInfoConfig {
    pub fn new(mode: usize, features: Vec<Vec<f64>>) -> Self {
        Self {
            mode,
            features,
            lambda_beta: DEFAULT_LAMBDA_BETA,
            sample_lambda_beta: true,
        }
    }

    pub fn lambda_beta(mut self, lambda_beta: f64) -> Self {
        self.lambda_beta = lambda_beta;
        self
    }

    /// Keep `lambda_beta` at its initial value
    pub fn fixed_lambda_beta(mut self) -> Self {
        self.sample_lambda_beta = false;
        self
    }

    pub fn n_rows(&self) -> usize {
        self.features.len()
    }

    pub fn num_features(&self) -> usize {
        self.features.first().map_or(0, Vec::len)
    }

    pub fn validate(&self) -> Result<(), PriorError> {
        let invalid = |reason: String| PriorError::SideInfo {
            mode: self.mode,
            reason,
        };
        let p = self.num_features();
        if p == 0 {
            return Err(invalid(String::from("no features")));
        }
        if let Some(row) = self.features.iter().position(|f| f.len() != p) {
            return Err(invalid(format!(
                "row {row} has {} features, expected {p}",
                self.features[row].len()
            )));
        }
        if !self.features.iter().flatten().all(|x| x.is_finite()) {
            return Err(invalid(String::from("non-finite feature")));
        }
        if !(self.lambda_beta.is_finite() && self.lambda_beta > 0.0) {
            return Err(invalid(format!(
                "lambda_beta must be positive, found {}",
                self.lambda_beta
            )));
        }
        Ok(())
    }
}

/// Saved state of the side-feature regression
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MacauLink {
    pub num_features: usize,
    pub num_latent: usize,
    /// Row-major `P x K` link matrix
    pub beta: Vec<f64>,
    pub lambda_beta: f64,
}

/// Rows are `N(μ + βᵀfₙ, Λ⁻¹)` where `fₙ` are the side features of row `n`.
///
/// The link matrix `β` has a matrix normal prior with row precision
/// `λβ Λ`. After the Normal-Wishart draw on the residual rows `U - Fβ`,
/// `β` is drawn from its conditional and, optionally, `λβ` from its Gamma
/// conditional.
#[derive(Clone, Debug, PartialEq)]
pub struct MacauPrior {
    inner: NormalPrior,
    /// `N x P`
    features: DMatrix<f64>,
    ftf: DMatrix<f64>,
    /// `P x K`
    beta: DMatrix<f64>,
    lambda_beta: f64,
    sample_lambda_beta: bool,
    /// `Fβ`, the offset of each row's mean
    uhat: DMatrix<f64>,
}

impl MacauPrior {
    pub fn new(
        mode: usize,
        num_latent: usize,
        side: &SideInfoConfig,
    ) -> Result<Self, PriorError> {
        side.validate()?;
        let (n, p) = (side.n_rows(), side.num_features());
        let features = DMatrix::from_fn(n, p, |i, j| side.features[i][j]);
        Ok(Self {
            inner: NormalPrior::new(mode, num_latent),
            ftf: features.transpose() * &features,
            features,
            beta: DMatrix::zeros(p, num_latent),
            lambda_beta: side.lambda_beta,
            sample_lambda_beta: side.sample_lambda_beta,
            uhat: DMatrix::zeros(n, num_latent),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn beta(&self) -> &DMatrix<f64> {
        &self.beta
    }

    pub fn lambda_beta(&self) -> f64 {
        self.lambda_beta
    }

    /// `U - Fβ` as a factor matrix
    fn residual(&self, factor: &Matrix<f64>) -> Matrix<f64> {
        let values = factor
            .rows()
            .enumerate()
            .flat_map(|(i, row)| {
                row.iter()
                    .enumerate()
                    .map(move |(j, &u)| u - self.uhat[(i, j)])
            })
            .collect();
        Matrix::from_raw_parts(values, factor.n_rows(), factor.n_cols())
    }

    fn draw_beta<R: Rng>(
        &self,
        u: &DMatrix<f64>,
        rng: &mut R,
    ) -> Result<DMatrix<f64>, LinalgError> {
        let (n, k) = (u.nrows(), u.ncols());
        let p = self.num_features();
        let hyper = self.inner.hyper();
        let lower = cholesky_lower(&hyper.lambda())?;
        let mu = hyper.mu();

        // Fᵀ(U - 1μᵀ + E₁) + √λβ E₂, rows of E ~ N(0, Λ⁻¹)
        let target = u - DMatrix::from_fn(n, k, |_, j| mu[j])
            + draw_rows(&lower, n, rng)?;
        let rhs = self.features.transpose() * target
            + draw_rows(&lower, p, rng)? * self.lambda_beta.sqrt();

        let mut a = self.ftf.clone();
        (0..p).for_each(|i| a[(i, i)] += self.lambda_beta);
        let beta = chol_solve_matrix(&cholesky_lower(&a)?, &rhs)?;
        if beta.iter().all(|x| x.is_finite()) {
            Ok(beta)
        } else {
            Err(LinalgError::NonFinite("link matrix"))
        }
    }

    fn draw_lambda_beta<R: Rng>(&self, rng: &mut R) -> Result<f64, LinalgError> {
        let (p, k) = self.beta.shape();
        let tr = (&self.beta * self.inner.lambda() * self.beta.transpose())
            .trace();
        let shape = (LAMBDA_BETA_NU0 + (p * k) as f64) / 2.0;
        let rate = (LAMBDA_BETA_NU0 / LAMBDA_BETA_MU0 + tr) / 2.0;
        Gamma::new(shape, rate.recip())
            .map(|gamma| gamma.sample(rng))
            .map_err(|_| LinalgError::NonFinite("link precision"))
    }

    fn cache(&mut self) {
        self.uhat = &self.features * &self.beta;
    }
}

/// `rows x K` matrix with independent `N(0, (L Lᵀ)⁻¹)` rows
fn draw_rows<R: Rng>(
    lower: &DMatrix<f64>,
    rows: usize,
    rng: &mut R,
) -> Result<DMatrix<f64>, LinalgError> {
    let mut out = DMatrix::zeros(rows, lower.nrows());
    for i in 0..rows {
        let x = draw_centered(lower, rng)?;
        out.set_row(i, &x.transpose());
    }
    Ok(out)
}

impl Prior for MacauPrior {
    fn mode(&self) -> usize {
        self.inner.mode()
    }

    fn kind(&self) -> PriorKind {
        PriorKind::Macau
    }

    fn hyper(&self) -> &NormalHyper {
        self.inner.hyper()
    }

    fn set_hyper(&mut self, hyper: NormalHyper) -> Result<(), PriorError> {
        self.inner.set_hyper(hyper)
    }

    fn sample_row(
        &self,
        row: usize,
        mm: DMatrix<f64>,
        rr: DVector<f64>,
        _current: &[f64],
        rng: &mut Xoshiro256Plus,
    ) -> Result<Vec<f64>, LinalgError> {
        let (precision, mut rhs) = self.inner.conditional(mm, rr);
        rhs += self.inner.lambda() * self.uhat.row(row).transpose();
        draw_from_precision(&precision, &rhs, rng)
            .map(|x| x.iter().copied().collect())
    }

    fn update_hyper(
        &mut self,
        model: &LatentModel,
        rng: &mut Xoshiro256Plus,
    ) -> Result<(), PriorError> {
        let mode = self.mode();
        let err = |source| PriorError::Hyper { mode, source };
        let factor = model.factor(mode);
        if factor.n_rows() != self.n_rows() {
            return Err(PriorError::SideInfoRows {
                mode,
                expected: factor.n_rows(),
                found: self.n_rows(),
            });
        }

        let bb = self.beta.transpose() * &self.beta * self.lambda_beta;
        let hyper = self
            .inner
            .hyperprior()
            .augmented(&bb, self.num_features() as f64)
            .posterior_draw(&self.residual(factor), rng)
            .map_err(err)?;
        self.inner.set_hyper(hyper)?;

        let u = DMatrix::from_row_slice(
            factor.n_rows(),
            factor.n_cols(),
            factor.raw_values(),
        );
        self.beta = self.draw_beta(&u, rng).map_err(err)?;
        if self.sample_lambda_beta {
            self.lambda_beta = self.draw_lambda_beta(rng).map_err(err)?;
        }
        self.cache();
        Ok(())
    }

    fn link(&self) -> Option<MacauLink> {
        let (num_features, num_latent) = self.beta.shape();
        Some(MacauLink {
            num_features,
            num_latent,
            beta: self.beta.transpose().iter().copied().collect(),
            lambda_beta: self.lambda_beta,
        })
    }

    fn set_link(&mut self, link: MacauLink) -> Result<(), PriorError> {
        let expected = self.beta.shape();
        let found = (link.num_features, link.num_latent);
        if found != expected || link.beta.len() != expected.0 * expected.1 {
            return Err(PriorError::LinkShape {
                mode: self.mode(),
                expected,
                found,
            });
        }
        self.beta =
            DMatrix::from_row_slice(expected.0, expected.1, &link.beta);
        self.lambda_beta = link.lambda_beta;
        self.cache();
        Ok(())
    }
}
