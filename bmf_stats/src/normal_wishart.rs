use crate::mvn::{cholesky_lower, draw_with_mean, spd_inverse};
use crate::rv::nalgebra::{DMatrix, DVector};
use crate::LinalgError;
use bmf_consts::NORMAL_WISHART_BETA;
use bmf_utils::Matrix;
use rand::Rng;
use rand_distr::{ChiSquared, Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Mean and precision of a Gaussian over latent rows
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalHyper {
    pub mu: Vec<f64>,
    /// Row-major `K x K` precision
    pub lambda: Vec<f64>,
}

impl NormalHyper {
    /// Zero mean and identity precision
    pub fn standard(num_latent: usize) -> Self {
        Self {
            mu: vec![0.0; num_latent],
            lambda: (0..num_latent * num_latent)
                .map(|ix| if ix % (num_latent + 1) == 0 { 1.0 } else { 0.0 })
                .collect(),
        }
    }

    #[inline]
    pub fn num_latent(&self) -> usize {
        self.mu.len()
    }

    pub fn mu(&self) -> DVector<f64> {
        DVector::from_row_slice(&self.mu)
    }

    pub fn lambda(&self) -> DMatrix<f64> {
        let k = self.num_latent();
        DMatrix::from_row_slice(k, k, &self.lambda)
    }

    /// `Λμ`, the prior contribution to a row's right hand side
    pub fn lambda_mu(&self) -> DVector<f64> {
        self.lambda() * self.mu()
    }

    fn from_parts(mu: &DVector<f64>, lambda: &DMatrix<f64>) -> Self {
        Self {
            mu: mu.iter().copied().collect(),
            // nalgebra is column-major
            lambda: lambda.transpose().iter().copied().collect(),
        }
    }
}

/// Normal-Wishart hyperprior over `(μ, Λ)`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalWishart {
    pub mu0: Vec<f64>,
    pub beta0: f64,
    pub df0: f64,
    /// Row-major inverse scale matrix
    pub w0_inv: Vec<f64>,
}

impl NormalWishart {
    /// The usual vague hyperprior: zero mean, identity scale, `K` degrees of
    /// freedom.
    pub fn vague(num_latent: usize) -> Self {
        Self {
            mu0: vec![0.0; num_latent],
            beta0: NORMAL_WISHART_BETA,
            df0: num_latent as f64,
            w0_inv: NormalHyper::standard(num_latent).lambda,
        }
    }

    #[inline]
    pub fn num_latent(&self) -> usize {
        self.mu0.len()
    }

    /// The same hyperprior with `extra` added to the inverse scale and
    /// `extra_df` to the degrees of freedom. Priors that regress the row
    /// mean on side features fold the link matrix in this way.
    pub fn augmented(&self, extra: &DMatrix<f64>, extra_df: f64) -> Self {
        let k = self.num_latent();
        let w0_inv = DMatrix::from_row_slice(k, k, &self.w0_inv) + extra;
        Self {
            mu0: self.mu0.clone(),
            beta0: self.beta0,
            df0: self.df0 + extra_df,
            w0_inv: w0_inv.transpose().iter().copied().collect(),
        }
    }

    /// Draw `(μ, Λ)` from the posterior given the rows of `factors`
    pub fn posterior_draw<R: Rng>(
        &self,
        factors: &Matrix<f64>,
        rng: &mut R,
    ) -> Result<NormalHyper, LinalgError> {
        let k = self.num_latent();
        let n = factors.n_rows();
        let nf = n as f64;
        let mu0 = DVector::from_row_slice(&self.mu0);

        let ubar = if n == 0 {
            DVector::zeros(k)
        } else {
            factors
                .rows()
                .fold(DVector::zeros(k), |acc, row| {
                    acc + DVector::from_row_slice(row)
                })
                / nf
        };

        let scatter = factors.rows().fold(DMatrix::zeros(k, k), |acc, row| {
            let d = DVector::from_row_slice(row) - &ubar;
            acc + &d * d.transpose()
        });

        let beta_n = self.beta0 + nf;
        let df_n = self.df0 + nf;
        let mu_n = (&mu0 * self.beta0 + &ubar * nf) / beta_n;

        let dm = &ubar - &mu0;
        let wn_inv = DMatrix::from_row_slice(k, k, &self.w0_inv)
            + scatter
            + (&dm * dm.transpose()) * (self.beta0 * nf / beta_n);
        let wn = symmetrize(spd_inverse(&wn_inv)?);

        let lambda = symmetrize(draw_wishart(&wn, df_n, rng)?);
        let mu = draw_with_mean(&(&lambda * beta_n), &mu_n, rng)?;

        Ok(NormalHyper::from_parts(&mu, &lambda))
    }
}

fn symmetrize(mat: DMatrix<f64>) -> DMatrix<f64> {
    (&mat + mat.transpose()) * 0.5
}

/// Draw from `Wishart(scale, df)` with the Bartlett decomposition
pub fn draw_wishart<R: Rng>(
    scale: &DMatrix<f64>,
    df: f64,
    rng: &mut R,
) -> Result<DMatrix<f64>, LinalgError> {
    let k = scale.nrows();
    if !(df > (k as f64) - 1.0) {
        return Err(LinalgError::InvalidDegreesOfFreedom(df));
    }

    let lower = cholesky_lower(scale)?;
    let mut a = DMatrix::<f64>::zeros(k, k);
    for i in 0..k {
        let chi2 = ChiSquared::new(df - i as f64)
            .map_err(|_| LinalgError::InvalidDegreesOfFreedom(df))?;
        a[(i, i)] = chi2.sample(rng).sqrt();
        for j in 0..i {
            a[(i, j)] = rng.sample(StandardNormal);
        }
    }

    let la = lower * a;
    Ok(&la * la.transpose())
}
