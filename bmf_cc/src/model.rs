//! The latent factor matrices of all modes
use bmf_data::{Centering, Factors, PVec};
use bmf_utils::{Matrix, RunContext, Stream};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::ModelError;

/// How factor matrices are filled before the first sweep
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ModelInit {
    #[default]
    Zero,
    /// Independent standard normal draws
    Random,
}

impl std::fmt::Display for ModelInit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zero => write!(f, "zero"),
            Self::Random => write!(f, "random"),
        }
    }
}

/// Everything about a model that is not a factor matrix
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub num_latent: usize,
    pub dims: Vec<usize>,
    pub centering: Centering,
    /// Number of post burn-in samples drawn so far
    pub nsamples: usize,
}

/// One `dims[m] x num_latent` factor matrix per mode.
///
/// Rows of mode `m` are latent vectors of the entities along that mode.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LatentModel {
    num_latent: usize,
    factors: Vec<Matrix<f64>>,
    centering: Centering,
    nsamples: usize,
}

impl LatentModel {
    /// A model of zeros
    pub fn new(num_latent: usize, dims: &PVec) -> Self {
        Self {
            num_latent,
            factors: dims
                .iter()
                .map(|&n| Matrix::zeros(n, num_latent))
                .collect(),
            centering: Centering::default(),
            nsamples: 0,
        }
    }

    /// Build and fill a model. Random draws of mode `m` come from the
    /// `Init { mode: m }` stream of `ctx`.
    pub fn init(
        num_latent: usize,
        dims: &PVec,
        init: ModelInit,
        ctx: &RunContext,
    ) -> Self {
        let mut model = Self::new(num_latent, dims);
        if init == ModelInit::Random {
            model.factors.iter_mut().enumerate().for_each(|(mode, u)| {
                let mut rng = ctx.rng(Stream::Init { mode });
                let values = (0..u.nelem())
                    .map(|_| rng.sample::<f64, _>(StandardNormal))
                    .collect();
                *u = Matrix::from_raw_parts(values, u.n_rows(), num_latent);
            });
        }
        model
    }

    /// Reassemble a model from saved factor matrices
    pub fn from_parts(
        factors: Vec<Matrix<f64>>,
        meta: ModelMeta,
    ) -> Result<Self, ModelError> {
        if factors.len() != meta.dims.len() {
            return Err(ModelError::ModeCount {
                expected: meta.dims.len(),
                found: factors.len(),
            });
        }

        for (mode, (u, &n)) in factors.iter().zip(meta.dims.iter()).enumerate()
        {
            if !u.is_consistent() {
                return Err(ModelError::Corrupt(mode));
            } else if u.n_cols() != meta.num_latent {
                return Err(ModelError::LatentMismatch {
                    mode,
                    expected: meta.num_latent,
                    found: u.n_cols(),
                });
            } else if u.n_rows() != n {
                return Err(ModelError::RowMismatch {
                    mode,
                    expected: n,
                    found: u.n_rows(),
                });
            }
        }

        Ok(Self {
            num_latent: meta.num_latent,
            factors,
            centering: meta.centering,
            nsamples: meta.nsamples,
        })
    }

    pub fn meta(&self) -> ModelMeta {
        ModelMeta {
            num_latent: self.num_latent,
            dims: self.dims().as_slice().to_vec(),
            centering: self.centering.clone(),
            nsamples: self.nsamples,
        }
    }

    pub fn dims(&self) -> PVec {
        self.factors
            .iter()
            .map(|u| u.n_rows())
            .collect::<Vec<_>>()
            .into()
    }

    #[inline]
    pub fn factor(&self, mode: usize) -> &Matrix<f64> {
        &self.factors[mode]
    }

    pub fn factors(&self) -> &[Matrix<f64>] {
        &self.factors
    }

    /// Move the factor matrix of `mode` out, leaving an empty matrix behind.
    /// Rows of `mode` must not be read until `put_factor` returns it.
    pub(crate) fn take_factor(&mut self, mode: usize) -> Matrix<f64> {
        std::mem::take(&mut self.factors[mode])
    }

    pub(crate) fn put_factor(&mut self, mode: usize, factor: Matrix<f64>) {
        self.factors[mode] = factor;
    }

    pub fn centering(&self) -> &Centering {
        &self.centering
    }

    pub fn set_centering(&mut self, centering: Centering) {
        self.centering = centering;
    }

    #[inline]
    pub fn nsamples(&self) -> usize {
        self.nsamples
    }

    pub fn add_sample(&mut self) {
        self.nsamples += 1;
    }

    /// Prediction at `pos` on the scale of the raw observations
    pub fn predict_value(&self, pos: &[usize]) -> f64 {
        self.predict(pos) + self.centering.offset(pos)
    }

    /// Frobenius norm of each factor matrix
    pub fn norms(&self) -> Vec<f64> {
        self.factors.iter().map(|u| u.norm()).collect()
    }

    pub fn is_finite(&self) -> bool {
        self.factors.iter().all(|u| u.is_finite())
    }
}

impl Factors for LatentModel {
    fn nmodes(&self) -> usize {
        self.factors.len()
    }

    fn num_latent(&self) -> usize {
        self.num_latent
    }

    #[inline]
    fn row(&self, mode: usize, ix: usize) -> &[f64] {
        self.factors[mode].row(ix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::*;

    fn dims() -> PVec {
        PVec::from(vec![3, 4])
    }

    #[test]
    fn zero_init_predicts_zero() {
        let ctx = RunContext::new(1);
        let model = LatentModel::init(2, &dims(), ModelInit::Zero, &ctx);
        assert_eq!(model.nmodes(), 2);
        assert_eq!(model.factor(1).n_rows(), 4);
        assert_relative_eq!(model.predict_value(&[2, 3]), 0.0);
    }

    #[test]
    fn random_init_is_seeded() {
        let ctx = RunContext::new(1);
        let a = LatentModel::init(3, &dims(), ModelInit::Random, &ctx);
        let b = LatentModel::init(3, &dims(), ModelInit::Random, &ctx);
        let c = LatentModel::init(
            3,
            &dims(),
            ModelInit::Random,
            &RunContext::new(2),
        );
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.norms().iter().all(|&n| n > 0.0));
    }

    #[test]
    fn predict_is_dot_of_rows() {
        let factors = vec![
            Matrix::from_vecs(vec![vec![1.0, 2.0], vec![0.5, -1.0]]),
            Matrix::from_vecs(vec![vec![3.0, 1.0]]),
        ];
        let meta = ModelMeta {
            num_latent: 2,
            dims: vec![2, 1],
            centering: Centering::default(),
            nsamples: 0,
        };
        let model = LatentModel::from_parts(factors, meta).unwrap();
        assert_relative_eq!(model.predict_value(&[0, 0]), 5.0);
        assert_relative_eq!(model.predict_value(&[1, 0]), 0.5);
    }

    #[test]
    fn from_parts_checks_shapes() {
        let meta = ModelMeta {
            num_latent: 2,
            dims: vec![2, 1],
            centering: Centering::default(),
            nsamples: 0,
        };
        let res = LatentModel::from_parts(
            vec![Matrix::zeros(2, 2), Matrix::zeros(3, 2)],
            meta.clone(),
        );
        assert_eq!(
            res,
            Err(ModelError::RowMismatch {
                mode: 1,
                expected: 1,
                found: 3
            })
        );

        let res = LatentModel::from_parts(vec![Matrix::zeros(2, 2)], meta);
        assert_eq!(
            res,
            Err(ModelError::ModeCount {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn meta_round_trips_through_from_parts() {
        let ctx = RunContext::new(7);
        let mut model = LatentModel::init(2, &dims(), ModelInit::Random, &ctx);
        model.add_sample();
        let rebuilt =
            LatentModel::from_parts(model.factors().to_vec(), model.meta())
                .unwrap();
        assert_eq!(rebuilt, model);
        assert_eq!(rebuilt.nsamples(), 1);
    }
}
