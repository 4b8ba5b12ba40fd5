use bmf_consts::rv::nalgebra::{DMatrix, DVector};
use bmf_utils::{RunContext, Stream};
use log::info;
use rand::Rng;

use crate::center::CenteringAccumulator;
use crate::{
    CenterMode, Centering, DataConfig, DataError, Factors, MatricesData,
    NoiseModel, PVec, TensorData,
};

/// Observed training data: a single sparse array or a grid of blocks.
#[derive(Clone, Debug)]
pub enum PositionedData {
    Tensor(TensorData),
    Matrices(MatricesData),
}

impl From<TensorData> for PositionedData {
    fn from(data: TensorData) -> Self {
        Self::Tensor(data)
    }
}

impl From<MatricesData> for PositionedData {
    fn from(data: MatricesData) -> Self {
        Self::Matrices(data)
    }
}

impl PositionedData {
    /// Build the data described by `config`
    pub fn from_config(config: &DataConfig) -> Result<Self, DataError> {
        match config {
            DataConfig::Sparse(sparse) => sparse.build().map(Self::Tensor),
            DataConfig::Blocks(blocks) => {
                let nmodes = blocks
                    .first()
                    .map(|b| b.data.dims.len())
                    .ok_or(DataError::Empty)?;
                let mut md = MatricesData::new(nmodes)?;
                for block in blocks {
                    md.add(PVec::from(block.pos.clone()), block.data.build()?)?;
                }
                md.validate()?;
                Ok(Self::Matrices(md))
            }
        }
    }

    /// Center the values and bind the noise models to the data. Run once
    /// before sampling.
    pub fn init(&mut self, center_mode: CenterMode) -> Result<(), DataError> {
        if self.nnz() == 0 {
            return Err(DataError::Empty);
        }
        if center_mode != CenterMode::None && self.has_probit() {
            return Err(DataError::CenteredBinary(format!("{center_mode:?}")));
        }
        match self {
            Self::Tensor(data) => {
                let start = PVec::zeros(data.nmodes());
                let mut acc =
                    CenteringAccumulator::new(center_mode, data.dims().as_slice());
                data.push_centering(&mut acc, &start);
                let centering = acc.finish();
                data.center(&centering, &start);
                data.set_centering(centering);
                data.init_noise();
            }
            Self::Matrices(data) => {
                data.validate()?;
                data.center(center_mode);
                data.init_noise();
            }
        }
        info!(
            "Initialized {} data: dims {}, nnz {}, global mean {:.4}",
            self.kind(),
            self.dims(),
            self.nnz(),
            self.centering().global_mean()
        );
        Ok(())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tensor(_) => "sparse",
            Self::Matrices(_) => "block",
        }
    }

    pub fn nmodes(&self) -> usize {
        match self {
            Self::Tensor(data) => data.nmodes(),
            Self::Matrices(data) => data.nmodes(),
        }
    }

    pub fn dims(&self) -> &PVec {
        match self {
            Self::Tensor(data) => data.dims(),
            Self::Matrices(data) => data.dims(),
        }
    }

    pub fn nnz(&self) -> usize {
        match self {
            Self::Tensor(data) => data.nnz(),
            Self::Matrices(data) => data.nnz(),
        }
    }

    pub fn nna(&self) -> usize {
        match self {
            Self::Tensor(data) => data.nna(),
            Self::Matrices(data) => data.nna(),
        }
    }

    pub fn sum(&self) -> f64 {
        match self {
            Self::Tensor(data) => data.sum(),
            Self::Matrices(data) => data.sum(),
        }
    }

    /// Variance of the observed (centered) values
    pub fn var_total(&self) -> f64 {
        match self {
            Self::Tensor(data) => {
                let n = data.nnz() as f64;
                let mean = data.sum() / n;
                data.sum_sq() / n - mean * mean
            }
            Self::Matrices(data) => data.var_total(),
        }
    }

    pub fn centering(&self) -> &Centering {
        match self {
            Self::Tensor(data) => data.centering(),
            Self::Matrices(data) => data.centering(),
        }
    }

    /// Residual sum of squares of `model` over all observed entries
    pub fn sumsq<F: Factors + ?Sized>(&self, model: &F) -> f64 {
        match self {
            Self::Tensor(data) => data.sumsq(model),
            Self::Matrices(data) => data.sumsq(model),
        }
    }

    pub fn train_rmse<F: Factors + ?Sized>(&self, model: &F) -> f64 {
        (self.sumsq(model) / self.nnz() as f64).sqrt()
    }

    /// `true` if any block holds binary observations
    pub fn has_probit(&self) -> bool {
        match self {
            Self::Tensor(data) => data.noise().is_probit(),
            Self::Matrices(data) => data.has_probit(),
        }
    }

    /// Accumulate the noise-weighted precision `mm` and right hand side `rr`
    /// of latent `row` of `mode` from every observation in that row.
    /// `current` holds the row's value before the draw.
    #[allow(clippy::too_many_arguments)]
    pub fn get_pnm<F, R>(
        &self,
        model: &F,
        mode: usize,
        row: usize,
        current: &[f64],
        rr: &mut DVector<f64>,
        mm: &mut DMatrix<f64>,
        rng: &mut R,
    ) where
        F: Factors + ?Sized,
        R: Rng,
    {
        match self {
            Self::Tensor(data) => {
                data.get_pnm(model, mode, row, current, rr, mm, rng)
            }
            Self::Matrices(data) => {
                data.get_pnm(model, mode, row, current, rr, mm, rng)
            }
        }
    }

    /// Per-mode preparation before the rows of `mode` are sampled
    pub fn update_pnm<F: Factors + ?Sized>(&mut self, model: &F, mode: usize) {
        match self {
            Self::Tensor(data) => data.update_pnm(model, mode),
            Self::Matrices(data) => data.update_pnm(model, mode),
        }
    }

    /// Refresh the noise models after a full Gibbs sweep
    pub fn update<F: Factors + ?Sized>(&mut self, model: &F, ctx: &RunContext) {
        match self {
            Self::Tensor(data) => {
                let mut rng = ctx.rng(Stream::Noise { block: 0 });
                data.update_noise(model, &mut rng);
            }
            Self::Matrices(data) => data.update_noise(model, ctx),
        }
    }

    /// Current noise precision of each block
    pub fn noise_precisions(&self) -> Vec<f64> {
        match self {
            Self::Tensor(data) => vec![data.noise().precision()],
            Self::Matrices(data) => data.noise_precisions(),
        }
    }

    /// Full noise state of each block, as saved in a checkpoint
    pub fn noise_models(&self) -> Vec<NoiseModel> {
        match self {
            Self::Tensor(data) => vec![data.noise().clone()],
            Self::Matrices(data) => data.noise_models(),
        }
    }

    pub fn set_noise_models(
        &mut self,
        mut noise: Vec<NoiseModel>,
    ) -> Result<(), DataError> {
        match self {
            Self::Tensor(data) => {
                if noise.len() != 1 {
                    return Err(DataError::NoiseCount {
                        expected: 1,
                        found: noise.len(),
                    });
                }
                let restored = noise.remove(0);
                if !data.noise().same_kind(&restored) {
                    return Err(DataError::NoiseMismatch(0));
                }
                data.set_noise(restored);
                Ok(())
            }
            Self::Matrices(data) => data.set_noise_models(noise),
        }
    }
}
