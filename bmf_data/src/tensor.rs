use crate::center::CenteringAccumulator;
use crate::{Centering, DataError, Factors, NoiseConfig, NoiseModel, PVec, SparseMode};
use bmf_consts::rv::nalgebra::{DMatrix, DVector};
use bmf_stats::truncnorm::draw_probit_latent;
use bmf_utils::Matrix;
use rand::Rng;

/// Sparse observations of an N-mode array: the leaf of every data layout.
///
/// One [`SparseMode`] is kept per mode so the observations of any row of any
/// mode can be visited directly.
#[derive(Clone, Debug)]
pub struct TensorData {
    dims: PVec,
    modes: Vec<SparseMode>,
    noise: NoiseModel,
    /// Gram matrix of the other mode's rows, cached by `update_pnm` for a
    /// fully observed matrix
    gram: Option<(usize, DMatrix<f64>)>,
    centering: Centering,
}

impl TensorData {
    /// Sparse data from one coordinate vector per observed entry
    pub fn new(
        dims: Vec<usize>,
        coords: &[Vec<usize>],
        values: &[f64],
        noise: &NoiseConfig,
    ) -> Result<Self, DataError> {
        let dims = PVec::from(dims);
        let nmodes = dims.nmodes();
        if nmodes < 2 {
            return Err(DataError::TooFewModes(nmodes));
        }
        if coords.len() != values.len() {
            return Err(DataError::ValueCountMismatch {
                n_coords: coords.len(),
                n_values: values.len(),
            });
        }
        noise.validate()?;

        let mut flat = Vec::with_capacity(coords.len() * nmodes);
        for (entry, (coord, &value)) in coords.iter().zip(values).enumerate() {
            if coord.len() != nmodes {
                return Err(DataError::CoordinateLength {
                    entry,
                    expected: nmodes,
                    found: coord.len(),
                });
            }
            let pos = PVec::from(coord.as_slice());
            if !pos.in_bounds(&dims) {
                return Err(DataError::OutOfBounds {
                    pos,
                    dims: dims.clone(),
                });
            }
            if !value.is_finite() {
                return Err(DataError::NonFiniteValue { entry, value });
            }
            if noise.is_probit() && value != 0.0 && value != 1.0 {
                return Err(DataError::NonBinaryValue { entry, value });
            }
            flat.extend_from_slice(coord);
        }

        let modes = (0..nmodes)
            .map(|mode| SparseMode::new(&flat, values, nmodes, mode, dims[mode]))
            .collect();

        Ok(TensorData {
            dims,
            modes,
            noise: NoiseModel::from(noise),
            gram: None,
            centering: Centering::default(),
        })
    }

    /// A fully observed matrix
    pub fn dense(
        values: &Matrix<f64>,
        noise: &NoiseConfig,
    ) -> Result<Self, DataError> {
        let coords: Vec<Vec<usize>> = (0..values.n_rows())
            .flat_map(|i| (0..values.n_cols()).map(move |j| vec![i, j]))
            .collect();
        Self::new(
            vec![values.n_rows(), values.n_cols()],
            &coords,
            values.raw_values(),
            noise,
        )
    }

    #[inline]
    pub fn nmodes(&self) -> usize {
        self.dims.nmodes()
    }

    #[inline]
    pub fn dims(&self) -> &PVec {
        &self.dims
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.modes[0].nnz()
    }

    /// Number of unobserved cells
    #[inline]
    pub fn nna(&self) -> usize {
        self.dims.prod() - self.nnz()
    }

    /// The compressed index fixing `mode`
    pub fn mode(&self, mode: usize) -> &SparseMode {
        &self.modes[mode]
    }

    /// All observed `(coordinate, value)` pairs
    pub fn entries(&self) -> impl Iterator<Item = (&[usize], f64)> {
        self.modes[0].iter()
    }

    pub fn noise(&self) -> &NoiseModel {
        &self.noise
    }

    /// Replace the noise state, e.g. with one restored from a checkpoint
    pub(crate) fn set_noise(&mut self, noise: NoiseModel) {
        self.noise = noise;
    }

    pub fn centering(&self) -> &Centering {
        &self.centering
    }

    pub fn sum(&self) -> f64 {
        self.entries().map(|(_, y)| y).sum()
    }

    /// Sum of squared values
    pub fn sum_sq(&self) -> f64 {
        self.entries().map(|(_, y)| y * y).sum()
    }

    /// Residual sum of squares of `model` over the observed entries
    pub fn sumsq<F: Factors + ?Sized>(&self, model: &F) -> f64 {
        self.entries()
            .map(|(coord, y)| {
                let r = y - model.predict(coord);
                r * r
            })
            .sum()
    }

    pub fn train_rmse<F: Factors + ?Sized>(&self, model: &F) -> f64 {
        (self.sumsq(model) / self.nnz() as f64).sqrt()
    }

    pub(crate) fn push_centering(
        &self,
        acc: &mut CenteringAccumulator,
        start: &PVec,
    ) {
        let mut global = start.clone();
        self.entries().for_each(|(coord, y)| {
            coord
                .iter()
                .enumerate()
                .for_each(|(m, &x)| global[m] = x + start[m]);
            acc.push(global.as_slice(), y);
        });
    }

    /// Subtract `centering` from every value. `start` is the position of
    /// this block in the global array.
    pub(crate) fn center(&mut self, centering: &Centering, start: &PVec) {
        let mut global = start.clone();
        self.modes.iter_mut().for_each(|sm| {
            sm.map_values(|coord, y| {
                coord
                    .iter()
                    .enumerate()
                    .for_each(|(m, &x)| global[m] = x + start[m]);
                y - centering.offset(global.as_slice())
            })
        });
    }

    pub(crate) fn set_centering(&mut self, centering: Centering) {
        self.centering = centering;
    }

    /// Bind the noise model to the variance of the (centered) values
    pub(crate) fn init_noise(&mut self) {
        let n = self.nnz() as f64;
        let mean = self.sum() / n;
        let var = self.sum_sq() / n - mean * mean;
        self.noise.init(var);
    }

    /// Add this block's contribution to the precision `mm` and right hand
    /// side `rr` of latent `row` of `mode`.
    ///
    /// `current` is the row's value before this draw. Probit blocks use it to
    /// draw the latent utility of each binary observation from `rng`.
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
        let alpha = self.noise.precision();
        let probit = self.noise.is_probit();
        let gram = match &self.gram {
            Some((m, gram)) if *m == mode => Some(gram),
            _ => None,
        };

        for (coord, y) in self.modes[mode].row(row) {
            let v = DVector::from_vec(model.hadamard(coord, Some(mode)));
            let target = if probit {
                let mean: f64 =
                    v.iter().zip(current).map(|(a, b)| a * b).sum();
                draw_probit_latent(mean, y > 0.5, rng)
            } else {
                y
            };
            rr.axpy(alpha * target, &v, 1.0);
            if gram.is_none() {
                mm.ger(alpha, &v, &v, 1.0);
            }
        }

        if let Some(gram) = gram {
            *mm += gram * alpha;
        }
    }

    /// Prepare for sampling the rows of `mode`.
    ///
    /// A fully observed matrix caches the Gram matrix of the other mode,
    /// which every row of `mode` shares.
    pub fn update_pnm<F: Factors + ?Sized>(&mut self, model: &F, mode: usize) {
        self.gram = if self.nmodes() == 2 && self.nna() == 0 {
            let other = 1 - mode;
            let k = model.num_latent();
            let mut gram = DMatrix::zeros(k, k);
            (0..self.dims[other]).for_each(|ix| {
                let v = DVector::from_row_slice(model.row(other, ix));
                gram.ger(1.0, &v, &v, 1.0);
            });
            Some((mode, gram))
        } else {
            None
        };
    }

    /// Refresh the noise model from the residuals of `model`
    pub fn update_noise<F, R>(&mut self, model: &F, rng: &mut R)
    where
        F: Factors + ?Sized,
        R: Rng,
    {
        if self.noise.is_adaptive() {
            let sumsq = self.sumsq(model);
            self.noise.update(sumsq, self.nnz(), rng);
        }
    }
}
