//! Running prediction statistics over held-out entries
use bmf_data::{PVec, SparseConfig};
use bmf_stats::metrics::{auc, rmse};
use serde::{Deserialize, Serialize};

use crate::{LatentModel, PredictionError};

/// One held-out entry and its prediction statistics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub coords: Vec<usize>,
    /// Observed value
    pub val: f64,
    /// Prediction of the latest sample
    pub pred_1sample: f64,
    /// Mean prediction over post burn-in samples
    pub pred_avg: f64,
    /// Running sum of squared deviations from `pred_avg`
    pub var: f64,
}

impl ResultItem {
    fn new(coords: Vec<usize>, val: f64) -> Self {
        Self {
            coords,
            val,
            pred_1sample: f64::NAN,
            pred_avg: 0.0,
            var: 0.0,
        }
    }

    /// Sample standard deviation of the predictions given `nsamples`
    /// accumulated samples. `NaN` with fewer than two.
    pub fn pred_std(&self, nsamples: usize) -> f64 {
        if nsamples < 2 {
            f64::NAN
        } else {
            (self.var / (nsamples - 1) as f64).sqrt()
        }
    }

    fn push(&mut self, pred: f64, nsamples: usize) {
        let delta = pred - self.pred_avg;
        self.pred_avg += delta / (nsamples + 1) as f64;
        self.var += delta * (pred - self.pred_avg);
    }
}

/// Counters and metrics of an accumulator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionState {
    /// Post burn-in samples folded into the averages
    pub sample_iter: usize,
    pub burnin_iter: usize,
    pub rmse_avg: f64,
    pub rmse_1sample: f64,
    pub auc_avg: f64,
    pub auc_1sample: f64,
    /// Values above the threshold are positives when computing AUC
    #[serde(default)]
    pub threshold: Option<f64>,
}

impl PredictionState {
    fn new(threshold: Option<f64>) -> Self {
        Self {
            sample_iter: 0,
            burnin_iter: 0,
            rmse_avg: f64::NAN,
            rmse_1sample: f64::NAN,
            auc_avg: f64::NAN,
            auc_1sample: f64::NAN,
            threshold,
        }
    }
}

/// Snapshot of the metrics after an update
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PredictionSummary {
    pub nsamples: usize,
    pub rmse_avg: f64,
    pub rmse_1sample: f64,
    pub auc_avg: f64,
    pub auc_1sample: f64,
}

/// Predictions for a fixed set of held-out entries, averaged over the
/// post burn-in samples with Welford's update.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictionAccumulator {
    dims: PVec,
    items: Vec<ResultItem>,
    state: PredictionState,
}

impl PredictionAccumulator {
    pub fn new(
        test: &SparseConfig,
        threshold: Option<f64>,
    ) -> Result<Self, PredictionError> {
        // validates coordinates and values
        test.build()?;
        let items = test
            .coords
            .iter()
            .zip(test.values.iter())
            .map(|(coords, &val)| ResultItem::new(coords.clone(), val))
            .collect();
        Ok(Self {
            dims: test.dims.clone().into(),
            items,
            state: PredictionState::new(threshold),
        })
    }

    /// Replace items and counters with saved ones. The saved items must be
    /// the same held-out entries in the same order.
    pub fn restore(
        &mut self,
        items: Vec<ResultItem>,
        state: PredictionState,
    ) -> Result<(), PredictionError> {
        if items.len() != self.items.len() {
            return Err(PredictionError::ItemCount {
                expected: self.items.len(),
                found: items.len(),
            });
        }
        if let Some(ix) = self
            .items
            .iter()
            .zip(items.iter())
            .position(|(a, b)| a.coords != b.coords || a.val != b.val)
        {
            return Err(PredictionError::ItemMismatch(ix));
        }
        self.items = items;
        self.state = state;
        Ok(())
    }

    /// Ensure the held-out entries address a model of `dims`
    pub fn check_dims(&self, dims: &PVec) -> Result<(), PredictionError> {
        if &self.dims == dims {
            Ok(())
        } else {
            Err(PredictionError::DimMismatch {
                expected: dims.clone(),
                found: self.dims.clone(),
            })
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ResultItem] {
        &self.items
    }

    pub fn state(&self) -> &PredictionState {
        &self.state
    }

    #[inline]
    pub fn nsamples(&self) -> usize {
        self.state.sample_iter
    }

    /// Predict every held-out entry with `model`. Burn-in samples only
    /// refresh the single-sample metrics; later samples also enter the
    /// running averages.
    pub fn update(&mut self, model: &LatentModel, burnin: bool) {
        let nsamples = self.state.sample_iter;
        self.items.iter_mut().for_each(|item| {
            let pred = model.predict_value(&item.coords);
            item.pred_1sample = pred;
            if !burnin {
                item.push(pred, nsamples);
            }
        });

        self.state.rmse_1sample = rmse(self.pairs(|item| item.pred_1sample));
        if let Some(threshold) = self.state.threshold {
            self.state.auc_1sample =
                auc(self.pairs(|item| item.pred_1sample), threshold);
        }

        if burnin {
            self.state.burnin_iter += 1;
        } else {
            self.state.sample_iter += 1;
            self.state.rmse_avg = rmse(self.pairs(|item| item.pred_avg));
            if let Some(threshold) = self.state.threshold {
                self.state.auc_avg =
                    auc(self.pairs(|item| item.pred_avg), threshold);
            }
        }
    }

    fn pairs<'a, F>(&'a self, f: F) -> impl Iterator<Item = (f64, f64)> + 'a
    where
        F: Fn(&ResultItem) -> f64 + 'a,
    {
        self.items.iter().map(move |item| (f(item), item.val))
    }

    pub fn summary(&self) -> PredictionSummary {
        PredictionSummary {
            nsamples: self.state.sample_iter,
            rmse_avg: self.state.rmse_avg,
            rmse_1sample: self.state.rmse_1sample,
            auc_avg: self.state.auc_avg,
            auc_1sample: self.state.auc_1sample,
        }
    }
}
