use std::fmt;
use std::time::Duration;

use super::Phase;

/// What happened in one iteration
#[derive(Clone, Debug, PartialEq)]
pub struct StepStatus {
    pub phase: Phase,
    /// 1-based index within the phase
    pub iter: usize,
    pub phase_len: usize,
    /// Wall time of the iteration
    pub elapsed: Duration,
    /// Wall time of each pipeline stage
    pub stage_elapsed: Vec<(String, Duration)>,
    pub rmse_avg: f64,
    pub rmse_1sample: f64,
    pub auc_avg: f64,
    pub auc_1sample: f64,
    /// RMSE on the training data. Only computed at verbosity above 1.
    pub train_rmse: f64,
    /// Frobenius norm of each factor matrix
    pub norms: Vec<f64>,
    /// Noise precision of each data block
    pub noise: Vec<f64>,
}

impl StepStatus {
    pub fn new(phase: Phase, iter: usize, phase_len: usize) -> Self {
        Self {
            phase,
            iter,
            phase_len,
            elapsed: Duration::ZERO,
            stage_elapsed: Vec::new(),
            rmse_avg: f64::NAN,
            rmse_1sample: f64::NAN,
            auc_avg: f64::NAN,
            auc_1sample: f64::NAN,
            train_rmse: f64::NAN,
            norms: Vec::new(),
            noise: Vec::new(),
        }
    }

    /// Header of the status log for a model with `nmodes` modes
    pub fn csv_header(nmodes: usize) -> String {
        let mut cols: Vec<String> = [
            "phase",
            "iter",
            "phase_len",
            "rmse_avg",
            "rmse_1samp",
            "train_rmse",
            "auc_avg",
            "auc_1samp",
        ]
        .iter()
        .map(|s| String::from(*s))
        .collect();
        cols.extend((0..nmodes).map(|m| format!("U{m}")));
        cols.push(String::from("elapsed"));
        cols.join(";")
    }

    /// One row of the status log
    pub fn csv_line(&self) -> String {
        let mut cols = vec![
            self.phase.to_string(),
            self.iter.to_string(),
            self.phase_len.to_string(),
            self.rmse_avg.to_string(),
            self.rmse_1sample.to_string(),
            self.train_rmse.to_string(),
            self.auc_avg.to_string(),
            self.auc_1sample.to_string(),
        ];
        cols.extend(self.norms.iter().map(|n| n.to_string()));
        cols.push(self.elapsed.as_secs_f64().to_string());
        cols.join(";")
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:>4}/{}: RMSE: {:.4} (1samp: {:.4})",
            self.phase, self.iter, self.phase_len, self.rmse_avg, self.rmse_1sample
        )?;
        if !self.auc_1sample.is_nan() {
            write!(f, " AUC: {:.4} (1samp: {:.4})", self.auc_avg, self.auc_1sample)?;
        }
        if !self.train_rmse.is_nan() {
            write!(f, " train: {:.4}", self.train_rmse)?;
        }
        let norms: Vec<String> =
            self.norms.iter().map(|n| format!("{n:.2}")).collect();
        write!(
            f,
            " U: [{}] [took: {:.3}s]",
            norms.join(", "),
            self.elapsed.as_secs_f64()
        )
    }
}
