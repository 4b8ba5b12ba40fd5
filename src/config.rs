use std::path::PathBuf;

use bmf_cc::{ModelInit, PriorError, PriorKind, SideInfoConfig};
use bmf_consts::{
    DEFAULT_BURNIN, DEFAULT_KEEP_CHECKPOINTS, DEFAULT_NSAMPLES,
    DEFAULT_NUM_LATENT, DEFAULT_SAVE_PREFIX,
};
use bmf_data::{CenterMode, DataConfig, DataError, SparseConfig};
use bmf_metadata::SerializedType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("num_latent must be positive")]
    ZeroLatent,
    #[error("burnin + nsamples must be positive")]
    NoIterations,
    #[error("Training data must have at least two modes, got {0}")]
    TooFewModes(usize),
    #[error("{found} priors given for {nmodes} modes")]
    PriorCount { nmodes: usize, found: usize },
    #[error("Test data has {found} modes but training data has {expected}")]
    TestModes { expected: usize, found: usize },
    #[error("Classification threshold must be finite, got {0}")]
    InvalidThreshold(f64),
    #[error("num_threads must be positive")]
    ZeroThreads,
    #[error("Save prefix must be non-empty and may not contain path separators")]
    InvalidPrefix(String),
    #[error("checkpoint_freq must be positive")]
    ZeroCheckpointFreq,
    #[error("keep_checkpoints must be positive")]
    ZeroKeepCheckpoints,
    #[error("Invalid noise: {0}")]
    Noise(#[from] DataError),
    #[error("Invalid side features: {0}")]
    SideInfo(#[from] PriorError),
    #[error("Side features given for mode {0}, which has no macau prior")]
    UnusedSideInfo(usize),
    #[error("Side features given twice for mode {0}")]
    DuplicateSideInfo(usize),
}

fn default_prefix() -> String {
    String::from(DEFAULT_SAVE_PREFIX)
}

fn default_keep_checkpoints() -> usize {
    DEFAULT_KEEP_CHECKPOINTS
}

/// Where and how often snapshots are written
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SaveConfig {
    /// Directory of the root file and all snapshots
    pub dir: PathBuf,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// `n > 0`: save every `n`th sample. `n < 0`: save the last sample only.
    /// `0`: never save samples.
    #[serde(default)]
    pub save_freq: i32,
    /// Write a checkpoint every `n` samples
    #[serde(default)]
    pub checkpoint_freq: Option<usize>,
    /// Number of most recent checkpoints kept on disk
    #[serde(default = "default_keep_checkpoints")]
    pub keep_checkpoints: usize,
    #[serde(default)]
    pub serialized_type: SerializedType,
}

impl SaveConfig {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            prefix: default_prefix(),
            save_freq: 0,
            checkpoint_freq: None,
            keep_checkpoints: DEFAULT_KEEP_CHECKPOINTS,
            serialized_type: SerializedType::default(),
        }
    }

    pub fn prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn save_freq(mut self, save_freq: i32) -> Self {
        self.save_freq = save_freq;
        self
    }

    pub fn checkpoint_freq(mut self, checkpoint_freq: Option<usize>) -> Self {
        self.checkpoint_freq = checkpoint_freq;
        self
    }

    pub fn keep_checkpoints(mut self, keep_checkpoints: usize) -> Self {
        self.keep_checkpoints = keep_checkpoints;
        self
    }

    pub fn serialized_type(mut self, serialized_type: SerializedType) -> Self {
        self.serialized_type = serialized_type;
        self
    }

    /// Whether the sample with 1-based index `isample` out of `nsamples` is
    /// saved
    pub fn saves_sample(&self, isample: usize, nsamples: usize) -> bool {
        match self.save_freq {
            0 => false,
            freq if freq < 0 => isample == nsamples,
            freq => isample % (freq as usize) == 0,
        }
    }

    /// Whether a checkpoint is written after sample `isample`
    pub fn checkpoints_sample(&self, isample: usize) -> bool {
        self.checkpoint_freq
            .map_or(false, |freq| freq > 0 && isample % freq == 0)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty()
            || self.prefix.contains(std::path::is_separator)
        {
            Err(ConfigError::InvalidPrefix(self.prefix.clone()))
        } else if self.checkpoint_freq == Some(0) {
            Err(ConfigError::ZeroCheckpointFreq)
        } else if self.keep_checkpoints == 0 {
            Err(ConfigError::ZeroKeepCheckpoints)
        } else {
            Ok(())
        }
    }
}

/// Configuration of a sampling run
///
/// Sets the model size, the chain length, the data, and output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Number of latent dimensions
    pub num_latent: usize,
    /// Iterations discarded before averaging
    pub burnin: usize,
    /// Iterations averaged into the predictions
    pub nsamples: usize,
    /// Prior kind of each mode. Empty means `normal` everywhere.
    #[serde(default)]
    pub priors: Vec<PriorKind>,
    /// Row features of the modes with a macau prior
    #[serde(default)]
    pub side_info: Vec<SideInfoConfig>,
    #[serde(default)]
    pub model_init: ModelInit,
    #[serde(default)]
    pub center_mode: CenterMode,
    pub train: DataConfig,
    /// Held-out entries to predict
    #[serde(default)]
    pub test: Option<SparseConfig>,
    /// Classification threshold for AUC on the held-out entries
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Seed of the run. Drawn from entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Size of the thread pool. Rayon's global pool when absent.
    #[serde(default)]
    pub num_threads: Option<usize>,
    #[serde(default)]
    pub save: Option<SaveConfig>,
    /// 0: quiet, 1: status per iteration, 2: also training RMSE
    #[serde(default)]
    pub verbose: u8,
    /// Append per-iteration status rows to this file
    #[serde(default)]
    pub csv_status: Option<PathBuf>,
}

impl Config {
    pub fn new(train: DataConfig) -> Self {
        Self {
            num_latent: DEFAULT_NUM_LATENT,
            burnin: DEFAULT_BURNIN,
            nsamples: DEFAULT_NSAMPLES,
            priors: Vec::new(),
            side_info: Vec::new(),
            model_init: ModelInit::default(),
            center_mode: CenterMode::default(),
            train,
            test: None,
            threshold: None,
            seed: None,
            num_threads: None,
            save: None,
            verbose: 0,
            csv_status: None,
        }
    }

    pub fn num_latent(mut self, num_latent: usize) -> Self {
        self.num_latent = num_latent;
        self
    }

    pub fn burnin(mut self, burnin: usize) -> Self {
        self.burnin = burnin;
        self
    }

    pub fn nsamples(mut self, nsamples: usize) -> Self {
        self.nsamples = nsamples;
        self
    }

    pub fn priors(mut self, priors: Vec<PriorKind>) -> Self {
        self.priors = priors;
        self
    }

    pub fn side_info(mut self, side_info: SideInfoConfig) -> Self {
        self.side_info.push(side_info);
        self
    }

    pub fn model_init(mut self, model_init: ModelInit) -> Self {
        self.model_init = model_init;
        self
    }

    pub fn center_mode(mut self, center_mode: CenterMode) -> Self {
        self.center_mode = center_mode;
        self
    }

    pub fn test(mut self, test: SparseConfig) -> Self {
        self.test = Some(test);
        self
    }

    pub fn threshold(mut self, threshold: Option<f64>) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn save(mut self, save: SaveConfig) -> Self {
        self.save = Some(save);
        self
    }

    pub fn verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn csv_status<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.csv_status = Some(path.into());
        self
    }

    /// Total number of iterations
    pub fn n_iters(&self) -> usize {
        self.burnin + self.nsamples
    }

    /// The prior kind of every mode
    pub fn prior_kinds(&self) -> Vec<PriorKind> {
        if self.priors.is_empty() {
            vec![PriorKind::default(); self.train.nmodes()]
        } else {
            self.priors.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nmodes = self.train.nmodes();
        if self.num_latent == 0 {
            return Err(ConfigError::ZeroLatent);
        }
        if self.n_iters() == 0 {
            return Err(ConfigError::NoIterations);
        }
        if nmodes < 2 {
            return Err(ConfigError::TooFewModes(nmodes));
        }
        if !self.priors.is_empty() && self.priors.len() != nmodes {
            return Err(ConfigError::PriorCount {
                nmodes,
                found: self.priors.len(),
            });
        }
        if let Some(test) = self.test.as_ref() {
            if test.nmodes() != nmodes {
                return Err(ConfigError::TestModes {
                    expected: nmodes,
                    found: test.nmodes(),
                });
            }
        }
        if let Some(threshold) = self.threshold {
            if !threshold.is_finite() {
                return Err(ConfigError::InvalidThreshold(threshold));
            }
        }
        if self.num_threads == Some(0) {
            return Err(ConfigError::ZeroThreads);
        }
        if let Some(save) = self.save.as_ref() {
            save.validate()?;
        }
        let noise = self.train.noise_configs();
        noise.iter().try_for_each(|noise| noise.validate())?;
        if self.center_mode != CenterMode::None
            && noise.iter().any(|noise| noise.is_probit())
        {
            let mode = format!("{:?}", self.center_mode);
            return Err(DataError::CenteredBinary(mode).into());
        }
        self.validate_side_info()
    }

    fn validate_side_info(&self) -> Result<(), ConfigError> {
        let kinds = self.prior_kinds();
        for (ix, side) in self.side_info.iter().enumerate() {
            side.validate()?;
            if kinds.get(side.mode) != Some(&PriorKind::Macau) {
                return Err(ConfigError::UnusedSideInfo(side.mode));
            }
            if self.side_info[..ix].iter().any(|s| s.mode == side.mode) {
                return Err(ConfigError::DuplicateSideInfo(side.mode));
            }
        }
        let missing = (0..kinds.len()).find(|&mode| {
            kinds[mode] == PriorKind::Macau
                && !self.side_info.iter().any(|s| s.mode == mode)
        });
        match missing {
            Some(mode) => Err(PriorError::MissingSideInfo(mode).into()),
            None => Ok(()),
        }
    }
}
