use bmf_cc::{ModelError, PredictionError, PriorError};
use bmf_data::DataError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that end a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Data error: {0}")]
    Data(#[from] DataError),
    #[error("Sampling failed: {0}")]
    Prior(#[from] PriorError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Prediction error: {0}")]
    Prediction(#[from] PredictionError),
    #[error("Checkpoint error: {0}")]
    Metadata(#[from] bmf_metadata::Error),
    #[error("Could not build the thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    /// `step` was called before `init`
    #[error("The session has not been initialized")]
    NotInitialized,
    #[error("The session has already been initialized")]
    AlreadyInitialized,
    /// An earlier step failed. The session accepts no further work.
    #[error("The session failed earlier and cannot continue")]
    Poisoned,
    #[error("Stage `{stage}` cannot consume {found}")]
    UnexpectedInput { stage: &'static str, found: &'static str },
    #[error("No sample snapshots to read")]
    NoSnapshots,
    #[error("Snapshot {0} holds no model")]
    MissingModel(usize),
    #[error(
        "Snapshot model has dims {found:?} and {found_latent} latent \
        dimensions, expected {expected:?} and {expected_latent}"
    )]
    ModelShape {
        expected: Vec<usize>,
        found: Vec<usize>,
        expected_latent: usize,
        found_latent: usize,
    },
    #[error("Snapshot holds {found} priors but the run has {expected}")]
    PriorCount { expected: usize, found: usize },
}
