use bmf_cc::{ModelError, PredictionError, PriorError};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "Invalid step file name `{0}`. Step files are named \
        `<prefix>-sample-<i>-step.yaml` or `<prefix>-checkpoint-<i>-step.yaml`"
    )]
    StepFileNameInvalid(String),
    #[error("Invalid root file name `{0}`. Root files are named `<prefix>-root.yaml`")]
    RootFileNameInvalid(String),
    #[error(
        "Invalid serialized type `{0}`. Options are `bincode`, `yaml`, and \
        `json`."
    )]
    SerializedTypeInvalid(String),
    #[error("Registry {path} has no entry `{key}`")]
    MissingKey { path: PathBuf, key: String },
    #[error("Entry `{key}` refers to {path}, which does not exist")]
    MissingArtifact { key: String, path: PathBuf },
    #[error("Entry `{key}` has invalid value `{value}`")]
    InvalidEntry { key: String, value: String },
    #[error("Registry still holds entries after removal: {0:?}")]
    StrayEntries(Vec<String>),
    #[error("Registry {0} already exists")]
    RegistryExists(PathBuf),
    #[error("Saved prior {index} is a {found} prior on mode {found_mode}, expected {expected} on mode {expected_mode}")]
    PriorMismatch {
        index: usize,
        expected: String,
        expected_mode: usize,
        found: String,
        found_mode: usize,
    },
    #[error("Malformed predictions file: {0}")]
    Predictions(String),
    #[error("IoError: {0}")]
    Io(#[from] io::Error),
    #[error("YamlError: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JsonError: {0}")]
    Json(#[from] serde_json::Error),
    #[error("BincodeError: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("PolarsError: {0}")]
    Polars(#[from] polars::error::PolarsError),
    #[error("Saved model is invalid: {0}")]
    Model(#[from] ModelError),
    #[error("Saved prior is invalid: {0}")]
    Prior(#[from] PriorError),
    #[error("Saved predictions are invalid: {0}")]
    Prediction(#[from] PredictionError),
}
