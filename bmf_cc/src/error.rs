use bmf_data::{DataError, PVec};
use bmf_stats::LinalgError;
use thiserror::Error;

/// Errors from drawing latent rows or hyperparameters
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PriorError {
    #[error("Sampling row {row} of mode {mode} failed: {source}")]
    Row {
        mode: usize,
        row: usize,
        source: LinalgError,
    },
    #[error("Sampling the hyperparameters of mode {mode} failed: {source}")]
    Hyper { mode: usize, source: LinalgError },
    #[error(
        "Hyperparameters for mode {mode} have {found} latent dimensions but \
        the prior has {expected}"
    )]
    HyperShape {
        mode: usize,
        expected: usize,
        found: usize,
    },
    #[error("Invalid side features for mode {mode}: {reason}")]
    SideInfo { mode: usize, reason: String },
    #[error("Mode {0} has a macau prior but no side features")]
    MissingSideInfo(usize),
    #[error("Side features for mode {mode} have {found} rows, expected {expected}")]
    SideInfoRows {
        mode: usize,
        expected: usize,
        found: usize,
    },
    #[error(
        "Link matrix of mode {mode} is {}x{}, expected {}x{}",
        found.0, found.1, expected.0, expected.1
    )]
    LinkShape {
        mode: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("Prior of mode {0} has no link matrix")]
    UnexpectedLink(usize),
    #[error("Saved macau prior of mode {0} is missing its link matrix")]
    MissingLink(usize),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Expected {expected} factor matrices but found {found}")]
    ModeCount { expected: usize, found: usize },
    #[error(
        "Factor matrix of mode {mode} has {found} latent dimensions but the \
        model has {expected}"
    )]
    LatentMismatch {
        mode: usize,
        expected: usize,
        found: usize,
    },
    #[error("Factor matrix of mode {mode} has {found} rows, expected {expected}")]
    RowMismatch {
        mode: usize,
        expected: usize,
        found: usize,
    },
    #[error("Factor matrix of mode {0} has a corrupt buffer")]
    Corrupt(usize),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum PredictionError {
    #[error("Invalid held-out data: {0}")]
    Data(#[from] DataError),
    #[error("Held-out data has dimensions {found} but the model has {expected}")]
    DimMismatch { expected: PVec, found: PVec },
    #[error("Restored {found} prediction items but {expected} are held out")]
    ItemCount { expected: usize, found: usize },
    #[error("Restored prediction item {0} does not match the held-out entry")]
    ItemMismatch(usize),
}
