use crate::PVec;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DataError {
    #[error("Data must have at least two modes, got {0}")]
    TooFewModes(usize),
    #[error("Expected {expected} modes but found {found}")]
    ModeMismatch { expected: usize, found: usize },
    #[error("Entry {entry} has {found} coordinates but the data has {expected} modes")]
    CoordinateLength {
        entry: usize,
        expected: usize,
        found: usize,
    },
    #[error("{n_coords} coordinates given for {n_values} values")]
    ValueCountMismatch { n_coords: usize, n_values: usize },
    #[error("Position {pos} is outside of dimensions {dims}")]
    OutOfBounds { pos: PVec, dims: PVec },
    #[error("Entry {entry} has non-finite value {value}")]
    NonFiniteValue { entry: usize, value: f64 },
    #[error("Data holds no observed entries")]
    Empty,
    #[error(
        "Block {pos} has size {found} along mode {mode} but its block row \
        has size {expected}"
    )]
    BlockSizeMismatch {
        pos: PVec,
        mode: usize,
        expected: usize,
        found: usize,
    },
    #[error("Two blocks share block position {0}")]
    DuplicateBlock(PVec),
    #[error("No block at block position {0}; blocks must cover the full array")]
    MissingBlock(PVec),
    #[error("Invalid noise configuration: {0}")]
    InvalidNoise(String),
    #[error("Data has not been initialized")]
    NotInitialized,
    #[error("Entry {entry} of probit data has value {value}; expected 0 or 1")]
    NonBinaryValue { entry: usize, value: f64 },
    #[error("Probit data cannot be centered (center mode {0})")]
    CenteredBinary(String),
    #[error("Restored {found} noise models for {expected} data blocks")]
    NoiseCount { expected: usize, found: usize },
    #[error("Restored noise model of block {0} does not match its configuration")]
    NoiseMismatch(usize),
}
