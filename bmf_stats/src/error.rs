use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum LinalgError {
    /// The matrix could not be factorized even after regularization
    #[error(
        "{dim}x{dim} precision matrix is not positive definite \
        (diagonal jitter reached {jitter:e})"
    )]
    NotPositiveDefinite { dim: usize, jitter: f64 },
    #[error("Triangular solve failed on a {dim}x{dim} factor")]
    SingularFactor { dim: usize },
    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),
    #[error("Invalid degrees of freedom {0} for the Wishart draw")]
    InvalidDegreesOfFreedom(f64),
}
