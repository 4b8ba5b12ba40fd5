//! Default run parameters shared by the bmf crates.
pub use rv;

/// Number of latent dimensions per factor row
pub const DEFAULT_NUM_LATENT: usize = 96;

/// Number of burn-in iterations discarded before averaging
pub const DEFAULT_BURNIN: usize = 200;

/// Number of post burn-in sampling iterations
pub const DEFAULT_NSAMPLES: usize = 800;

/// Observation precision of the fixed noise model
pub const DEFAULT_PRECISION: f64 = 5.0;

/// Initial signal-to-noise ratio of the adaptive noise model
pub const DEFAULT_SN_INIT: f64 = 1.0;

/// Maximum signal-to-noise ratio of the adaptive noise model
pub const DEFAULT_SN_MAX: f64 = 10.0;

/// Minimum signal-to-noise ratio of the adaptive noise model
pub const DEFAULT_SN_MIN: f64 = 1e-3;

/// Prefix of all checkpoint files
pub const DEFAULT_SAVE_PREFIX: &str = "model";

/// Number of checkpoint snapshots kept on disk
pub const DEFAULT_KEEP_CHECKPOINTS: usize = 1;

/// Prior pseudo-count on the Normal-Wishart hyper mean
pub const NORMAL_WISHART_BETA: f64 = 2.0;

/// Initial precision of the side-feature link matrix
pub const DEFAULT_LAMBDA_BETA: f64 = 10.0;

/// Prior mean of the link precision
pub const LAMBDA_BETA_MU0: f64 = 1.0;

/// Prior pseudo-count of the link precision
pub const LAMBDA_BETA_NU0: f64 = 1e-3;

/// Diagonal jitter added to a row precision that fails to factorize
pub const CHOLESKY_JITTER: f64 = 1e-8;

/// Number of times the jitter grows tenfold before giving up
pub const CHOLESKY_MAX_TRIES: usize = 8;
