//! Bayesian matrix and tensor factorization by Gibbs sampling.
//!
//! A [`Session`] factorizes a partially observed sparse matrix or tensor into
//! one latent factor matrix per mode, drawing posterior samples of the
//! factors and averaging the predictions of held-out entries over them.
//!
//! # Example
//!
//! Fit a small rank-one matrix, writing every second sample to disk, then
//! replay the saved samples to predict a held-out entry.
//!
//! ```rust
//! use bmf::{Config, SaveConfig, Session};
//! use bmf::data::{DataConfig, NoiseConfig, SparseConfig};
//!
//! let dir = tempfile::tempdir().unwrap();
//!
//! let u = [1.0, -0.5, 0.8, 0.3, -1.2];
//! let v = [0.7, 1.1, -0.4, 0.9];
//! let mut train = SparseConfig::new(vec![5, 4])
//!     .noise(NoiseConfig::Fixed { precision: 25.0 });
//! for i in 0..5 {
//!     for j in 0..4 {
//!         if (i, j) != (2, 1) {
//!             train = train.push(vec![i, j], u[i] * v[j]);
//!         }
//!     }
//! }
//! let test = SparseConfig::new(vec![5, 4]).push(vec![2, 1], u[2] * v[1]);
//!
//! let config = Config::new(DataConfig::Sparse(train))
//!     .num_latent(2)
//!     .burnin(20)
//!     .nsamples(20)
//!     .seed(7)
//!     .test(test)
//!     .save(SaveConfig::new(dir.path()).save_freq(2));
//!
//! let mut session = Session::new(config).unwrap();
//! session.run().unwrap();
//! let root = session.root_file().unwrap().path().to_path_buf();
//!
//! let mut replay = Session::predict_from_root(&root).unwrap();
//! replay.run().unwrap();
//! assert_eq!(replay.predictions().unwrap().nsamples(), 10);
//! ```
#![warn(unused_extern_crates)]
#![warn(
    clippy::all,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::unseparated_literal_suffix,
    clippy::unreadable_literal,
    clippy::option_option,
    clippy::implicit_clone,
    clippy::perf
)]

pub mod config;
mod session;

pub use config::{Config, ConfigError, SaveConfig};
pub use session::{
    task, update_handler, Iteration, Phase, Session, SessionError,
    SessionState, StepStatus,
};

pub use bmf_cc::{
    LatentModel, LatentPrior, ModelInit, PredictionAccumulator, PriorKind,
};
pub use bmf_data::{CenterMode, DataConfig, NoiseConfig, SparseConfig};
pub use bmf_metadata::{RootFile, SerializedType, StepFile, StepName};

pub mod consts {
    pub use bmf_consts::*;
}

pub mod metadata {
    pub use bmf_metadata::*;
}

pub mod cc {
    pub use bmf_cc::*;
}

pub mod data {
    pub use bmf_data::*;
}

pub mod stats {
    pub use bmf_stats::*;
}

pub mod utils {
    pub use bmf_utils::*;
}
