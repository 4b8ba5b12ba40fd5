//! Latent factor model, per-mode Gibbs priors, and running prediction
//! statistics.
#![warn(unused_extern_crates)]
#![warn(
    clippy::all,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::unseparated_literal_suffix,
    clippy::unreadable_literal,
    clippy::option_option,
    clippy::implicit_clone
)]

pub mod error;
pub mod model;
pub mod prior;
pub mod result;

pub use error::{ModelError, PredictionError, PriorError};
pub use model::{LatentModel, ModelInit, ModelMeta};
pub use prior::{
    DefaultPriorFactory, LatentPrior, MacauLink, MacauPrior, NormalOnePrior,
    NormalPrior, Prior, PriorFactory, PriorKind, SideInfoConfig,
};
pub use result::{
    PredictionAccumulator, PredictionState, PredictionSummary, ResultItem,
};
