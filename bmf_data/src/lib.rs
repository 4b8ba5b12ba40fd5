//! Sparse observed matrices and tensors, alone or composed from blocks.
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

mod center;
mod config;
mod error;
mod factors;
mod matrices;
mod noise;
mod positioned;
mod pvec;
mod sparse_mode;
mod tensor;

pub use center::{CenterMode, Centering};
pub use config::{BlockConfig, DataConfig, SparseConfig};
pub use error::DataError;
pub use factors::{Factors, Offset};
pub use matrices::{Block, MatricesData};
pub use noise::{NoiseConfig, NoiseModel};
pub use positioned::PositionedData;
pub use pvec::PVec;
pub use sparse_mode::SparseMode;
pub use tensor::TensorData;
