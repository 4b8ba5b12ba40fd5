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

mod error;
pub mod metrics;
pub mod mvn;
pub mod normal_wishart;
pub mod truncnorm;

pub use bmf_consts::rv;
pub use error::LinalgError;
pub use normal_wishart::{NormalHyper, NormalWishart};
