//! Durable snapshots of a sampling run.
//!
//! A run directory holds one root file, `<prefix>-root.yaml`, that records
//! the run options and every step file. Each step file,
//! `<prefix>-sample-<i>-step.yaml` or `<prefix>-checkpoint-<i>-step.yaml`,
//! is a registry of the artifacts written for that snapshot.
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

mod config;
mod error;
mod predictions;
mod registry;
mod root_file;
mod step_file;
mod utils;

pub use config::SerializedType;
pub use error::Error;
pub use predictions::{read_predictions, write_predictions};
pub use registry::Registry;
pub use root_file::RootFile;
pub use step_file::{PriorLink, Snapshot, StepFile, StepName};
pub use utils::{deserialize_file, load, path_validator, save, serialize_obj};
