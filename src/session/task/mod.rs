//! The stages of the session pipeline
mod model_reader;
mod predict;
mod train;

pub use model_reader::ModelReaderTask;
pub use predict::PredictTask;
pub use train::TrainTask;

use std::sync::Arc;
use std::time::Duration;

use bmf_cc::{LatentModel, PredictionSummary};
use bmf_metadata::{RootFile, Snapshot, StepFile};
use bmf_utils::RunContext;
use enum_dispatch::enum_dispatch;

use super::{SessionError, StepStatus};
use crate::Config;

/// The value one stage hands to the next within an iteration
#[derive(Clone, Debug)]
pub enum TaskOutput {
    Nothing,
    Model(Arc<LatentModel>),
    Prediction(PredictionSummary),
}

impl TaskOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Nothing => "nothing",
            Self::Model(_) => "a model",
            Self::Prediction(_) => "a prediction",
        }
    }
}

/// One stage of the pipeline.
///
/// Stages are set up and initialized in pipeline order, then advanced once
/// per iteration, each consuming the output of the stage before it.
#[enum_dispatch(Task)]
pub trait SessionTask {
    fn name(&self) -> &'static str;

    /// Bind the run configuration. `root` is the open root file when the
    /// run reads or writes snapshots.
    fn setup(
        &mut self,
        config: &Config,
        root: Option<&RootFile>,
    ) -> Result<(), SessionError>;

    /// Build the initial state
    fn initialize(&mut self, ctx: &RunContext) -> Result<(), SessionError>;

    /// Run one iteration of this stage
    fn advance(
        &mut self,
        input: TaskOutput,
        is_burnin: bool,
        ctx: &RunContext,
    ) -> Result<TaskOutput, SessionError>;

    /// Contribute this stage's state to a snapshot
    fn persist(&self, snapshot: &mut Snapshot);

    /// Load this stage's state from a snapshot
    fn restore(&mut self, step: &StepFile) -> Result<(), SessionError>;

    /// Add this stage's metrics to the iteration status
    fn report(&self, _status: &mut StepStatus) {}

    /// Human readable summary for logs
    fn describe(&self) -> String;

    /// Total wall time spent in `advance`
    fn elapsed(&self) -> Duration;
}

#[enum_dispatch]
#[derive(Debug)]
pub enum Task {
    ModelReader(ModelReaderTask),
    Train(TrainTask),
    Predict(PredictTask),
}
