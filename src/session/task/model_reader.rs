use std::sync::Arc;
use std::time::{Duration, Instant};

use bmf_metadata::{RootFile, Snapshot, StepFile};
use bmf_utils::RunContext;
use log::debug;

use super::{SessionTask, TaskOutput};
use crate::session::SessionError;
use crate::Config;

/// Replays the sample snapshots of a finished run, one per iteration, in
/// increasing sample index.
#[derive(Debug, Default)]
pub struct ModelReaderTask {
    steps: Vec<StepFile>,
    next: usize,
    elapsed: Duration,
}

impl ModelReaderTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots to replay
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl SessionTask for ModelReaderTask {
    fn name(&self) -> &'static str {
        "model_reader"
    }

    fn setup(
        &mut self,
        _config: &Config,
        root: Option<&RootFile>,
    ) -> Result<(), SessionError> {
        let root = root.ok_or(SessionError::NoSnapshots)?;
        self.steps = root.sample_step_files()?;
        if self.steps.is_empty() {
            return Err(SessionError::NoSnapshots);
        }
        self.next = 0;
        Ok(())
    }

    fn initialize(&mut self, _ctx: &RunContext) -> Result<(), SessionError> {
        debug!("Reading {} sample snapshots", self.steps.len());
        Ok(())
    }

    fn advance(
        &mut self,
        input: TaskOutput,
        _is_burnin: bool,
        _ctx: &RunContext,
    ) -> Result<TaskOutput, SessionError> {
        if !matches!(input, TaskOutput::Nothing) {
            return Err(SessionError::UnexpectedInput {
                stage: self.name(),
                found: input.kind(),
            });
        }
        let start = Instant::now();
        let step = self.steps.get(self.next).ok_or(SessionError::NoSnapshots)?;
        let model = step
            .restore_model()?
            .ok_or_else(|| SessionError::MissingModel(step.isample()))?;
        debug!("Read model of {}", step.file_name());
        self.next += 1;
        self.elapsed += start.elapsed();
        Ok(TaskOutput::Model(Arc::new(model)))
    }

    fn persist(&self, _snapshot: &mut Snapshot) {}

    fn restore(&mut self, _step: &StepFile) -> Result<(), SessionError> {
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "model_reader: {}/{} snapshots read",
            self.next,
            self.steps.len()
        )
    }

    fn elapsed(&self) -> Duration {
        self.elapsed
    }
}
