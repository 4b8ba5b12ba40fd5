use std::time::{Duration, Instant};

use bmf_cc::PredictionAccumulator;
use bmf_metadata::{RootFile, Snapshot, StepFile};
use bmf_utils::RunContext;
use log::{debug, info};

use super::{SessionTask, TaskOutput};
use crate::session::{SessionError, StepStatus};
use crate::Config;

/// Folds every model it receives into the running predictions of the
/// held-out entries. Without held-out entries it passes nothing on.
#[derive(Debug, Default)]
pub struct PredictTask {
    predictions: Option<PredictionAccumulator>,
    elapsed: Duration,
}

impl PredictTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn predictions(&self) -> Option<&PredictionAccumulator> {
        self.predictions.as_ref()
    }
}

impl SessionTask for PredictTask {
    fn name(&self) -> &'static str {
        "predict"
    }

    fn setup(
        &mut self,
        config: &Config,
        _root: Option<&RootFile>,
    ) -> Result<(), SessionError> {
        self.predictions = config
            .test
            .as_ref()
            .map(|test| PredictionAccumulator::new(test, config.threshold))
            .transpose()?;
        Ok(())
    }

    fn initialize(&mut self, _ctx: &RunContext) -> Result<(), SessionError> {
        if let Some(pred) = self.predictions.as_ref() {
            debug!("Predicting {} held-out entries", pred.len());
        }
        Ok(())
    }

    fn advance(
        &mut self,
        input: TaskOutput,
        is_burnin: bool,
        _ctx: &RunContext,
    ) -> Result<TaskOutput, SessionError> {
        let model = match input {
            TaskOutput::Model(model) => model,
            other => {
                return Err(SessionError::UnexpectedInput {
                    stage: self.name(),
                    found: other.kind(),
                })
            }
        };
        let start = Instant::now();
        let output = match self.predictions.as_mut() {
            Some(pred) => {
                pred.check_dims(&model.dims())?;
                pred.update(&model, is_burnin);
                TaskOutput::Prediction(pred.summary())
            }
            None => TaskOutput::Nothing,
        };
        self.elapsed += start.elapsed();
        Ok(output)
    }

    fn persist(&self, snapshot: &mut Snapshot) {
        snapshot.predictions = self.predictions.clone();
    }

    fn restore(&mut self, step: &StepFile) -> Result<(), SessionError> {
        if let (Some(pred), Some((items, state))) =
            (self.predictions.as_mut(), step.restore_predictions()?)
        {
            pred.restore(items, state)?;
            info!(
                "Restored {} predictions averaged over {} samples",
                pred.len(),
                pred.nsamples()
            );
        }
        Ok(())
    }

    fn report(&self, status: &mut StepStatus) {
        if let Some(pred) = self.predictions.as_ref() {
            let state = pred.state();
            status.rmse_avg = state.rmse_avg;
            status.rmse_1sample = state.rmse_1sample;
            status.auc_avg = state.auc_avg;
            status.auc_1sample = state.auc_1sample;
        }
    }

    fn describe(&self) -> String {
        match self.predictions.as_ref() {
            Some(pred) => format!(
                "predict: {} held-out entries, {} samples averaged",
                pred.len(),
                pred.nsamples()
            ),
            None => String::from("predict: no held-out entries"),
        }
    }

    fn elapsed(&self) -> Duration {
        self.elapsed
    }
}
