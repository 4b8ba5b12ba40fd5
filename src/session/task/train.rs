use std::sync::Arc;
use std::time::{Duration, Instant};

use bmf_cc::{
    DefaultPriorFactory, LatentModel, LatentPrior, ModelInit, PriorFactory,
    Prior, PriorKind, SideInfoConfig,
};
use bmf_data::{CenterMode, Factors, PositionedData};
use bmf_metadata::{RootFile, Snapshot, StepFile};
use bmf_utils::RunContext;
use log::{debug, info};

use super::{SessionTask, TaskOutput};
use crate::session::{SessionError, StepStatus};
use crate::Config;

/// Owns the training data, one prior per mode, and the current model.
/// Each iteration is a full Gibbs sweep followed by a noise update.
#[derive(Debug, Default)]
pub struct TrainTask {
    num_latent: usize,
    kinds: Vec<PriorKind>,
    side_info: Vec<SideInfoConfig>,
    model_init: ModelInit,
    center_mode: CenterMode,
    train_rmse: bool,
    data: Option<PositionedData>,
    priors: Vec<LatentPrior>,
    model: Arc<LatentModel>,
    elapsed: Duration,
}

impl TrainTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(&self) -> &Arc<LatentModel> {
        &self.model
    }

    pub fn priors(&self) -> &[LatentPrior] {
        &self.priors
    }

    pub fn data(&self) -> Option<&PositionedData> {
        self.data.as_ref()
    }

    fn data_mut(&mut self) -> Result<&mut PositionedData, SessionError> {
        self.data.as_mut().ok_or(SessionError::NotInitialized)
    }
}

impl SessionTask for TrainTask {
    fn name(&self) -> &'static str {
        "train"
    }

    fn setup(
        &mut self,
        config: &Config,
        _root: Option<&RootFile>,
    ) -> Result<(), SessionError> {
        self.num_latent = config.num_latent;
        self.kinds = config.prior_kinds();
        self.side_info = config.side_info.clone();
        self.model_init = config.model_init;
        self.center_mode = config.center_mode;
        self.train_rmse = config.verbose > 1;
        self.data = Some(PositionedData::from_config(&config.train)?);
        Ok(())
    }

    fn initialize(&mut self, ctx: &RunContext) -> Result<(), SessionError> {
        let (num_latent, model_init, center_mode) =
            (self.num_latent, self.model_init, self.center_mode);
        let data = self.data_mut()?;
        data.init(center_mode)?;
        let dims = data.dims().clone();
        let centering = data.centering().clone();

        let mut model = LatentModel::init(num_latent, &dims, model_init, ctx);
        model.set_centering(centering);
        self.model = Arc::new(model);
        let priors = DefaultPriorFactory::default()
            .with_side_info(self.side_info.clone())
            .create_priors(&self.kinds, num_latent)?;
        for prior in priors.iter() {
            prior.check_rows(dims[prior.mode()])?;
        }
        self.priors = priors;
        debug!(
            "Initialized {} model of dims {:?} with {} latent dimensions",
            model_init, dims, num_latent
        );
        Ok(())
    }

    fn advance(
        &mut self,
        input: TaskOutput,
        is_burnin: bool,
        ctx: &RunContext,
    ) -> Result<TaskOutput, SessionError> {
        if !matches!(input, TaskOutput::Nothing) {
            return Err(SessionError::UnexpectedInput {
                stage: self.name(),
                found: input.kind(),
            });
        }
        let start = Instant::now();
        let data = self.data.as_mut().ok_or(SessionError::NotInitialized)?;
        let model = Arc::make_mut(&mut self.model);
        for prior in self.priors.iter_mut() {
            prior.sample_latents(model, data, ctx)?;
        }
        data.update(&*model, ctx);
        if !is_burnin {
            model.add_sample();
        }
        self.elapsed += start.elapsed();
        Ok(TaskOutput::Model(Arc::clone(&self.model)))
    }

    fn persist(&self, snapshot: &mut Snapshot) {
        snapshot.model = Some(Arc::clone(&self.model));
        snapshot.priors = self.priors.clone();
        if let Some(data) = self.data.as_ref() {
            snapshot.noise = data.noise_models();
        }
    }

    fn restore(&mut self, step: &StepFile) -> Result<(), SessionError> {
        if let Some(mut model) = step.restore_model()? {
            let data = self.data.as_ref().ok_or(SessionError::NotInitialized)?;
            let expected = data.dims();
            let found = model.dims();
            if &found != expected || model.num_latent() != self.num_latent {
                return Err(SessionError::ModelShape {
                    expected: expected.as_slice().to_vec(),
                    found: found.as_slice().to_vec(),
                    expected_latent: self.num_latent,
                    found_latent: model.num_latent(),
                });
            }
            // centering always comes from the data of this run
            model.set_centering(data.centering().clone());
            self.model = Arc::new(model);
        }

        if let Some(links) = step.restore_priors()? {
            if links.len() != self.priors.len() {
                return Err(SessionError::PriorCount {
                    expected: self.priors.len(),
                    found: links.len(),
                });
            }
            for (ix, (link, prior)) in
                links.into_iter().zip(self.priors.iter_mut()).enumerate()
            {
                link.apply(ix, prior)?;
            }
        }

        if let Some(noise) = step.restore_noise()? {
            self.data_mut()?.set_noise_models(noise)?;
        }
        info!("Restored training state from {}", step.path().display());
        Ok(())
    }

    fn report(&self, status: &mut StepStatus) {
        status.norms = self.model.norms();
        if let Some(data) = self.data.as_ref() {
            status.noise = data.noise_precisions();
            if self.train_rmse {
                status.train_rmse = data.train_rmse(&*self.model);
            }
        }
    }

    fn describe(&self) -> String {
        let mut lines = vec![format!(
            "train: {} latent dimensions, {} samples drawn",
            self.num_latent,
            self.model.nsamples()
        )];
        if let Some(data) = self.data.as_ref() {
            lines.push(format!(
                "  {} data of dims {:?} with {} observations",
                data.kind(),
                data.dims(),
                data.nnz()
            ));
        }
        lines.extend(self.priors.iter().map(|p| format!("  {}", p.describe())));
        lines.join("\n")
    }

    fn elapsed(&self) -> Duration {
        self.elapsed
    }
}
