//! The sampling session: a pipeline of stages driven through burn-in and
//! sampling, with snapshots written along the way.
mod error;
mod iteration;
mod status;
pub mod task;
pub mod update_handler;

pub use error::SessionError;
pub use iteration::{Iteration, Phase};
pub use status::StepStatus;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bmf_cc::{LatentModel, PredictionAccumulator};
use bmf_data::SparseConfig;
use bmf_metadata::{RootFile, Snapshot, StepName};
use bmf_utils::RunContext;
use log::{debug, info};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::SaveConfig;
use crate::Config;
use task::{
    ModelReaderTask, PredictTask, SessionTask, Task, TaskOutput, TrainTask,
};
use update_handler::{CsvStatus, StepHandler};

/// Lifecycle of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Running(Phase),
    Done,
    /// A fatal error occurred. Every later call fails with `Poisoned`.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Draw new samples, optionally writing snapshots
    Train,
    /// Replay the samples of a finished run
    Predict,
}

fn install<OP, R>(pool: Option<&ThreadPool>, op: OP) -> R
where
    OP: FnOnce() -> R + Send,
    R: Send,
{
    match pool {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

/// Drives a pipeline of [`Task`]s through the burn-in and sampling schedule
/// of a [`Config`].
///
/// # Example
///
/// ```
/// use bmf::{Config, Session};
/// use bmf::data::{DataConfig, NoiseConfig, SparseConfig};
///
/// let mut train = SparseConfig::new(vec![4, 3])
///     .noise(NoiseConfig::Fixed { precision: 10.0 });
/// for i in 0..4 {
///     for j in 0..3 {
///         if (i + j) % 2 == 0 {
///             train = train.push(vec![i, j], (i * j) as f64 / 6.0);
///         }
///     }
/// }
/// let test = SparseConfig::new(vec![4, 3]).push(vec![1, 2], 1.0 / 3.0);
///
/// let config = Config::new(DataConfig::Sparse(train))
///     .num_latent(2)
///     .burnin(5)
///     .nsamples(10)
///     .seed(1337)
///     .test(test);
///
/// let mut session = Session::new(config).unwrap();
/// session.run().unwrap();
///
/// assert!(session.iteration().is_done());
/// assert_eq!(session.predictions().unwrap().nsamples(), 10);
/// assert!(session.rmse_avg().unwrap().is_finite());
/// ```
pub struct Session {
    config: Config,
    mode: Mode,
    state: SessionState,
    iteration: Iteration,
    ctx: RunContext,
    tasks: Vec<Task>,
    root: Option<RootFile>,
    pool: Option<ThreadPool>,
    status: Option<StepStatus>,
    last_model: Option<Arc<LatentModel>>,
}

impl Session {
    fn with_tasks(config: Config, mode: Mode, tasks: Vec<Task>) -> Self {
        let seed = config
            .seed
            .unwrap_or_else(|| RunContext::from_entropy().seed());
        let config = Config {
            seed: Some(seed),
            ..config
        };
        let iteration = Iteration::new(config.burnin, config.nsamples);
        Self {
            config,
            mode,
            state: SessionState::Uninitialized,
            iteration,
            ctx: RunContext::new(seed),
            tasks,
            root: None,
            pool: None,
            status: None,
            last_model: None,
        }
    }

    /// A new training run. When saving is configured, the root file is
    /// created by `init` and must not exist yet.
    pub fn new(config: Config) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self::with_tasks(
            config,
            Mode::Train,
            vec![TrainTask::new().into(), PredictTask::new().into()],
        ))
    }

    /// Resume the run recorded in the root file at `path` from its latest
    /// snapshot
    pub fn from_root<P: AsRef<Path>>(path: P) -> Result<Self, SessionError> {
        let root = RootFile::open(path)?;
        let mut config: Config = root.restore_options()?;
        config.save = Some(Self::save_config_of(&root, config.save.take()));
        config.validate()?;
        info!("Resuming run of {}", root.path().display());

        let mut session = Self::new(config)?;
        session.root = Some(root);
        Ok(session)
    }

    /// Predict the held-out entries of the run recorded at `path` from its
    /// sample snapshots, one snapshot per iteration
    pub fn predict_from_root<P: AsRef<Path>>(
        path: P,
    ) -> Result<Self, SessionError> {
        let root = RootFile::open(path)?;
        let mut config: Config = root.restore_options()?;
        config.save = None;
        config.validate()?;

        let nsteps = root.sample_step_files()?.len();
        if nsteps == 0 {
            return Err(SessionError::NoSnapshots);
        }
        let config = config.burnin(0).nsamples(nsteps);
        let mut session = Self::with_tasks(
            config,
            Mode::Predict,
            vec![ModelReaderTask::new().into(), PredictTask::new().into()],
        );
        session.root = Some(root);
        Ok(session)
    }

    /// Replace the held-out entries before `init`
    pub fn with_test(
        mut self,
        test: SparseConfig,
        threshold: Option<f64>,
    ) -> Result<Self, SessionError> {
        if self.state != SessionState::Uninitialized {
            return Err(SessionError::AlreadyInitialized);
        }
        self.config.test = Some(test);
        self.config.threshold = threshold;
        self.config.validate()?;
        Ok(self)
    }

    fn save_config_of(root: &RootFile, saved: Option<SaveConfig>) -> SaveConfig {
        let mut save = saved.unwrap_or_else(|| SaveConfig::new(root.dir()));
        save.dir = root.dir().to_path_buf();
        save.prefix = String::from(root.prefix());
        save.serialized_type = root.serialized_type();
        save
    }

    /// Bind the configuration to every stage, initialize them, and restore
    /// the latest snapshot when there is one.
    pub fn init(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Uninitialized => (),
            SessionState::Failed => return Err(SessionError::Poisoned),
            _ => return Err(SessionError::AlreadyInitialized),
        }
        let res = self.try_init();
        self.state = match &res {
            Ok(()) if self.iteration.is_done() => SessionState::Done,
            Ok(()) => SessionState::Initialized,
            Err(_) => SessionState::Failed,
        };
        res
    }

    fn try_init(&mut self) -> Result<(), SessionError> {
        if let Some(n) = self.config.num_threads {
            self.pool = Some(ThreadPoolBuilder::new().num_threads(n).build()?);
        }

        if self.mode == Mode::Train && self.root.is_none() {
            if let Some(save) = self.config.save.as_ref() {
                let mut root = RootFile::create(
                    &save.dir,
                    &save.prefix,
                    save.serialized_type,
                )?;
                root.save_options(&self.config)?;
                self.root = Some(root);
            }
        }

        let Self {
            config,
            ctx,
            tasks,
            root,
            pool,
            ..
        } = self;
        for task in tasks.iter_mut() {
            task.setup(config, root.as_ref())?;
            install(pool.as_ref(), || task.initialize(ctx))?;
        }

        if self.mode == Mode::Train {
            self.restore_last()?;
        }

        info!(
            "Initialized session (seed {}) at {}",
            self.ctx.seed(),
            self.iteration
        );
        for task in self.tasks.iter() {
            debug!("{}", task.describe());
        }
        Ok(())
    }

    fn restore_last(&mut self) -> Result<(), SessionError> {
        let step = match self.root.as_ref() {
            Some(root) => root.open_last_step_file()?,
            None => None,
        };
        if let Some(step) = step {
            for task in self.tasks.iter_mut() {
                task.restore(&step)?;
            }
            self.iteration = Iteration::after_sample(
                self.config.burnin,
                self.config.nsamples,
                step.isample(),
            );
            info!(
                "Restored {} ({} iterations done)",
                step.file_name(),
                self.iteration.index()
            );
        }
        Ok(())
    }

    /// Run one iteration. Returns `false` when the schedule was already
    /// complete and nothing ran.
    pub fn step(&mut self) -> Result<bool, SessionError> {
        match self.state {
            SessionState::Uninitialized => {
                return Err(SessionError::NotInitialized)
            }
            SessionState::Failed => return Err(SessionError::Poisoned),
            SessionState::Done => return Ok(false),
            SessionState::Initialized | SessionState::Running(_) => (),
        }
        if self.iteration.is_done() {
            self.state = SessionState::Done;
            return Ok(false);
        }

        self.state = SessionState::Running(self.iteration.phase());
        match self.try_step() {
            Ok(()) => {
                if self.iteration.is_done() {
                    self.state = SessionState::Done;
                    info!("Finished after {} iterations", self.iteration.index());
                }
                Ok(true)
            }
            Err(err) => {
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    fn try_step(&mut self) -> Result<(), SessionError> {
        let start = Instant::now();
        let ctx = self.ctx.at_iteration(self.iteration.index());
        let is_burnin = self.iteration.is_burnin();
        // the train stage updates its model in place only when it holds the
        // sole reference
        self.last_model = None;

        let mut output = TaskOutput::Nothing;
        let mut stage_elapsed = Vec::with_capacity(self.tasks.len());
        {
            let Self {
                tasks,
                pool,
                last_model,
                ..
            } = self;
            for task in tasks.iter_mut() {
                let stage_start = Instant::now();
                let input = std::mem::replace(&mut output, TaskOutput::Nothing);
                output = install(pool.as_ref(), || {
                    task.advance(input, is_burnin, &ctx)
                })?;
                if let TaskOutput::Model(model) = &output {
                    *last_model = Some(Arc::clone(model));
                }
                stage_elapsed
                    .push((String::from(task.name()), stage_start.elapsed()));
            }
        }
        if self.mode == Mode::Train {
            self.last_model = None;
        }

        let mut status = StepStatus::new(
            self.iteration.phase(),
            self.iteration.phase_index(),
            self.iteration.phase_len(),
        );
        for task in self.tasks.iter() {
            task.report(&mut status);
        }
        status.stage_elapsed = stage_elapsed;

        if let Some(isample) = self.iteration.isample() {
            self.save_policy(isample)?;
        }

        status.elapsed = start.elapsed();
        if self.config.verbose > 0 {
            info!("{status}");
        } else {
            debug!("{status}");
        }
        self.status = Some(status);
        self.iteration.advance();
        Ok(())
    }

    fn save_policy(&mut self, isample: usize) -> Result<(), SessionError> {
        if self.mode != Mode::Train || self.root.is_none() {
            return Ok(());
        }
        let save = match self.config.save.as_ref() {
            Some(save) => save.clone(),
            None => return Ok(()),
        };
        if save.saves_sample(isample, self.config.nsamples) {
            self.save_step(StepName::sample(isample))?;
        }
        if save.checkpoints_sample(isample) {
            self.save_step(StepName::checkpoint(isample))?;
            self.prune_checkpoints(save.keep_checkpoints)?;
        }
        Ok(())
    }

    fn save_step(&mut self, name: StepName) -> Result<(), SessionError> {
        let root = match self.root.as_mut() {
            Some(root) => root,
            None => return Ok(()),
        };
        let mut snapshot = Snapshot::new();
        for task in self.tasks.iter() {
            task.persist(&mut snapshot);
        }
        let mut step = root.create_step_file(name)?;
        step.save(&snapshot)?;
        info!("Saved {}", step.path().display());
        Ok(())
    }

    fn prune_checkpoints(&mut self, keep: usize) -> Result<(), SessionError> {
        let root = match self.root.as_mut() {
            Some(root) => root,
            None => return Ok(()),
        };
        let checkpoints = root.checkpoint_step_files()?;
        let n_stale = checkpoints.len().saturating_sub(keep);
        for step in checkpoints.into_iter().take(n_stale) {
            debug!("Removing checkpoint {}", step.file_name());
            root.remove_step_file(step)?;
        }
        Ok(())
    }

    /// Initialize if needed and run every remaining iteration
    pub fn run(&mut self) -> Result<(), SessionError> {
        self.run_with(())
    }

    /// Like [`Session::run`], reporting each iteration to `handler`, which
    /// may stop the run between iterations.
    pub fn run_with<H: StepHandler>(
        &mut self,
        handler: H,
    ) -> Result<(), SessionError> {
        if self.state == SessionState::Uninitialized {
            self.init()?;
        }
        let csv = self.config.csv_status.clone().map(CsvStatus::new);
        let mut handler = (handler, csv);
        handler.init(&self.config, &self.iteration);

        let res = loop {
            if self.iteration.is_done() {
                break Ok(());
            }
            if handler.stop() {
                info!("Stopped before {}", self.iteration);
                break Ok(());
            }
            if let Err(err) = self.step() {
                break Err(err);
            }
            if let Some(status) = self.status.as_ref() {
                handler.step_completed(status);
            }
        };
        handler.finalize();
        res
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn iteration(&self) -> &Iteration {
        &self.iteration
    }

    pub fn seed(&self) -> u64 {
        self.ctx.seed()
    }

    /// Status of the latest iteration
    pub fn status(&self) -> Option<&StepStatus> {
        self.status.as_ref()
    }

    /// The current model of a training run, or the latest replayed model
    pub fn model(&self) -> Option<&LatentModel> {
        self.tasks
            .iter()
            .find_map(|task| match task {
                Task::Train(train) => Some(train.model().as_ref()),
                _ => None,
            })
            .or(self.last_model.as_deref())
    }

    pub fn predictions(&self) -> Option<&PredictionAccumulator> {
        self.tasks.iter().find_map(|task| match task {
            Task::Predict(predict) => predict.predictions(),
            _ => None,
        })
    }

    /// RMSE of the averaged predictions of the held-out entries
    pub fn rmse_avg(&self) -> Option<f64> {
        self.predictions().map(|pred| pred.state().rmse_avg)
    }

    pub fn root_file(&self) -> Option<&RootFile> {
        self.root.as_ref()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Human readable summary of every stage
    pub fn describe(&self) -> String {
        let mut lines = vec![format!(
            "session (seed {}) at {}",
            self.ctx.seed(),
            self.iteration
        )];
        lines.extend(self.tasks.iter().map(|task| task.describe()));
        lines.join("\n")
    }
}
