use std::path::{Path, PathBuf};
use std::sync::Arc;

use bmf_cc::{
    LatentModel, LatentPrior, MacauLink, ModelMeta, PredictionAccumulator,
    PredictionState, Prior, PriorError, PriorKind, ResultItem,
};
use bmf_data::NoiseModel;
use bmf_stats::NormalHyper;
use bmf_utils::Matrix;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::predictions::{read_predictions, write_predictions};
use crate::utils::{load, remove_file, save};
use crate::{Error, Registry, SerializedType};

const STEP_SUFFIX: &str = "-step.yaml";
const SAMPLE_MARKER: &str = "-sample-";
const CHECKPOINT_MARKER: &str = "-checkpoint-";

const NUM_MODELS: &str = "num_models";
const MODEL_META: &str = "model_meta";
const NUM_PRIORS: &str = "num_priors";
const PRED: &str = "pred";
const PRED_STATE: &str = "pred_state";
const NOISE: &str = "noise";

fn model_key(mode: usize) -> String {
    format!("model_{mode}")
}

fn prior_key(ix: usize) -> String {
    format!("prior_{ix}")
}

/// Identity of a snapshot: its 1-based sample index and whether it is a
/// checkpoint. Orders by index, then checkpoints after samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepName {
    pub isample: usize,
    pub checkpoint: bool,
}

impl StepName {
    pub fn sample(isample: usize) -> Self {
        Self {
            isample,
            checkpoint: false,
        }
    }

    pub fn checkpoint(isample: usize) -> Self {
        Self {
            isample,
            checkpoint: true,
        }
    }

    fn marker(&self) -> &'static str {
        if self.checkpoint {
            CHECKPOINT_MARKER
        } else {
            SAMPLE_MARKER
        }
    }

    /// `<prefix>-sample-<i>` or `<prefix>-checkpoint-<i>`
    pub fn stem(&self, prefix: &str) -> String {
        format!("{prefix}{}{}", self.marker(), self.isample)
    }

    pub fn file_name(&self, prefix: &str) -> String {
        format!("{}{STEP_SUFFIX}", self.stem(prefix))
    }

    /// Key of this step in the root file
    pub fn root_key(&self) -> String {
        if self.checkpoint {
            format!("checkpoint_step_{}", self.isample)
        } else {
            format!("sample_step_{}", self.isample)
        }
    }

    /// Recover the prefix and step from a step file name
    ///
    /// # Example
    ///
    /// ```rust
    /// # use bmf_metadata::StepName;
    /// let (prefix, name) = StepName::parse("run-checkpoint-12-step.yaml").unwrap();
    /// assert_eq!(prefix, "run");
    /// assert_eq!(name, StepName::checkpoint(12));
    /// ```
    pub fn parse(file_name: &str) -> Result<(String, Self), Error> {
        let invalid = || Error::StepFileNameInvalid(String::from(file_name));
        let stem = file_name.strip_suffix(STEP_SUFFIX).ok_or_else(invalid)?;

        let found = [(CHECKPOINT_MARKER, true), (SAMPLE_MARKER, false)]
            .iter()
            .filter_map(|&(marker, checkpoint)| {
                stem.rfind(marker).map(|ix| (ix, marker, checkpoint))
            })
            .max_by_key(|&(ix, _, _)| ix);

        let (ix, marker, checkpoint) = found.ok_or_else(invalid)?;
        let prefix = &stem[..ix];
        let digits = &stem[ix + marker.len()..];
        if prefix.is_empty()
            || digits.is_empty()
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let isample = digits.parse::<usize>().map_err(|_| invalid())?;
        Ok((
            String::from(prefix),
            Self {
                isample,
                checkpoint,
            },
        ))
    }
}

/// Saved hyperparameters of one prior, with the side-feature link of a
/// macau prior
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriorLink {
    pub mode: usize,
    pub kind: PriorKind,
    pub hyper: NormalHyper,
    pub link: Option<MacauLink>,
}

impl From<&LatentPrior> for PriorLink {
    fn from(prior: &LatentPrior) -> Self {
        Self {
            mode: prior.mode(),
            kind: prior.kind(),
            hyper: prior.hyper().clone(),
            link: prior.link(),
        }
    }
}

impl PriorLink {
    /// Load these hyperparameters into `prior`, the `index`th prior of the
    /// run
    pub fn apply(
        self,
        index: usize,
        prior: &mut LatentPrior,
    ) -> Result<(), Error> {
        if self.mode != prior.mode() || self.kind != prior.kind() {
            return Err(Error::PriorMismatch {
                index,
                expected: prior.kind().to_string(),
                expected_mode: prior.mode(),
                found: self.kind.to_string(),
                found_mode: self.mode,
            });
        }
        prior.set_hyper(self.hyper)?;
        match self.link {
            Some(link) => prior.set_link(link)?,
            None if prior.link().is_some() => {
                return Err(PriorError::MissingLink(self.mode).into())
            }
            None => (),
        }
        Ok(())
    }
}

/// Everything the pipeline stages contribute to one snapshot
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub model: Option<Arc<LatentModel>>,
    pub predictions: Option<PredictionAccumulator>,
    pub priors: Vec<LatentPrior>,
    /// Noise state of each data block
    pub noise: Vec<NoiseModel>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Registry of the artifacts of one snapshot
#[derive(Debug)]
pub struct StepFile {
    dir: PathBuf,
    prefix: String,
    name: StepName,
    serialized_type: SerializedType,
    registry: Registry,
}

impl StepFile {
    /// Create a new, empty step file in `dir`
    pub fn create<P: AsRef<Path>>(
        dir: P,
        prefix: &str,
        name: StepName,
        serialized_type: SerializedType,
    ) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        let registry = Registry::create(dir.join(name.file_name(prefix)))?;
        Ok(Self {
            dir,
            prefix: String::from(prefix),
            name,
            serialized_type,
            registry,
        })
    }

    /// Open an existing step file
    pub fn open<P: AsRef<Path>>(
        path: P,
        serialized_type: SerializedType,
    ) -> Result<Self, Error> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                Error::StepFileNameInvalid(path.display().to_string())
            })?;
        let (prefix, name) = StepName::parse(file_name)?;
        let dir = path
            .parent()
            .map_or_else(PathBuf::new, |p| p.to_path_buf());
        let registry = Registry::open(path)?;
        Ok(Self {
            dir,
            prefix,
            name,
            serialized_type,
            registry,
        })
    }

    #[inline]
    pub fn name(&self) -> StepName {
        self.name
    }

    #[inline]
    pub fn isample(&self) -> usize {
        self.name.isample
    }

    #[inline]
    pub fn is_checkpoint(&self) -> bool {
        self.name.checkpoint
    }

    pub fn path(&self) -> &Path {
        self.registry.path()
    }

    pub fn file_name(&self) -> String {
        self.name.file_name(&self.prefix)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn artifact_name(&self, what: &str, ext: &str) -> String {
        format!("{}-{what}.{ext}", self.name.stem(&self.prefix))
    }

    /// Path of the artifact registered under `key`
    fn artifact(&self, key: &str) -> Result<PathBuf, Error> {
        let path = self.dir.join(self.registry.require(key)?);
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::MissingArtifact {
                key: String::from(key),
                path,
            })
        }
    }

    /// Write the snapshot: model, predictions, priors, then noise
    pub fn save(&mut self, snapshot: &Snapshot) -> Result<(), Error> {
        if let Some(model) = snapshot.model.as_ref() {
            self.save_model(model)?;
        }
        if let Some(pred) = snapshot.predictions.as_ref() {
            self.save_predictions(pred)?;
        }
        if !snapshot.priors.is_empty() {
            self.save_priors(&snapshot.priors)?;
        }
        if !snapshot.noise.is_empty() {
            let ext = self.serialized_type.extension();
            let name = self.artifact_name("noise", ext);
            save(&snapshot.noise, self.dir.join(&name), self.serialized_type)?;
            self.registry.append(NOISE, name)?;
        }
        debug!("Saved {}", self.path().display());
        Ok(())
    }

    fn save_model(&mut self, model: &LatentModel) -> Result<(), Error> {
        let ext = self.serialized_type.extension();
        let names = model
            .factors()
            .iter()
            .enumerate()
            .map(|(mode, u)| {
                let name = self.artifact_name(&format!("U{mode}-latents"), ext);
                save(u, self.dir.join(&name), self.serialized_type)?;
                Ok(name)
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let meta_name = self.artifact_name("model-meta", ext);
        save(&model.meta(), self.dir.join(&meta_name), self.serialized_type)?;

        self.registry.append(NUM_MODELS, names.len())?;
        for (mode, name) in names.iter().enumerate() {
            self.registry.append(&model_key(mode), name)?;
        }
        self.registry.append(MODEL_META, meta_name)
    }

    fn save_predictions(
        &mut self,
        pred: &PredictionAccumulator,
    ) -> Result<(), Error> {
        if pred.is_empty() {
            return Ok(());
        }
        let pred_name = self.artifact_name("predictions", "csv");
        write_predictions(
            self.dir.join(&pred_name),
            pred.items(),
            pred.nsamples(),
        )?;
        let state_name = self.artifact_name("predictions-state", "yaml");
        save(
            pred.state(),
            self.dir.join(&state_name),
            SerializedType::Yaml,
        )?;

        self.registry.append(PRED, pred_name)?;
        self.registry.append(PRED_STATE, state_name)
    }

    fn save_priors(&mut self, priors: &[LatentPrior]) -> Result<(), Error> {
        let ext = self.serialized_type.extension();
        let names = priors
            .iter()
            .map(|prior| {
                let name = self
                    .artifact_name(&format!("F{}-link", prior.mode()), ext);
                let link = PriorLink::from(prior);
                save(&link, self.dir.join(&name), self.serialized_type)?;
                Ok(name)
            })
            .collect::<Result<Vec<_>, Error>>()?;

        self.registry.append(NUM_PRIORS, names.len())?;
        for (ix, name) in names.iter().enumerate() {
            self.registry.append(&prior_key(ix), name)?;
        }
        Ok(())
    }

    /// The saved model, if this step holds one
    pub fn restore_model(&self) -> Result<Option<LatentModel>, Error> {
        if !self.registry.contains(NUM_MODELS) {
            return Ok(None);
        }
        let nmodels: usize = self.registry.parse(NUM_MODELS)?;
        let factors = (0..nmodels)
            .map(|mode| {
                let path = self.artifact(&model_key(mode))?;
                load::<Matrix<f64>, _>(path, self.serialized_type)
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let meta: ModelMeta =
            load(self.artifact(MODEL_META)?, self.serialized_type)?;
        Ok(Some(LatentModel::from_parts(factors, meta)?))
    }

    /// The saved prediction items and state, if this step holds them
    pub fn restore_predictions(
        &self,
    ) -> Result<Option<(Vec<ResultItem>, PredictionState)>, Error> {
        if !(self.registry.contains(PRED) && self.registry.contains(PRED_STATE))
        {
            return Ok(None);
        }
        let items = read_predictions(self.artifact(PRED)?)?;
        let state: PredictionState =
            load(self.artifact(PRED_STATE)?, SerializedType::Yaml)?;
        Ok(Some((items, state)))
    }

    /// The saved prior hyperparameters, if this step holds them
    pub fn restore_priors(&self) -> Result<Option<Vec<PriorLink>>, Error> {
        if !self.registry.contains(NUM_PRIORS) {
            return Ok(None);
        }
        let npriors: usize = self.registry.parse(NUM_PRIORS)?;
        (0..npriors)
            .map(|ix| load(self.artifact(&prior_key(ix))?, self.serialized_type))
            .collect::<Result<Vec<PriorLink>, Error>>()
            .map(Some)
    }

    /// The saved noise state of every data block, if this step holds it
    pub fn restore_noise(&self) -> Result<Option<Vec<NoiseModel>>, Error> {
        if !self.registry.contains(NOISE) {
            return Ok(None);
        }
        load(self.artifact(NOISE)?, self.serialized_type).map(Some)
    }

    fn remove_entry(&mut self, key: &str) -> Result<(), Error> {
        if let Some(name) = self.registry.remove(key) {
            remove_file(self.dir.join(name))?;
        }
        Ok(())
    }

    fn remove_counted(
        &mut self,
        count_key: &str,
        key: fn(usize) -> String,
    ) -> Result<(), Error> {
        if self.registry.contains(count_key) {
            let n: usize = self.registry.parse(count_key)?;
            for ix in 0..n {
                self.remove_entry(&key(ix))?;
            }
            self.registry.remove(count_key);
        }
        Ok(())
    }

    /// Delete the artifacts of the requested parts and their entries, then
    /// the step file itself. Noise state goes with the priors. The step file
    /// is deleted first; entries left behind are then reported as
    /// `StrayEntries`.
    pub fn remove(
        mut self,
        model: bool,
        pred: bool,
        priors: bool,
    ) -> Result<(), Error> {
        if model {
            self.remove_counted(NUM_MODELS, model_key)?;
            self.remove_entry(MODEL_META)?;
        }
        if pred {
            self.remove_entry(PRED)?;
            self.remove_entry(PRED_STATE)?;
        }
        if priors {
            self.remove_counted(NUM_PRIORS, prior_key)?;
            self.remove_entry(NOISE)?;
        }
        debug!("Removing {}", self.path().display());
        self.registry.delete()
    }
}
