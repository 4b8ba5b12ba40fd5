use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::utils::{deserialize_file, path_validator, serialize_obj};
use crate::{Error, Registry, SerializedType, StepFile, StepName};

const ROOT_SUFFIX: &str = "-root.yaml";
const OPTIONS: &str = "options";
const SERIALIZED_TYPE: &str = "serialized_type";
const SAMPLE_STEP: &str = "sample_step_";
const CHECKPOINT_STEP: &str = "checkpoint_step_";

fn parse_step_key(key: &str) -> Option<StepName> {
    if let Some(ix) = key.strip_prefix(SAMPLE_STEP) {
        ix.parse().ok().map(StepName::sample)
    } else if let Some(ix) = key.strip_prefix(CHECKPOINT_STEP) {
        ix.parse().ok().map(StepName::checkpoint)
    } else {
        None
    }
}

/// Registry of a run: where its options live and which step files exist.
#[derive(Debug)]
pub struct RootFile {
    dir: PathBuf,
    prefix: String,
    serialized_type: SerializedType,
    registry: Registry,
}

impl RootFile {
    /// Path of the root file of `prefix` in `dir`
    pub fn path_in<P: AsRef<Path>>(dir: P, prefix: &str) -> PathBuf {
        dir.as_ref().join(format!("{prefix}{ROOT_SUFFIX}"))
    }

    /// Create the root file of a new run, creating `dir` if needed
    pub fn create<P: AsRef<Path>>(
        dir: P,
        prefix: &str,
        serialized_type: SerializedType,
    ) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        path_validator(&dir)?;
        let mut registry = Registry::create(Self::path_in(&dir, prefix))?;
        registry.append(SERIALIZED_TYPE, serialized_type)?;
        info!("Created {}", registry.path().display());
        Ok(Self {
            dir,
            prefix: String::from(prefix),
            serialized_type,
            registry,
        })
    }

    /// Open the root file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let invalid = || Error::RootFileNameInvalid(path.display().to_string());
        let prefix = path
            .file_name()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_suffix(ROOT_SUFFIX))
            .filter(|s| !s.is_empty())
            .ok_or_else(invalid)?;
        let dir = path
            .parent()
            .map_or_else(PathBuf::new, |p| p.to_path_buf());
        let registry = Registry::open(path)?;
        let serialized_type = match registry.get(SERIALIZED_TYPE) {
            Some(st) => st.parse()?,
            None => SerializedType::default(),
        };
        Ok(Self {
            dir,
            prefix: String::from(prefix),
            serialized_type,
            registry,
        })
    }

    pub fn path(&self) -> &Path {
        self.registry.path()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn serialized_type(&self) -> SerializedType {
        self.serialized_type
    }

    /// Write the run options and register them
    pub fn save_options<T: Serialize>(
        &mut self,
        options: &T,
    ) -> Result<(), Error> {
        let name = format!("{}-options.yaml", self.prefix);
        serialize_obj(options, self.dir.join(&name))?;
        self.registry.append(OPTIONS, name)
    }

    pub fn restore_options<T>(&self) -> Result<T, Error>
    where
        for<'de> T: Deserialize<'de>,
    {
        let path = self.dir.join(self.registry.require(OPTIONS)?);
        if !path.exists() {
            return Err(Error::MissingArtifact {
                key: String::from(OPTIONS),
                path,
            });
        }
        deserialize_file(path)
    }

    /// Every registered step, in registration order
    pub fn step_names(&self) -> Vec<StepName> {
        self.registry.keys().filter_map(parse_step_key).collect()
    }

    /// Create and register a new step file. A leftover file of the same
    /// name that was never registered is removed first.
    pub fn create_step_file(
        &mut self,
        name: StepName,
    ) -> Result<StepFile, Error> {
        let file_name = name.file_name(&self.prefix);
        let path = self.dir.join(&file_name);
        if path.exists() && !self.registry.contains(&name.root_key()) {
            warn!("Removing unregistered step file {}", path.display());
            match StepFile::open(&path, self.serialized_type)
                .and_then(|step| step.remove(true, true, true))
            {
                Ok(()) | Err(Error::StrayEntries(_)) => (),
                Err(err) => return Err(err),
            }
        }

        let step = StepFile::create(
            &self.dir,
            &self.prefix,
            name,
            self.serialized_type,
        )?;
        self.registry.append(&name.root_key(), file_name)?;
        Ok(step)
    }

    pub fn open_step_file(&self, name: StepName) -> Result<StepFile, Error> {
        let key = name.root_key();
        let path = self.dir.join(self.registry.require(&key)?);
        if !path.exists() {
            return Err(Error::MissingArtifact { key, path });
        }
        StepFile::open(path, self.serialized_type)
    }

    /// The step with the highest sample index, preferring a checkpoint over
    /// a sample of the same index
    pub fn open_last_step_file(&self) -> Result<Option<StepFile>, Error> {
        self.step_names()
            .into_iter()
            .max()
            .map(|name| self.open_step_file(name))
            .transpose()
    }

    fn step_files(&self, checkpoint: bool) -> Result<Vec<StepFile>, Error> {
        let mut names: Vec<StepName> = self
            .step_names()
            .into_iter()
            .filter(|name| name.checkpoint == checkpoint)
            .collect();
        names.sort();
        names
            .into_iter()
            .map(|name| self.open_step_file(name))
            .collect()
    }

    /// Sample snapshots in increasing index
    pub fn sample_step_files(&self) -> Result<Vec<StepFile>, Error> {
        self.step_files(false)
    }

    /// Checkpoint snapshots in increasing index
    pub fn checkpoint_step_files(&self) -> Result<Vec<StepFile>, Error> {
        self.step_files(true)
    }

    /// Delete a step file with all of its artifacts and unregister it
    pub fn remove_step_file(&mut self, step: StepFile) -> Result<(), Error> {
        self.registry.remove(&step.name().root_key());
        self.registry.flush()?;
        step.remove(true, true, true)
    }
}
