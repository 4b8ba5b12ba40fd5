use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use bmf::data::{DataConfig, NoiseConfig, SparseConfig};
use bmf::update_handler::StepHandler;
use bmf::{
    Config, RootFile, SaveConfig, SerializedType, Session, SessionState,
    StepName, StepStatus,
};

/// A 12 x 8 matrix of rank one with every fourth entry held out
fn config(seed: u64) -> Config {
    config_with_noise(seed, NoiseConfig::Fixed { precision: 50.0 })
}

fn config_with_noise(seed: u64, noise: NoiseConfig) -> Config {
    let u: Vec<f64> = (0..12).map(|i| (i as f64 * 0.7).sin() + 0.5).collect();
    let v: Vec<f64> = (0..8).map(|j| (j as f64 * 1.3).cos()).collect();
    let mut train = SparseConfig::new(vec![12, 8]).noise(noise);
    let mut test = SparseConfig::new(vec![12, 8]);
    for i in 0..12 {
        for j in 0..8 {
            if (i + 2 * j) % 4 == 0 {
                test = test.push(vec![i, j], u[i] * v[j]);
            } else {
                train = train.push(vec![i, j], u[i] * v[j]);
            }
        }
    }
    Config::new(DataConfig::Sparse(train))
        .num_latent(3)
        .burnin(5)
        .nsamples(10)
        .seed(seed)
        .test(test)
}

fn root_path(dir: &Path) -> PathBuf {
    RootFile::path_in(dir, "model")
}

fn saved_samples(dir: &Path) -> Vec<usize> {
    RootFile::open(root_path(dir))
        .unwrap()
        .sample_step_files()
        .unwrap()
        .iter()
        .map(|step| step.isample())
        .collect()
}

fn run_with_save_freq(save_freq: i32) -> Vec<usize> {
    let dir = tempfile::tempdir().unwrap();
    let save = SaveConfig::new(dir.path()).save_freq(save_freq);
    let mut session = Session::new(config(1).save(save)).unwrap();
    session.run().unwrap();
    saved_samples(dir.path())
}

#[test]
fn save_every_third_sample() {
    assert_eq!(run_with_save_freq(3), vec![3, 6, 9]);
}

#[test]
fn save_only_the_final_sample() {
    assert_eq!(run_with_save_freq(-1), vec![10]);
}

#[test]
fn save_nothing() {
    assert!(run_with_save_freq(0).is_empty());
}

#[test]
fn saved_step_files_follow_the_naming_scheme() {
    let dir = tempfile::tempdir().unwrap();
    let save = SaveConfig::new(dir.path())
        .save_freq(5)
        .serialized_type(SerializedType::Json);
    let mut session = Session::new(config(1).save(save)).unwrap();
    session.run().unwrap();

    for isample in [5, 10] {
        let name = StepName::sample(isample);
        let path = dir.path().join(name.file_name("model"));
        assert!(path.exists(), "missing {}", path.display());
        let stem = name.stem("model");
        for artifact in [
            format!("{stem}-U0-latents.json"),
            format!("{stem}-U1-latents.json"),
            format!("{stem}-model-meta.json"),
            format!("{stem}-F0-link.json"),
            format!("{stem}-F1-link.json"),
            format!("{stem}-predictions.csv"),
            format!("{stem}-predictions-state.yaml"),
            format!("{stem}-noise.json"),
        ] {
            assert!(dir.path().join(&artifact).exists(), "missing {artifact}");
        }
    }
}

#[derive(Clone)]
struct StopAfter(usize, usize);

impl StepHandler for StopAfter {
    fn step_completed(&mut self, _status: &StepStatus) {
        self.1 += 1;
    }

    fn stop(&self) -> bool {
        self.1 >= self.0
    }
}

/// Interrupt a run after sample 6, resume it from the checkpoint of sample
/// 4, and compare against the same run left alone
fn resume_matches_uninterrupted(noise: NoiseConfig, st: SerializedType) {
    let config = || config_with_noise(11, noise.clone());
    let save = |dir: &Path| {
        SaveConfig::new(dir)
            .checkpoint_freq(Some(4))
            .keep_checkpoints(1)
            .serialized_type(st)
    };

    let full_dir = tempfile::tempdir().unwrap();
    let mut full = Session::new(config().save(save(full_dir.path()))).unwrap();
    full.run().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let checkpointed = {
        let mut first = Session::new(config().save(save(dir.path()))).unwrap();
        first.run_with(StopAfter(11, 0)).unwrap();
        assert_eq!(first.iteration().index(), 11);
        let root = RootFile::open(root_path(dir.path())).unwrap();
        let step = root.open_last_step_file().unwrap().unwrap();
        assert_eq!(step.name(), StepName::checkpoint(4));
        step.restore_model().unwrap().unwrap()
    };

    let mut resumed = Session::from_root(root_path(dir.path())).unwrap();
    resumed.init().unwrap();
    assert_eq!(resumed.iteration().index(), 9);
    assert_eq!(resumed.iteration().isample(), Some(5));
    assert_eq!(resumed.model().unwrap().factors(), checkpointed.factors());
    assert_eq!(resumed.predictions().unwrap().nsamples(), 4);

    resumed.run().unwrap();
    assert_eq!(resumed.state(), SessionState::Done);
    assert_eq!(resumed.model(), full.model(), "{st:?}");
    assert_eq!(
        resumed.status().unwrap().noise,
        full.status().unwrap().noise
    );
    assert_relative_eq!(
        resumed.rmse_avg().unwrap(),
        full.rmse_avg().unwrap(),
        max_relative = 1e-9
    );

    // only the newest checkpoint survives
    let root = RootFile::open(root_path(dir.path())).unwrap();
    let checkpoints: Vec<usize> = root
        .checkpoint_step_files()
        .unwrap()
        .iter()
        .map(|step| step.isample())
        .collect();
    assert_eq!(checkpoints, vec![8]);
}

#[test]
fn resumed_run_matches_uninterrupted_run() {
    resume_matches_uninterrupted(
        NoiseConfig::Fixed { precision: 50.0 },
        SerializedType::Bincode,
    );
}

#[test]
fn resumed_run_restores_adaptive_noise() {
    resume_matches_uninterrupted(
        NoiseConfig::adaptive(),
        SerializedType::Bincode,
    );
}

#[test]
fn resumed_json_run_matches_uninterrupted_run() {
    resume_matches_uninterrupted(NoiseConfig::adaptive(), SerializedType::Json);
}

#[test]
fn resumed_yaml_run_matches_uninterrupted_run() {
    resume_matches_uninterrupted(
        NoiseConfig::Fixed { precision: 50.0 },
        SerializedType::Yaml,
    );
}

#[test]
fn resuming_a_finished_run_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let save = SaveConfig::new(dir.path())
        .save_freq(-1)
        .serialized_type(SerializedType::Bincode);
    let mut session = Session::new(config(2).save(save)).unwrap();
    session.run().unwrap();

    let mut resumed = Session::from_root(root_path(dir.path())).unwrap();
    resumed.init().unwrap();
    assert_eq!(resumed.state(), SessionState::Done);
    assert!(!resumed.step().unwrap());
    assert_eq!(resumed.model(), session.model());
}

#[test]
fn removing_every_step_leaves_only_the_root() {
    let dir = tempfile::tempdir().unwrap();
    let save = SaveConfig::new(dir.path())
        .save_freq(1)
        .checkpoint_freq(Some(5))
        .keep_checkpoints(2);
    let mut session = Session::new(config(3).save(save)).unwrap();
    session.run().unwrap();

    let mut root = RootFile::open(root_path(dir.path())).unwrap();
    assert_eq!(root.sample_step_files().unwrap().len(), 10);
    assert_eq!(root.checkpoint_step_files().unwrap().len(), 2);

    let steps: Vec<_> = root
        .sample_step_files()
        .unwrap()
        .into_iter()
        .chain(root.checkpoint_step_files().unwrap())
        .collect();
    for step in steps {
        root.remove_step_file(step).unwrap();
    }

    let root = RootFile::open(root_path(dir.path())).unwrap();
    assert!(root.step_names().is_empty());
    let mut files: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files, vec!["model-options.yaml", "model-root.yaml"]);
}

#[test]
fn replaying_saved_samples_reproduces_the_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let save = SaveConfig::new(dir.path())
        .save_freq(1)
        .serialized_type(SerializedType::Bincode);
    let config = config(4).burnin(0);
    let mut session = Session::new(config.save(save)).unwrap();
    session.run().unwrap();

    let mut replay = Session::predict_from_root(root_path(dir.path())).unwrap();
    replay.run().unwrap();
    assert_eq!(replay.iteration().index(), 10);

    let trained = session.predictions().unwrap();
    let replayed = replay.predictions().unwrap();
    assert_eq!(replayed.nsamples(), 10);
    for (a, b) in trained.items().iter().zip(replayed.items().iter()) {
        assert_eq!(a.coords, b.coords);
        assert_relative_eq!(a.pred_avg, b.pred_avg, epsilon = 1e-12);
    }
    assert_relative_eq!(
        replay.rmse_avg().unwrap(),
        session.rmse_avg().unwrap(),
        epsilon = 1e-12
    );

    // nothing new was written
    assert_eq!(saved_samples(dir.path()).len(), 10);
}

#[test]
fn replay_without_samples_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let save = SaveConfig::new(dir.path());
    let mut session = Session::new(config(5).save(save)).unwrap();
    session.run().unwrap();

    assert!(matches!(
        Session::predict_from_root(root_path(dir.path())),
        Err(bmf::SessionError::NoSnapshots)
    ));
}
