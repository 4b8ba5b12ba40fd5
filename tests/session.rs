use std::sync::{Arc, Mutex};

use bmf::data::{BlockConfig, DataConfig, NoiseConfig, SparseConfig};
use bmf::update_handler::StepHandler;
use bmf::cc::SideInfoConfig;
use bmf::{
    Config, PriorKind, SaveConfig, Session, SessionError, SessionState,
    StepStatus,
};
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256Plus;

const NROWS: usize = 30;
const NCOLS: usize = 20;

fn is_test_entry(i: usize, j: usize) -> bool {
    (7 * i + 3 * j) % 5 == 0
}

/// Rank-two data with small noise. One fifth of the entries is held out.
fn low_rank(noise: NoiseConfig) -> (SparseConfig, SparseConfig) {
    let mut rng = Xoshiro256Plus::seed_from_u64(1337);
    let mut draw = |n: usize| -> Vec<[f64; 2]> {
        (0..n)
            .map(|_| {
                [
                    rng.sample::<f64, _>(StandardNormal),
                    rng.sample::<f64, _>(StandardNormal),
                ]
            })
            .collect()
    };
    let u = draw(NROWS);
    let v = draw(NCOLS);

    let mut train = SparseConfig::new(vec![NROWS, NCOLS]).noise(noise);
    let mut test = SparseConfig::new(vec![NROWS, NCOLS]);
    for i in 0..NROWS {
        for j in 0..NCOLS {
            let x = u[i][0] * v[j][0] + u[i][1] * v[j][1];
            if is_test_entry(i, j) {
                test = test.push(vec![i, j], x);
            } else {
                train = train.push(vec![i, j], x);
            }
        }
    }
    (train, test)
}

fn rms(values: &[f64]) -> f64 {
    (values.iter().map(|x| x * x).sum::<f64>() / values.len() as f64).sqrt()
}

fn config(seed: u64) -> Config {
    let (train, test) = low_rank(NoiseConfig::Fixed { precision: 100.0 });
    Config::new(DataConfig::Sparse(train))
        .num_latent(4)
        .burnin(20)
        .nsamples(20)
        .seed(seed)
        .test(test)
}

#[test]
fn session_predicts_held_out_entries() {
    let config = config(1);
    let baseline = rms(&config.test.as_ref().unwrap().values);

    let mut session = Session::new(config).unwrap();
    session.run().unwrap();

    assert_eq!(session.state(), SessionState::Done);
    assert_eq!(session.iteration().index(), 40);
    let pred = session.predictions().unwrap();
    assert_eq!(pred.nsamples(), 20);
    assert_eq!(pred.state().burnin_iter, 20);

    let rmse = session.rmse_avg().unwrap();
    assert!(rmse < 0.5 * baseline, "rmse {rmse} vs baseline {baseline}");
    assert!(session.model().unwrap().is_finite());
    assert_eq!(session.model().unwrap().nsamples(), 20);
}

#[test]
fn normal_one_prior_predicts_held_out_entries() {
    let config = config(2).priors(vec![PriorKind::NormalOne; 2]);
    let baseline = rms(&config.test.as_ref().unwrap().values);

    let mut session = Session::new(config).unwrap();
    session.run().unwrap();

    let rmse = session.rmse_avg().unwrap();
    assert!(rmse < 0.5 * baseline, "rmse {rmse} vs baseline {baseline}");
}

#[test]
fn fixed_seed_reproduces_the_chain() {
    let run = |seed: u64| {
        let mut session = Session::new(config(seed).burnin(3).nsamples(3))
            .unwrap();
        session.run().unwrap();
        (session.model().unwrap().clone(), session.rmse_avg().unwrap())
    };
    let (model_a, rmse_a) = run(5);
    let (model_b, rmse_b) = run(5);
    let (model_c, _) = run(6);

    assert_eq!(model_a, model_b);
    assert_eq!(rmse_a.to_bits(), rmse_b.to_bits());
    assert_ne!(model_a, model_c);
}

#[test]
fn chain_does_not_depend_on_thread_count() {
    let run = |num_threads: usize| {
        let config = config(9)
            .burnin(3)
            .nsamples(3)
            .num_threads(Some(num_threads));
        let mut session = Session::new(config).unwrap();
        session.run().unwrap();
        (session.model().unwrap().clone(), session.rmse_avg().unwrap())
    };
    let (model_1, rmse_1) = run(1);
    let (model_4, rmse_4) = run(4);

    assert_eq!(model_1, model_4);
    assert_eq!(rmse_1.to_bits(), rmse_4.to_bits());
}

#[test]
fn block_data_matches_the_same_entries_as_one_matrix() {
    // Splitting the columns over two blocks changes the data layout, not the
    // set of observations.
    let (train, test) = low_rank(NoiseConfig::Fixed { precision: 100.0 });
    let split = NCOLS / 2;
    let mut left = SparseConfig::new(vec![NROWS, split])
        .noise(NoiseConfig::Fixed { precision: 100.0 });
    let mut right = SparseConfig::new(vec![NROWS, NCOLS - split])
        .noise(NoiseConfig::Fixed { precision: 100.0 });
    for (coord, &x) in train.coords.iter().zip(train.values.iter()) {
        if coord[1] < split {
            left = left.push(coord.clone(), x);
        } else {
            right = right.push(vec![coord[0], coord[1] - split], x);
        }
    }
    let blocks = DataConfig::Blocks(vec![
        BlockConfig::new(vec![0, 0], left),
        BlockConfig::new(vec![0, 1], right),
    ]);
    let baseline = rms(&test.values);

    let config = Config::new(blocks)
        .num_latent(4)
        .burnin(20)
        .nsamples(20)
        .seed(3)
        .test(test);
    let mut session = Session::new(config).unwrap();
    session.run().unwrap();

    let model = session.model().unwrap();
    assert_eq!(model.dims().as_slice(), &[NROWS, NCOLS]);
    let rmse = session.rmse_avg().unwrap();
    assert!(rmse < 0.5 * baseline, "rmse {rmse} vs baseline {baseline}");
}

/// Precision of the single data block after every iteration
#[derive(Clone, Default)]
struct NoiseTrace(Arc<Mutex<Vec<f64>>>);

impl StepHandler for NoiseTrace {
    fn step_completed(&mut self, status: &StepStatus) {
        self.0.lock().unwrap().push(status.noise[0]);
    }
}

const NOISE_SD: f64 = 0.3;

/// Run adaptive noise from `sn_init` on the low rank data plus Gaussian
/// noise of sd `NOISE_SD`; returns the per-iteration precision and the
/// variance of the training values
fn adaptive_noise_trace(sn_init: f64) -> (Vec<f64>, f64) {
    let noise = NoiseConfig::Adaptive {
        sn_init,
        sn_max: 200.0,
        sn_min: 1e-3,
    };
    let (mut train, test) = low_rank(noise);
    let mut rng = Xoshiro256Plus::seed_from_u64(7);
    train
        .values
        .iter_mut()
        .for_each(|x| *x += NOISE_SD * rng.sample::<f64, _>(StandardNormal));
    let n = train.values.len() as f64;
    let mean = train.values.iter().sum::<f64>() / n;
    let var = train.values.iter().map(|x| x * x).sum::<f64>() / n - mean * mean;

    let config = Config::new(DataConfig::Sparse(train))
        .num_latent(4)
        .burnin(60)
        .nsamples(20)
        .seed(4)
        .test(test);
    let mut session = Session::new(config).unwrap();
    let trace = NoiseTrace::default();
    session.run_with(trace.clone()).unwrap();
    let trace = trace.0.lock().unwrap().clone();
    (trace, var)
}

fn mean_and_sd(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[test]
fn adaptive_noise_stabilizes_from_either_side() {
    const TAIL: usize = 20;
    let truth = NOISE_SD.powi(2).recip();

    let (over, var) = adaptive_noise_trace(150.0);
    let (under, _) = adaptive_noise_trace(0.05);
    assert_eq!(over.len(), 80);
    assert_eq!(under.len(), 80);
    // the chains start two orders of magnitude from each other
    assert!(150.0 / var > 2.0 * truth);
    assert!(0.05 / var < 0.5 * truth);

    let (over_mean, over_sd) = mean_and_sd(&over[over.len() - TAIL..]);
    let (under_mean, under_sd) = mean_and_sd(&under[under.len() - TAIL..]);
    for (mean, sd) in [(over_mean, over_sd), (under_mean, under_sd)] {
        assert!(sd < 0.2 * mean, "precision still moving: {mean} +- {sd}");
        assert!(
            mean > 0.5 * truth && mean < 3.0 * truth,
            "precision {mean} far from {truth}"
        );
    }
    let ratio = over_mean / under_mean;
    assert!(
        (0.75..1.333).contains(&ratio),
        "chains settled apart: {over_mean} vs {under_mean}"
    );
}

#[test]
fn probit_session_separates_the_classes() {
    let (train, test) = low_rank(NoiseConfig::Fixed { precision: 1.0 });
    let binarize = |sparse: SparseConfig| {
        let values = sparse
            .values
            .iter()
            .map(|&x| if x > 0.0 { 1.0 } else { 0.0 })
            .collect();
        SparseConfig { values, ..sparse }
    };
    let train = binarize(train).noise(NoiseConfig::Probit);
    let test = binarize(test);

    let config = Config::new(DataConfig::Sparse(train))
        .num_latent(4)
        .burnin(40)
        .nsamples(40)
        .seed(12)
        .threshold(Some(0.5))
        .test(test);
    let mut session = Session::new(config).unwrap();
    session.run().unwrap();

    let status = session.status().unwrap();
    assert_eq!(status.noise, vec![1.0]);
    assert!(status.auc_avg > 0.75, "auc {}", status.auc_avg);
    assert!(session.model().unwrap().is_finite());
}

#[test]
fn probit_session_rejects_centering() {
    let train = SparseConfig::new(vec![2, 2])
        .push(vec![0, 1], 1.0)
        .push(vec![1, 0], 0.0)
        .noise(NoiseConfig::Probit);
    let config = Config::new(DataConfig::Sparse(train))
        .center_mode(bmf::data::CenterMode::Global);
    assert!(matches!(
        Session::new(config),
        Err(SessionError::Config(_))
    ));
}

#[test]
fn macau_prior_uses_side_features() {
    let (train, test) = low_rank(NoiseConfig::Fixed { precision: 100.0 });
    // rows of mode 0 carry their true factor plus a constant
    let mut rng = Xoshiro256Plus::seed_from_u64(1337);
    let features: Vec<Vec<f64>> = (0..NROWS)
        .map(|_| {
            let a = rng.sample::<f64, _>(StandardNormal);
            let b = rng.sample::<f64, _>(StandardNormal);
            vec![a, b, 1.0]
        })
        .collect();
    let baseline = rms(&test.values);

    let config = Config::new(DataConfig::Sparse(train))
        .num_latent(4)
        .burnin(20)
        .nsamples(20)
        .seed(3)
        .priors(vec![PriorKind::Macau, PriorKind::Normal])
        .side_info(SideInfoConfig::new(0, features))
        .test(test);
    let mut session = Session::new(config).unwrap();
    session.run().unwrap();

    let rmse = session.rmse_avg().unwrap();
    assert!(rmse < 0.5 * baseline, "rmse {rmse} vs baseline {baseline}");
    assert!(session.describe().contains("macau prior on mode 0"));
}

#[test]
fn step_before_init_fails() {
    let mut session = Session::new(config(1)).unwrap();
    assert!(matches!(session.step(), Err(SessionError::NotInitialized)));
    session.init().unwrap();
    assert_eq!(session.state(), SessionState::Initialized);
    assert!(session.step().unwrap());
    assert!(matches!(
        session.init(),
        Err(SessionError::AlreadyInitialized)
    ));
}

#[test]
fn failed_session_is_poisoned() {
    let dir = tempfile::tempdir().unwrap();
    let save = SaveConfig::new(dir.path()).save_freq(1);

    let mut first = Session::new(config(1).save(save.clone())).unwrap();
    first.init().unwrap();

    // the root file of the first session is in the way
    let mut second = Session::new(config(1).save(save)).unwrap();
    assert!(matches!(second.init(), Err(SessionError::Metadata(_))));
    assert_eq!(second.state(), SessionState::Failed);
    assert!(matches!(second.step(), Err(SessionError::Poisoned)));
    assert!(matches!(second.run(), Err(SessionError::Poisoned)));
}

#[test]
fn invalid_config_is_rejected() {
    assert!(matches!(
        Session::new(config(1).num_latent(0)),
        Err(SessionError::Config(_))
    ));
}

#[derive(Clone, Default)]
struct StatusLog(Arc<Mutex<Vec<(String, usize)>>>);

impl StepHandler for StatusLog {
    fn step_completed(&mut self, status: &StepStatus) {
        self.0
            .lock()
            .unwrap()
            .push((status.phase.to_string(), status.iter));
    }

    fn stop(&self) -> bool {
        self.0.lock().unwrap().len() >= 4
    }
}

#[test]
fn handler_sees_every_iteration_and_can_stop() {
    let mut session = Session::new(config(1).burnin(2).nsamples(5)).unwrap();
    let log = StatusLog::default();
    session.run_with(log.clone()).unwrap();

    assert_eq!(session.iteration().index(), 4);
    assert_ne!(session.state(), SessionState::Done);
    assert_eq!(
        *log.0.lock().unwrap(),
        vec![
            (String::from("Burnin"), 1),
            (String::from("Burnin"), 2),
            (String::from("Sample"), 1),
            (String::from("Sample"), 2),
        ]
    );

    session.run().unwrap();
    assert_eq!(session.state(), SessionState::Done);
    assert_eq!(session.iteration().index(), 7);
}

#[test]
fn csv_status_log_has_one_row_per_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("status.csv");
    let mut session = Session::new(
        config(1).burnin(2).nsamples(3).verbose(2).csv_status(&path),
    )
    .unwrap();
    session.run().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], StepStatus::csv_header(2));
    assert!(lines[1].starts_with("Burnin;1;2;"));
    assert!(lines[5].starts_with("Sample;3;3;"));

    let status = session.status().unwrap();
    assert!(status.train_rmse.is_finite());
    assert_eq!(status.stage_elapsed.len(), 2);
    assert_eq!(status.stage_elapsed[0].0, "train");
    assert_eq!(status.stage_elapsed[1].0, "predict");
}
