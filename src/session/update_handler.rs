use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[cfg(feature = "ctrlc_handler")]
use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;

use super::{Iteration, StepStatus};
use crate::Config;

/// Custom inspector for `Session::run_with`.
///
/// This trait can be used to implement progress capture and early stopping.
/// Stop requests are honored between iterations, after the snapshot of the
/// finished iteration has been written.
///
/// # Example
///
/// Count the iterations that ran.
///
/// ```
/// use bmf::update_handler::StepHandler;
/// use bmf::StepStatus;
///
/// #[derive(Clone, Default)]
/// struct Counter(usize);
///
/// impl StepHandler for Counter {
///     fn step_completed(&mut self, _status: &StepStatus) {
///         self.0 += 1;
///     }
/// }
/// ```
pub trait StepHandler: Clone + Send + Sync {
    /// Called once, after the session has been initialized and before the
    /// first iteration. `iteration` is where the chain starts, which is not
    /// zero when resuming.
    fn init(&mut self, _config: &Config, _iteration: &Iteration) {}

    /// Called after every iteration
    fn step_completed(&mut self, _status: &StepStatus) {}

    /// Should the session stop before the next iteration
    fn stop(&self) -> bool {
        false
    }

    /// Called when the run ends, whether it completed or was stopped
    fn finalize(&mut self) {}
}

macro_rules! impl_tuple {
($($idx:tt $t:tt),+) => {
    impl<$($t,)+> StepHandler for ($($t,)+)
    where
        $($t: StepHandler,)+
    {
        fn init(&mut self, config: &Config, iteration: &Iteration) {
            $(
                self.$idx.init(config, iteration);
            )+
        }

        fn step_completed(&mut self, status: &StepStatus) {
            $(
                self.$idx.step_completed(status);
            )+
        }

        fn stop(&self) -> bool {
            $(
                self.$idx.stop()
            )||+
        }

        fn finalize(&mut self) {
            $(
                self.$idx.finalize();
            )+
        }
    }
};
}

impl_tuple!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_tuple!(0 A, 1 B, 2 C, 3 D, 4 E);
impl_tuple!(0 A, 1 B, 2 C, 3 D);
impl_tuple!(0 A, 1 B, 2 C);
impl_tuple!(0 A, 1 B);
impl_tuple!(0 A);

impl<T> StepHandler for Vec<T>
where
    T: StepHandler,
{
    fn init(&mut self, config: &Config, iteration: &Iteration) {
        self.iter_mut()
            .for_each(|handler| handler.init(config, iteration));
    }

    fn step_completed(&mut self, status: &StepStatus) {
        self.iter_mut()
            .for_each(|handler| handler.step_completed(status));
    }

    fn stop(&self) -> bool {
        self.iter().any(|handler| handler.stop())
    }

    fn finalize(&mut self) {
        self.iter_mut().for_each(|handler| handler.finalize());
    }
}

impl<T> StepHandler for Option<T>
where
    T: StepHandler,
{
    fn init(&mut self, config: &Config, iteration: &Iteration) {
        if let Some(handler) = self {
            handler.init(config, iteration);
        }
    }

    fn step_completed(&mut self, status: &StepStatus) {
        if let Some(handler) = self {
            handler.step_completed(status);
        }
    }

    fn stop(&self) -> bool {
        self.as_ref().map_or(false, |handler| handler.stop())
    }

    fn finalize(&mut self) {
        if let Some(handler) = self {
            handler.finalize();
        }
    }
}

impl StepHandler for () {}

/// Handle Ctrl-C (sigint) signals by stopping the session.
#[cfg(feature = "ctrlc_handler")]
#[derive(Clone)]
pub struct CtrlC {
    seen_sigint: Arc<AtomicBool>,
}

#[cfg(feature = "ctrlc_handler")]
impl Default for CtrlC {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "ctrlc_handler")]
impl CtrlC {
    /// Create a new `CtrlC` handler. If the signal handler cannot be
    /// installed the session simply never stops on sigint.
    pub fn new() -> Self {
        let seen_sigint = Arc::new(AtomicBool::new(false));
        let r = seen_sigint.clone();

        if let Err(err) = ctrlc::set_handler(move || {
            r.store(true, Ordering::Relaxed);
        }) {
            warn!("Could not set Ctrl-C handler: {err}");
        }

        Self { seen_sigint }
    }
}

#[cfg(feature = "ctrlc_handler")]
impl StepHandler for CtrlC {
    fn stop(&self) -> bool {
        self.seen_sigint.load(Ordering::Relaxed)
    }
}

/// Stops the session once a wall time limit has passed
#[derive(Clone, Debug)]
pub enum Timeout {
    UnInitialized { timeout: Duration },
    Initialized { start: Instant, timeout: Duration },
}

impl Timeout {
    pub fn new(timeout: Duration) -> Self {
        Self::UnInitialized { timeout }
    }
}

impl StepHandler for Timeout {
    fn init(&mut self, _config: &Config, _iteration: &Iteration) {
        if let Self::UnInitialized { timeout } = self {
            *self = Self::Initialized {
                start: Instant::now(),
                timeout: *timeout,
            };
        };
    }

    fn stop(&self) -> bool {
        match self {
            Self::Initialized { start, timeout } => start.elapsed() > *timeout,
            Self::UnInitialized { .. } => false,
        }
    }
}

/// Add a progress bar to the output
#[derive(Clone, Default)]
pub enum ProgressBar {
    #[default]
    UnInitialized,
    Initialized {
        sender: Arc<Mutex<Sender<f64>>>,
        handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    },
}

impl ProgressBar {
    pub fn new() -> Self {
        Self::UnInitialized
    }
}

impl StepHandler for ProgressBar {
    fn init(&mut self, _config: &Config, iteration: &Iteration) {
        const UPDATE_INTERVAL: Duration = Duration::from_millis(250);

        let (sender, receiver) = std::sync::mpsc::channel::<f64>();
        let start_iter = iteration.index() as u64;
        let total_iters = iteration.total() as u64;

        let handle = std::thread::spawn(move || {
            use indicatif::ProgressStyle;

            let progress_bar = indicatif::ProgressBar::new(total_iters);
            match ProgressStyle::default_bar().template(
                "RMSE {msg} {wide_bar:.white/white} │{pos}/{len}, Elapsed {elapsed_precise} ETA {eta_precise}│",
            ) {
                Ok(style) => progress_bar.set_style(style.progress_chars("━╾ ")),
                Err(err) => warn!("Invalid progress bar template: {err}"),
            }
            progress_bar.set_position(start_iter);
            let mut last_update = Instant::now();
            let mut completed_iters = start_iter;

            while let Ok(rmse) = receiver.recv() {
                completed_iters += 1;
                if last_update.elapsed() > UPDATE_INTERVAL {
                    last_update = Instant::now();
                    progress_bar.set_position(completed_iters);
                    progress_bar.set_message(format!("{rmse:.4}"));
                }
            }

            progress_bar.finish_and_clear();
        });

        *self = Self::Initialized {
            sender: Arc::new(Mutex::new(sender)),
            handle: Arc::new(Mutex::new(Some(handle))),
        }
    }

    fn step_completed(&mut self, status: &StepStatus) {
        if let Self::Initialized { sender, .. } = self {
            if let Ok(sender) = sender.lock() {
                // the bar thread only goes away after finalize
                let _ = sender.send(status.rmse_avg);
            }
        }
    }

    fn finalize(&mut self) {
        if let Self::Initialized { sender, handle } = std::mem::take(self) {
            std::mem::drop(sender);

            let handle = handle.lock().ok().and_then(|mut h| h.take());
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    warn!("Progress bar thread panicked");
                }
            }
        }
    }
}

/// Appends one semicolon-delimited row per iteration to a file. The header
/// is written when the file is new or empty.
#[derive(Clone)]
pub struct CsvStatus {
    path: PathBuf,
    writer: Arc<Mutex<Option<BufWriter<std::fs::File>>>>,
}

impl CsvStatus {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            writer: Arc::new(Mutex::new(None)),
        }
    }

    fn open(&self, nmodes: usize) -> std::io::Result<BufWriter<std::fs::File>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let is_empty = file.metadata()?.len() == 0;
        let mut writer = BufWriter::new(file);
        if is_empty {
            writeln!(writer, "{}", StepStatus::csv_header(nmodes))?;
        }
        Ok(writer)
    }
}

impl StepHandler for CsvStatus {
    fn init(&mut self, config: &Config, _iteration: &Iteration) {
        let opened = self.open(config.train.nmodes());
        match (opened, self.writer.lock()) {
            (Ok(writer), Ok(mut slot)) => *slot = Some(writer),
            (Err(err), _) => {
                warn!("Could not open status log {}: {err}", self.path.display())
            }
            (_, Err(_)) => warn!("Status log lock poisoned"),
        }
    }

    fn step_completed(&mut self, status: &StepStatus) {
        if let Ok(mut slot) = self.writer.lock() {
            if let Some(writer) = slot.as_mut() {
                if let Err(err) = writeln!(writer, "{}", status.csv_line())
                    .and_then(|_| writer.flush())
                {
                    warn!("Could not write status log: {err}");
                }
            }
        }
    }

    fn finalize(&mut self) {
        if let Ok(mut slot) = self.writer.lock() {
            if let Some(mut writer) = slot.take() {
                if let Err(err) = writer.flush() {
                    warn!("Could not flush status log: {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Phase;
    use bmf_data::{DataConfig, SparseConfig};

    #[derive(Clone, Default)]
    struct StopAfter {
        limit: usize,
        seen: usize,
    }

    impl StepHandler for StopAfter {
        fn step_completed(&mut self, _status: &StepStatus) {
            self.seen += 1;
        }

        fn stop(&self) -> bool {
            self.seen >= self.limit
        }
    }

    fn config() -> Config {
        Config::new(DataConfig::Sparse(SparseConfig::new(vec![2, 2])))
    }

    #[test]
    fn tuples_stop_if_any_member_stops() {
        let mut handler = (
            StopAfter { limit: 1, seen: 0 },
            StopAfter { limit: 5, seen: 0 },
        );
        assert!(!handler.stop());
        handler.step_completed(&StepStatus::new(Phase::Burnin, 1, 2));
        assert!(handler.stop());
    }

    #[test]
    fn option_and_unit_never_stop() {
        let none: Option<StopAfter> = None;
        assert!(!none.stop());
        assert!(!().stop());
    }

    #[test]
    fn timeout_stops_after_limit() {
        let mut timeout = Timeout::new(Duration::ZERO);
        assert!(!timeout.stop());
        timeout.init(&config(), &Iteration::new(1, 1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(timeout.stop());
    }

    #[test]
    fn csv_status_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.csv");
        let status = StepStatus::new(Phase::Sampling, 1, 3);

        for _ in 0..2 {
            let mut handler = CsvStatus::new(&path);
            handler.init(&config(), &Iteration::new(0, 3));
            handler.step_completed(&status);
            handler.finalize();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], StepStatus::csv_header(2));
        assert_eq!(lines[1], status.csv_line());
    }
}
