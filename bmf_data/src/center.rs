use serde::{Deserialize, Serialize};

/// How observed values are centered before sampling
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CenterMode {
    #[default]
    None,
    /// Subtract the mean of all observations
    Global,
    /// Subtract the mean of each mode-0 slice
    Rows,
    /// Subtract the mean of each mode-1 slice
    Cols,
}

impl CenterMode {
    /// The mode whose slices are centered, if any
    pub fn slice_mode(&self) -> Option<usize> {
        match self {
            Self::Rows => Some(0),
            Self::Cols => Some(1),
            Self::None | Self::Global => None,
        }
    }
}

/// Offsets removed from the observations and added back to predictions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Centering {
    mode: CenterMode,
    global_mean: f64,
    /// Per-slice means when centering rows or columns. Slices without
    /// observations use the global mean.
    slice_means: Vec<f64>,
}

impl Default for Centering {
    fn default() -> Self {
        Self {
            mode: CenterMode::None,
            global_mean: 0.0,
            slice_means: Vec::new(),
        }
    }
}

impl Centering {
    #[inline]
    pub fn mode(&self) -> CenterMode {
        self.mode
    }

    #[inline]
    pub fn global_mean(&self) -> f64 {
        self.global_mean
    }

    /// Offset of the value at `pos`
    pub fn offset(&self, pos: &[usize]) -> f64 {
        match self.mode {
            CenterMode::None => 0.0,
            CenterMode::Global => self.global_mean,
            CenterMode::Rows | CenterMode::Cols => {
                let slice_mode = self.mode.slice_mode().unwrap_or(0);
                self.slice_means
                    .get(pos[slice_mode])
                    .copied()
                    .unwrap_or(self.global_mean)
            }
        }
    }
}

/// Running sums used to compute a [`Centering`] over global coordinates.
#[derive(Clone, Debug)]
pub(crate) struct CenteringAccumulator {
    mode: CenterMode,
    n: usize,
    sum: f64,
    slice_sums: Vec<f64>,
    slice_counts: Vec<usize>,
}

impl CenteringAccumulator {
    /// `dims` are the global dimensions
    pub(crate) fn new(mode: CenterMode, dims: &[usize]) -> Self {
        let n_slices = mode.slice_mode().map_or(0, |m| dims[m]);
        Self {
            mode,
            n: 0,
            sum: 0.0,
            slice_sums: vec![0.0; n_slices],
            slice_counts: vec![0; n_slices],
        }
    }

    pub(crate) fn push(&mut self, pos: &[usize], value: f64) {
        self.n += 1;
        self.sum += value;
        if let Some(m) = self.mode.slice_mode() {
            self.slice_sums[pos[m]] += value;
            self.slice_counts[pos[m]] += 1;
        }
    }

    pub(crate) fn finish(self) -> Centering {
        let global_mean = if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        };
        let slice_means = self
            .slice_sums
            .iter()
            .zip(self.slice_counts.iter())
            .map(|(&s, &ct)| if ct == 0 { global_mean } else { s / ct as f64 })
            .collect();

        Centering {
            mode: self.mode,
            global_mean,
            slice_means,
        }
    }
}
