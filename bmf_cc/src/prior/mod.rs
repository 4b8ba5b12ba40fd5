//! Per-mode priors over latent rows and their Gibbs updates
mod factory;
mod macau;
mod normal;
mod normal_one;

pub use factory::{DefaultPriorFactory, PriorFactory};
pub use macau::{MacauLink, MacauPrior, SideInfoConfig};
pub use normal::NormalPrior;
pub use normal_one::NormalOnePrior;

use bmf_consts::rv::nalgebra::{DMatrix, DVector};
use bmf_data::PositionedData;
use bmf_stats::{LinalgError, NormalHyper};
use bmf_utils::{RunContext, Stream};
use enum_dispatch::enum_dispatch;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{LatentModel, PriorError};

/// The kinds of prior a mode may carry
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PriorKind {
    /// Multivariate normal with Normal-Wishart hyperprior
    #[default]
    Normal,
    /// Same model, rows updated one latent dimension at a time
    NormalOne,
    /// Normal prior whose mean is regressed on side features of the rows
    Macau,
}

impl std::fmt::Display for PriorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::NormalOne => write!(f, "normal_one"),
            Self::Macau => write!(f, "macau"),
        }
    }
}

impl std::str::FromStr for PriorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" | "default" => Ok(Self::Normal),
            "normal_one" | "normalone" => Ok(Self::NormalOne),
            "macau" => Ok(Self::Macau),
            _ => Err(format!("Unknown prior '{s}'")),
        }
    }
}

/// A prior over the rows of one mode's factor matrix
#[enum_dispatch(LatentPrior)]
pub trait Prior {
    /// The mode this prior governs
    fn mode(&self) -> usize;

    fn kind(&self) -> PriorKind;

    /// Current mean and precision of the rows
    fn hyper(&self) -> &NormalHyper;

    /// Replace the current hyperparameters, e.g. when restoring a run
    fn set_hyper(&mut self, hyper: NormalHyper) -> Result<(), PriorError>;

    /// Draw `row` given the data precision `mm` and right hand side `rr`
    /// accumulated from its observations. `current` holds the row's present
    /// value.
    fn sample_row(
        &self,
        row: usize,
        mm: DMatrix<f64>,
        rr: DVector<f64>,
        current: &[f64],
        rng: &mut Xoshiro256Plus,
    ) -> Result<Vec<f64>, LinalgError>;

    /// Re-draw the hyperparameters from the mode's current rows
    fn update_hyper(
        &mut self,
        model: &LatentModel,
        rng: &mut Xoshiro256Plus,
    ) -> Result<(), PriorError>;

    /// State of the side-feature link, for priors that have one
    fn link(&self) -> Option<MacauLink> {
        None
    }

    fn set_link(&mut self, _link: MacauLink) -> Result<(), PriorError> {
        Err(PriorError::UnexpectedLink(self.mode()))
    }
}

#[enum_dispatch]
#[derive(Clone, Debug, PartialEq)]
pub enum LatentPrior {
    Normal(NormalPrior),
    NormalOne(NormalOnePrior),
    Macau(MacauPrior),
}

impl LatentPrior {
    /// One Gibbs sweep over every row of this prior's mode followed by a
    /// hyperparameter draw.
    ///
    /// Rows are conditionally independent given the other modes, so they
    /// are drawn in parallel; row `n` uses the `Row { mode, row: n }` stream
    /// of `ctx` and the result does not depend on the thread count.
    pub fn sample_latents(
        &mut self,
        model: &mut LatentModel,
        data: &mut PositionedData,
        ctx: &RunContext,
    ) -> Result<(), PriorError> {
        let mode = self.mode();
        data.update_pnm(&*model, mode);

        let mut factor = model.take_factor(mode);
        let res: Result<(), PriorError> = {
            let prior: &Self = self;
            let model: &LatentModel = model;
            let data: &PositionedData = data;
            let k = factor.n_cols();
            factor
                .par_rows_mut()
                .enumerate()
                .try_for_each(|(row, out)| {
                    let mut rng = ctx.rng(Stream::Row { mode, row });
                    let mut rr = DVector::zeros(k);
                    let mut mm = DMatrix::zeros(k, k);
                    data.get_pnm(
                        model, mode, row, out, &mut rr, &mut mm, &mut rng,
                    );
                    let x = prior
                        .sample_row(row, mm, rr, out, &mut rng)
                        .map_err(|source| PriorError::Row { mode, row, source })?;
                    out.copy_from_slice(&x);
                    Ok(())
                })
        };
        model.put_factor(mode, factor);
        res?;

        let mut rng = ctx.rng(Stream::Hyper { mode });
        self.update_hyper(model, &mut rng)
    }

    /// Make sure a prior with side features covers all `n_rows` rows of its
    /// mode
    pub fn check_rows(&self, n_rows: usize) -> Result<(), PriorError> {
        match self {
            Self::Macau(prior) if prior.n_rows() != n_rows => {
                Err(PriorError::SideInfoRows {
                    mode: prior.mode(),
                    expected: n_rows,
                    found: prior.n_rows(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Human readable summary for logs
    pub fn describe(&self) -> String {
        let hyper = self.hyper();
        let mu_norm = hyper.mu.iter().map(|x| x * x).sum::<f64>().sqrt();
        let desc = format!(
            "{} prior on mode {}: |mu| = {:.4}",
            self.kind(),
            self.mode(),
            mu_norm
        );
        match self.link() {
            Some(link) => format!("{desc}, lambda_beta = {:.4}", link.lambda_beta),
            None => desc,
        }
    }
}

fn check_hyper(
    mode: usize,
    expected: usize,
    hyper: &NormalHyper,
) -> Result<(), PriorError> {
    let found = hyper.num_latent();
    if found != expected || hyper.lambda.len() != expected * expected {
        Err(PriorError::HyperShape {
            mode,
            expected,
            found,
        })
    } else {
        Ok(())
    }
}
