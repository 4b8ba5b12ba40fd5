use crate::DataError;
use bmf_consts::{
    DEFAULT_PRECISION, DEFAULT_SN_INIT, DEFAULT_SN_MAX, DEFAULT_SN_MIN,
};
use rand::Rng;
use rand_distr::{Distribution, Gamma};
use serde::{Deserialize, Serialize};

fn default_sn_min() -> f64 {
    DEFAULT_SN_MIN
}

/// Observation noise of one data block
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum NoiseConfig {
    /// Constant precision
    Fixed { precision: f64 },
    /// Precision re-drawn every iteration from the residuals. The bounds are
    /// signal-to-noise ratios relative to the variance of the data.
    Adaptive {
        sn_init: f64,
        sn_max: f64,
        #[serde(default = "default_sn_min")]
        sn_min: f64,
    },
    /// Binary observations under a probit link. Values must be 0 or 1; each
    /// observation is replaced by a latent utility with unit variance.
    Probit,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self::Fixed {
            precision: DEFAULT_PRECISION,
        }
    }
}

impl NoiseConfig {
    pub fn adaptive() -> Self {
        Self::Adaptive {
            sn_init: DEFAULT_SN_INIT,
            sn_max: DEFAULT_SN_MAX,
            sn_min: DEFAULT_SN_MIN,
        }
    }

    pub fn is_probit(&self) -> bool {
        matches!(self, Self::Probit)
    }

    pub fn validate(&self) -> Result<(), DataError> {
        let positive = |x: f64| x.is_finite() && x > 0.0;
        match *self {
            Self::Fixed { precision } if !positive(precision) => Err(
                DataError::InvalidNoise(format!("precision {precision} must be positive")),
            ),
            Self::Adaptive {
                sn_init,
                sn_max,
                sn_min,
            } => {
                if !(positive(sn_init) && positive(sn_max) && positive(sn_min)) {
                    Err(DataError::InvalidNoise(String::from(
                        "signal-to-noise bounds must be positive",
                    )))
                } else if !(sn_min <= sn_init && sn_init <= sn_max) {
                    Err(DataError::InvalidNoise(format!(
                        "need sn_min <= sn_init <= sn_max, got \
                        {sn_min} <= {sn_init} <= {sn_max}"
                    )))
                } else {
                    Ok(())
                }
            }
            Self::Fixed { .. } | Self::Probit => Ok(()),
        }
    }
}

/// Current observation precision of one data block
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NoiseModel {
    Fixed {
        precision: f64,
    },
    Adaptive {
        sn_init: f64,
        sn_max: f64,
        sn_min: f64,
        /// Variance of the observed values, set by `init`
        var_total: f64,
        precision: f64,
    },
    Probit,
}

impl From<&NoiseConfig> for NoiseModel {
    fn from(config: &NoiseConfig) -> Self {
        match *config {
            NoiseConfig::Fixed { precision } => Self::Fixed { precision },
            NoiseConfig::Adaptive {
                sn_init,
                sn_max,
                sn_min,
            } => Self::Adaptive {
                sn_init,
                sn_max,
                sn_min,
                var_total: 1.0,
                precision: sn_init,
            },
            NoiseConfig::Probit => Self::Probit,
        }
    }
}

impl NoiseModel {
    #[inline]
    pub fn precision(&self) -> f64 {
        match self {
            Self::Fixed { precision } | Self::Adaptive { precision, .. } => {
                *precision
            }
            Self::Probit => 1.0,
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, Self::Adaptive { .. })
    }

    pub fn is_probit(&self) -> bool {
        matches!(self, Self::Probit)
    }

    /// `true` if `other` could have been produced by the same configuration
    pub fn same_kind(&self, other: &NoiseModel) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Bind the noise to the variance of the data it describes
    pub fn init(&mut self, data_var: f64) {
        if let Self::Adaptive {
            sn_init,
            var_total,
            precision,
            ..
        } = self
        {
            *var_total = if data_var.is_finite() && data_var > 0.0 {
                data_var
            } else {
                1.0
            };
            *precision = *sn_init / *var_total;
        }
    }

    /// Re-draw the precision from the residual sum of squares `sumsq` over
    /// `nnz` observations. The fixed and probit variants ignore the update.
    pub fn update<R: Rng>(&mut self, sumsq: f64, nnz: usize, rng: &mut R) {
        if let Self::Adaptive {
            sn_max,
            sn_min,
            var_total,
            precision,
            ..
        } = self
        {
            let shape = 1.0 + nnz as f64 / 2.0;
            let rate = 1.0 + sumsq / 2.0;
            let draw = Gamma::new(shape, 1.0 / rate)
                .ok()
                .map(|gamma| gamma.sample(rng))
                .filter(|x: &f64| x.is_finite() && *x > 0.0);

            if let Some(alpha) = draw {
                let lower = *sn_min / *var_total;
                let upper = *sn_max / *var_total;
                *precision = alpha.clamp(lower, upper);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn fixed_noise_ignores_updates() {
        let mut rng = Xoshiro256Plus::seed_from_u64(1);
        let mut noise = NoiseModel::from(&NoiseConfig::default());
        noise.init(12.0);
        noise.update(1e6, 10, &mut rng);
        assert_eq!(noise.precision(), DEFAULT_PRECISION);
    }

    #[test]
    fn adaptive_init_scales_by_variance() {
        let mut noise = NoiseModel::from(&NoiseConfig::adaptive());
        noise.init(4.0);
        assert_relative_eq!(noise.precision(), DEFAULT_SN_INIT / 4.0);
    }

    #[test]
    fn adaptive_precision_tracks_residual_variance() {
        let mut rng = Xoshiro256Plus::seed_from_u64(2);
        let mut noise = NoiseModel::from(&NoiseConfig::adaptive());
        noise.init(1.0);
        // residual variance 0.25 over many observations
        let nnz = 100_000;
        noise.update(0.25 * nnz as f64, nnz, &mut rng);
        assert_relative_eq!(noise.precision(), 4.0, epsilon = 0.1);
    }

    #[test]
    fn adaptive_precision_is_clamped() {
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let mut noise = NoiseModel::from(&NoiseConfig::adaptive());
        noise.init(2.0);
        // nearly perfect fit
        noise.update(1e-9, 100_000, &mut rng);
        assert_relative_eq!(noise.precision(), DEFAULT_SN_MAX / 2.0);

        // terrible fit
        noise.update(1e12, 10, &mut rng);
        assert_relative_eq!(noise.precision(), DEFAULT_SN_MIN / 2.0);
    }

    #[test]
    fn zero_variance_data_is_guarded() {
        let mut noise = NoiseModel::from(&NoiseConfig::adaptive());
        noise.init(0.0);
        assert!(noise.precision().is_finite());
        assert!(noise.precision() > 0.0);
    }

    #[test]
    fn probit_has_unit_precision() {
        let mut rng = Xoshiro256Plus::seed_from_u64(4);
        let mut noise = NoiseModel::from(&NoiseConfig::Probit);
        noise.init(0.25);
        noise.update(100.0, 10, &mut rng);
        assert_eq!(noise.precision(), 1.0);
        assert!(noise.is_probit());
        assert!(!noise.same_kind(&NoiseModel::from(&NoiseConfig::default())));
    }

    #[test]
    fn probit_config_from_yaml() {
        let config: NoiseConfig = serde_yaml::from_str("probit").unwrap();
        assert_eq!(config, NoiseConfig::Probit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_bounds() {
        assert!(NoiseConfig::Fixed { precision: 0.0 }.validate().is_err());
        assert!(NoiseConfig::Adaptive {
            sn_init: 20.0,
            sn_max: 10.0,
            sn_min: 1.0,
        }
        .validate()
        .is_err());
        assert!(NoiseConfig::adaptive().validate().is_ok());
    }

    #[test]
    fn adaptive_config_from_yaml_defaults_floor() {
        let config: NoiseConfig =
            serde_yaml::from_str("!adaptive\nsn_init: 1.0\nsn_max: 10.0\n")
                .unwrap();
        assert_eq!(config, NoiseConfig::adaptive());
    }
}
