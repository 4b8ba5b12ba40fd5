use super::{
    LatentPrior, MacauPrior, NormalOnePrior, NormalPrior, PriorKind,
    SideInfoConfig,
};
use crate::PriorError;

/// Builds the prior for one mode from its configured kind
pub trait PriorFactory {
    fn create_prior(
        &self,
        kind: PriorKind,
        mode: usize,
        num_latent: usize,
    ) -> Result<LatentPrior, PriorError>;

    /// One prior per mode
    fn create_priors(
        &self,
        kinds: &[PriorKind],
        num_latent: usize,
    ) -> Result<Vec<LatentPrior>, PriorError> {
        kinds
            .iter()
            .enumerate()
            .map(|(mode, &kind)| self.create_prior(kind, mode, num_latent))
            .collect()
    }
}

/// Maps every [`PriorKind`] to its prior with the vague Normal-Wishart
/// hyperprior. Macau priors take their features from `side_info`.
#[derive(Clone, Debug, Default)]
pub struct DefaultPriorFactory {
    side_info: Vec<SideInfoConfig>,
}

impl DefaultPriorFactory {
    pub fn with_side_info(mut self, side_info: Vec<SideInfoConfig>) -> Self {
        self.side_info = side_info;
        self
    }

    fn side_info(&self, mode: usize) -> Option<&SideInfoConfig> {
        self.side_info.iter().find(|side| side.mode == mode)
    }
}

impl PriorFactory for DefaultPriorFactory {
    fn create_prior(
        &self,
        kind: PriorKind,
        mode: usize,
        num_latent: usize,
    ) -> Result<LatentPrior, PriorError> {
        match kind {
            PriorKind::Normal => Ok(NormalPrior::new(mode, num_latent).into()),
            PriorKind::NormalOne => {
                Ok(NormalOnePrior::new(mode, num_latent).into())
            }
            PriorKind::Macau => {
                let side = self
                    .side_info(mode)
                    .ok_or(PriorError::MissingSideInfo(mode))?;
                MacauPrior::new(mode, num_latent, side).map(Into::into)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Prior;

    #[test]
    fn creates_one_prior_per_mode() {
        let priors = DefaultPriorFactory::default()
            .create_priors(&[PriorKind::Normal, PriorKind::NormalOne], 4)
            .unwrap();
        assert_eq!(priors.len(), 2);
        assert_eq!(priors[0].kind(), PriorKind::Normal);
        assert_eq!(priors[1].kind(), PriorKind::NormalOne);
        assert_eq!(priors[1].mode(), 1);
        assert_eq!(priors[1].hyper().num_latent(), 4);
    }

    #[test]
    fn macau_needs_side_info_for_its_mode() {
        let kinds = [PriorKind::Normal, PriorKind::Macau];
        assert_eq!(
            DefaultPriorFactory::default().create_priors(&kinds, 3),
            Err(PriorError::MissingSideInfo(1))
        );

        let factory = DefaultPriorFactory::default().with_side_info(vec![
            SideInfoConfig::new(1, vec![vec![1.0, 2.0]; 5]),
        ]);
        let priors = factory.create_priors(&kinds, 3).unwrap();
        assert_eq!(priors[1].kind(), PriorKind::Macau);
        assert_eq!(priors[1].link().unwrap().num_features, 2);
    }
}
