use std::fmt;

/// The two phases of a chain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Burnin,
    Sampling,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Burnin => write!(f, "Burnin"),
            Self::Sampling => write!(f, "Sample"),
        }
    }
}

/// Position of a session in its burn-in + sampling schedule.
///
/// `index` is the 0-based number of completed iterations. The phase and the
/// sample index are derived from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Iteration {
    index: usize,
    burnin: usize,
    nsamples: usize,
}

impl Iteration {
    pub fn new(burnin: usize, nsamples: usize) -> Self {
        Self {
            index: 0,
            burnin,
            nsamples,
        }
    }

    /// The schedule positioned right after sample `isample` (1-based)
    pub fn after_sample(burnin: usize, nsamples: usize, isample: usize) -> Self {
        Self {
            index: (burnin + isample).min(burnin + nsamples),
            burnin,
            nsamples,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn burnin(&self) -> usize {
        self.burnin
    }

    #[inline]
    pub fn nsamples(&self) -> usize {
        self.nsamples
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.burnin + self.nsamples
    }

    #[inline]
    pub fn is_burnin(&self) -> bool {
        self.index < self.burnin
    }

    pub fn phase(&self) -> Phase {
        if self.is_burnin() {
            Phase::Burnin
        } else {
            Phase::Sampling
        }
    }

    /// 1-based index of the current iteration within its phase
    pub fn phase_index(&self) -> usize {
        if self.is_burnin() {
            self.index + 1
        } else {
            self.index - self.burnin + 1
        }
    }

    pub fn phase_len(&self) -> usize {
        match self.phase() {
            Phase::Burnin => self.burnin,
            Phase::Sampling => self.nsamples,
        }
    }

    /// 1-based sample index of the current iteration. `None` during burn-in.
    pub fn isample(&self) -> Option<usize> {
        (!self.is_burnin()).then(|| self.index - self.burnin + 1)
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.index >= self.total()
    }

    pub fn advance(&mut self) {
        self.index += 1;
    }
}

impl fmt::Display for Iteration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.phase(), self.phase_index(), self.phase_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_follow_index() {
        let mut iter = Iteration::new(2, 3);
        let mut seen = Vec::new();
        while !iter.is_done() {
            seen.push((iter.phase(), iter.phase_index(), iter.isample()));
            iter.advance();
        }
        assert_eq!(
            seen,
            vec![
                (Phase::Burnin, 1, None),
                (Phase::Burnin, 2, None),
                (Phase::Sampling, 1, Some(1)),
                (Phase::Sampling, 2, Some(2)),
                (Phase::Sampling, 3, Some(3)),
            ]
        );
        assert_eq!(iter.index(), 5);
    }

    #[test]
    fn after_sample_resumes_at_next_iteration() {
        let iter = Iteration::after_sample(10, 20, 4);
        assert_eq!(iter.index(), 14);
        assert_eq!(iter.isample(), Some(5));

        let done = Iteration::after_sample(10, 20, 20);
        assert!(done.is_done());
    }

    #[test]
    fn no_burnin() {
        let iter = Iteration::new(0, 3);
        assert_eq!(iter.phase(), Phase::Sampling);
        assert_eq!(iter.isample(), Some(1));
        assert_eq!(iter.to_string(), "Sample 1/3");
    }
}
