//! Unit-variance normal draws truncated to one side of zero
use rand::Rng;
use rand_distr::{Exp1, StandardNormal};

/// Below this standardized bound plain rejection accepts often enough
const NAIVE_BOUND: f64 = 0.45;

/// Draw `x ~ N(0, 1)` conditioned on `x > lower`.
///
/// Small bounds use rejection from the standard normal. Larger bounds use
/// the exponential proposal of Robert (1995), which keeps the acceptance
/// rate high far in the tail.
pub fn draw_standard_tail<R: Rng>(lower: f64, rng: &mut R) -> f64 {
    if lower < NAIVE_BOUND {
        loop {
            let x: f64 = rng.sample(StandardNormal);
            if x > lower {
                return x;
            }
        }
    }

    let rate = 0.5 * (lower + lower.mul_add(lower, 4.0).sqrt());
    loop {
        let e: f64 = rng.sample(Exp1);
        let x = lower + e / rate;
        let d = x - rate;
        let u: f64 = rng.gen();
        if u <= (-0.5 * d * d).exp() {
            return x;
        }
    }
}

/// Draw the latent utility of a probit observation: `z ~ N(mean, 1)`
/// restricted to `z > 0` when `positive`, to `z < 0` otherwise.
pub fn draw_probit_latent<R: Rng>(mean: f64, positive: bool, rng: &mut R) -> f64 {
    if !mean.is_finite() {
        return if positive { 1.0 } else { -1.0 };
    }
    if positive {
        mean + draw_standard_tail(-mean, rng)
    } else {
        mean - draw_standard_tail(mean, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    // E[x | x > a] of a standard normal at a = 0 and a = 3
    const HALF_NORMAL_MEAN: f64 = 0.797_884_560_802_865_4;
    const TAIL_3_MEAN: f64 = 3.283_098_654_930_434;

    #[test]
    fn draws_respect_the_bound() {
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        for lower in [-3.0, -0.5, 0.0, 0.3, 0.45, 1.0, 5.0, 12.0] {
            for _ in 0..500 {
                assert!(draw_standard_tail(lower, &mut rng) > lower);
            }
        }
    }

    #[test]
    fn half_normal_mean() {
        let mut rng = Xoshiro256Plus::seed_from_u64(8);
        let n = 40_000;
        let mean = (0..n)
            .map(|_| draw_standard_tail(0.0, &mut rng))
            .sum::<f64>()
            / n as f64;
        assert_relative_eq!(mean, HALF_NORMAL_MEAN, epsilon = 0.02);
    }

    #[test]
    fn far_tail_mean() {
        let mut rng = Xoshiro256Plus::seed_from_u64(9);
        let n = 40_000;
        let mean = (0..n)
            .map(|_| draw_standard_tail(3.0, &mut rng))
            .sum::<f64>()
            / n as f64;
        assert_relative_eq!(mean, TAIL_3_MEAN, epsilon = 0.02);
    }

    #[test]
    fn probit_latent_has_the_observed_sign() {
        let mut rng = Xoshiro256Plus::seed_from_u64(10);
        for mean in [-8.0, -1.0, 0.0, 2.5, 9.0] {
            for _ in 0..200 {
                assert!(draw_probit_latent(mean, true, &mut rng) > 0.0);
                assert!(draw_probit_latent(mean, false, &mut rng) < 0.0);
            }
        }
    }
}
