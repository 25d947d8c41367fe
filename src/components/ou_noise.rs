use {
    rand::thread_rng,
    rand_distr::{
        Distribution,
        StandardNormal,
    },
    serde::{
        Deserialize,
        Serialize,
    },
};

/// An Ornstein-Uhlenbeck exploration-noise process with a linearly decaying
/// sigma.
///
/// The internal state follows the mean-reverting recurrence
/// `state += theta * (mu - state) + sigma(step) * N(0, 1)` and persists
/// across decision steps; it is reset to `mu` only at episode boundaries.
///
/// `sigma(step)` interpolates linearly from `sigma_max` at step 0 down to
/// `sigma_min` at `decay_period`, then clamps.
#[derive(Clone, Serialize, Deserialize)]
pub struct OuNoise {
    mu: Vec<f64>,
    theta: f64,
    sigma_max: f64,
    sigma_min: f64,
    decay_period: usize,
    state: Vec<f64>,
}

impl OuNoise {
    pub fn new(
        size_action: usize,
        theta: f64,
        sigma_max: f64,
        sigma_min: f64,
        decay_period: usize,
    ) -> Self {
        let mu = vec![0.0; size_action];
        Self {
            state: mu.clone(),
            mu,
            theta,
            sigma_max,
            sigma_min,
            decay_period,
        }
    }

    /// The decayed sigma at the given global step, non-increasing and equal
    /// to `sigma_min` for every step at or past the decay period.
    pub fn sigma_at(&self, step: usize) -> f64 {
        if self.decay_period == 0 {
            return self.sigma_min;
        }
        let progress = (step as f64 / self.decay_period as f64).min(1.0);
        self.sigma_max - (self.sigma_max - self.sigma_min) * progress
    }

    /// Advance the process by one decision step and return the perturbation.
    ///
    /// Mutates the internal state, so callers must sample exactly once per
    /// decision step or the exploration variance is inflated.
    pub fn sample(&mut self, step: usize) -> Vec<f64> {
        let sigma = self.sigma_at(step);
        let mut rng = thread_rng();
        for (x, mu) in self.state.iter_mut().zip(self.mu.iter()) {
            let draw: f64 = StandardNormal.sample(&mut rng);
            *x += self.theta * (mu - *x) + sigma * draw;
        }
        self.state.clone()
    }

    /// Reset the internal state to `mu`; called at the start of each episode.
    pub fn reset(&mut self) {
        self.state.copy_from_slice(&self.mu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigma_decays_monotonically_and_clamps() {
        let noise = OuNoise::new(2, 0.15, 0.9, 0.1, 1000);
        let mut previous = f64::INFINITY;
        for step in (0..2000).step_by(50) {
            let sigma = noise.sigma_at(step);
            assert!(sigma <= previous);
            assert!(sigma >= 0.1 && sigma <= 0.9);
            previous = sigma;
        }
        assert_eq!(noise.sigma_at(1000), 0.1);
        assert_eq!(noise.sigma_at(5_000_000), 0.1);
        assert_eq!(noise.sigma_at(0), 0.9);
    }

    #[test]
    fn test_zero_decay_period_is_flat() {
        let noise = OuNoise::new(2, 0.15, 0.9, 0.1, 0);
        assert_eq!(noise.sigma_at(0), 0.1);
        assert_eq!(noise.sigma_at(100), 0.1);
    }

    #[test]
    fn test_reset_returns_state_to_mu() {
        let mut noise = OuNoise::new(3, 0.15, 0.2, 0.05, 100);
        for step in 0..10 {
            noise.sample(step);
        }
        noise.reset();
        assert_eq!(noise.state, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_sample_has_action_dimension() {
        let mut noise = OuNoise::new(2, 0.15, 0.2, 0.05, 100);
        assert_eq!(noise.sample(0).len(), 2);
    }

    #[test]
    fn test_state_persists_across_samples() {
        // With sigma 0 the recurrence is deterministic mean reversion, so a
        // state pushed away from mu must move strictly toward it.
        let mut noise = OuNoise::new(1, 0.5, 0.0, 0.0, 0);
        noise.state[0] = 1.0;
        let first = noise.sample(0)[0];
        let second = noise.sample(1)[0];
        assert!(first < 1.0);
        assert!(second < first);
        assert!(second > 0.0);
    }
}
