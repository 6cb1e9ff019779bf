//! Jitter strategies for randomizing retry delays.
//!
//! The publish schedule runs without jitter by default; callers fanning many
//! publishers at the same broker can opt in to spread the herd.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// Use the exact backoff delay.
    None,
    /// Random delay in `[0, delay]`.
    Full,
    /// Random delay in `[delay/2, delay]`.
    Equal,
}

impl Jitter {
    pub fn full() -> Self {
        Jitter::Full
    }

    pub fn equal() -> Self {
        Jitter::Equal
    }

    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rand::rng())
    }

    /// Deterministic variant for tests.
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        let millis = delay.as_millis().min(u64::MAX as u128) as u64;
        match self {
            Jitter::None => delay,
            Jitter::Full => {
                if millis == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rng.random_range(0..=millis))
            }
            Jitter::Equal => {
                if millis == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rng.random_range(millis / 2..=millis))
            }
        }
    }
}
