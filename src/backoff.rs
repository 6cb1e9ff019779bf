//! Backoff schedules for the retry policy.

use std::time::Duration;

/// Delay schedule between retry attempts.
#[derive(Debug, Clone)]
pub enum Backoff {
    /// Fixed delay between retries.
    Constant { delay: Duration },
    /// Delay grows linearly with the attempt number.
    Linear { base: Duration },
    /// Delay doubles each attempt, optionally capped.
    Exponential { base: Duration, max: Option<Duration> },
}

impl Backoff {
    pub fn constant(delay: Duration) -> Self {
        Backoff::Constant { delay }
    }

    pub fn linear(base: Duration) -> Self {
        Backoff::Linear { base }
    }

    pub fn exponential(base: Duration) -> Self {
        Backoff::Exponential { base, max: None }
    }

    /// Cap the delay of an exponential schedule. No effect on other variants.
    pub fn with_max(mut self, cap: Duration) -> Self {
        if let Backoff::Exponential { max, .. } = &mut self {
            *max = Some(cap);
        }
        self
    }

    /// The schedule used for publishing: 200 ms doubling, so the sleeps
    /// before retries 1..=3 land on 200, 400, and 800 ms.
    pub fn publish_default() -> Self {
        Backoff::exponential(Duration::from_millis(200))
    }

    /// Delay before retry `attempt` (1-indexed). Saturates instead of
    /// overflowing for absurd attempt numbers.
    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            Backoff::Constant { delay } => *delay,
            Backoff::Linear { base } => scale(*base, attempt as u64),
            Backoff::Exponential { base, max } => {
                // 2^(attempt-1), kept in u64 so huge attempts just saturate
                // in scale() rather than wrapping the shift.
                let doublings = attempt.saturating_sub(1).min(63);
                let delay = scale(*base, 1u64 << doublings);
                max.map_or(delay, |cap| delay.min(cap))
            }
        }
    }
}

/// Multiply a base delay by an integer factor, saturating at the top end.
fn scale(base: Duration, factor: u64) -> Duration {
    base.saturating_mul(factor.min(u64::from(u32::MAX)) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_never_grows() {
        let backoff = Backoff::constant(Duration::from_millis(50));
        assert_eq!(backoff.delay(1), Duration::from_millis(50));
        assert_eq!(backoff.delay(7), Duration::from_millis(50));
    }

    #[test]
    fn linear_scales_with_attempt() {
        let backoff = Backoff::linear(Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(300));
    }

    #[test]
    fn publish_schedule_is_200_400_800() {
        let backoff = Backoff::publish_default();
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn exponential_respects_cap() {
        let backoff = Backoff::exponential(Duration::from_millis(200)).with_max(Duration::from_millis(500));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(500));
        assert_eq!(backoff.delay(20), Duration::from_millis(500));
    }

    #[test]
    fn absurd_attempts_saturate_instead_of_panicking() {
        let exponential = Backoff::exponential(Duration::from_secs(1));
        assert!(exponential.delay(64) > Duration::from_secs(1_000_000));
        assert!(exponential.delay(10_000) > Duration::from_secs(1_000_000));

        let linear = Backoff::linear(Duration::from_secs(u64::MAX / 2));
        assert!(linear.delay(1_000_000) > Duration::from_secs(u64::MAX / 2));
    }
}
