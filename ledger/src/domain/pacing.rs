//! Bounded sleeps used to pace calls against the external API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;

const QUARTER_HOUR_SECS: i64 = 15 * 60;

/// Jitter ceiling added to window-boundary pauses.
pub const WINDOW_JITTER: Duration = Duration::from_secs(3);

/// Suspends the current task.
#[async_trait]
pub trait PipelineSleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Chooses a random extra delay up to a ceiling.
pub trait PauseJitter: Send + Sync {
    /// Return a delay in `0..=ceiling`.
    fn jitter(&self, ceiling: Duration) -> Duration;
}

/// Tokio-based sleeper.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl PipelineSleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Uniform millisecond jitter from the thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformJitter;

impl PauseJitter for UniformJitter {
    fn jitter(&self, ceiling: Duration) -> Duration {
        let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling_ms))
    }
}

/// Sleep and jitter implementations shared by pull and enrichment loops.
#[derive(Clone)]
pub struct PacingRuntime {
    /// Async sleep implementation.
    pub sleeper: Arc<dyn PipelineSleeper>,
    /// Jitter applied to window-boundary pauses.
    pub jitter: Arc<dyn PauseJitter>,
}

impl Default for PacingRuntime {
    fn default() -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(UniformJitter),
        }
    }
}

impl PacingRuntime {
    /// Delay from `now` until the next quarter-hour boundary plus jitter.
    pub fn until_next_window(&self, now: DateTime<Utc>) -> Duration {
        let boundary = next_quarter_hour(now);
        let wait = (boundary - now).to_std().unwrap_or(Duration::ZERO);
        wait + self.jitter.jitter(WINDOW_JITTER)
    }
}

/// Return the next wall-clock quarter-hour boundary strictly after `now`.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use ledger::domain::pacing::next_quarter_hour;
///
/// let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 7, 30).unwrap();
/// let next = Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 0).unwrap();
/// assert_eq!(next_quarter_hour(now), next);
/// ```
pub fn next_quarter_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    let next = (now.timestamp().div_euclid(QUARTER_HOUR_SECS) + 1) * QUARTER_HOUR_SECS;
    DateTime::from_timestamp(next, 0).unwrap_or(now + TimeDelta::seconds(QUARTER_HOUR_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    use crate::test_support::NoJitter;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, hour, minute, second)
            .single()
            .expect("valid time")
    }

    #[rstest]
    #[case::mid_window(at(9, 7, 0), at(9, 15, 0))]
    #[case::on_boundary(at(9, 15, 0), at(9, 30, 0))]
    #[case::last_window(at(9, 59, 59), at(10, 0, 0))]
    #[case::rolls_day(at(23, 50, 0), Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).single().expect("valid time"))]
    fn finds_next_quarter_hour(#[case] now: DateTime<Utc>, #[case] expected: DateTime<Utc>) {
        assert_eq!(next_quarter_hour(now), expected);
    }

    #[test]
    fn window_wait_adds_jitter_to_boundary_gap() {
        let runtime = PacingRuntime {
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(NoJitter),
        };
        assert_eq!(
            runtime.until_next_window(at(9, 14, 30)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn uniform_jitter_stays_under_ceiling() {
        for _ in 0..32 {
            assert!(UniformJitter.jitter(WINDOW_JITTER) <= WINDOW_JITTER);
        }
    }
}
