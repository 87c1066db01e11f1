//! Clock, sleeper, and jitter doubles for pacing-sensitive tests.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;

use crate::domain::pacing::{PauseJitter, PipelineSleeper};

/// Clock whose time only moves when told to.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    /// Start the clock at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    /// Move the clock forward.
    ///
    /// # Panics
    ///
    /// Panics when `delta` does not fit a `TimeDelta`.
    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => {
                panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}")
            }
        };
        *self.lock_clock() += delta;
    }

    fn lock_clock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

/// Sleeper that records requested durations and returns immediately.
///
/// When built with [`RecordingSleeper::advancing`], each sleep also moves the
/// shared clock forward so window arithmetic stays realistic.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
    clock: Option<Arc<MutableClock>>,
}

impl RecordingSleeper {
    /// Record sleeps and advance `clock` by each one.
    pub fn advancing(clock: Arc<MutableClock>) -> Self {
        Self {
            slept: Mutex::new(Vec::new()),
            clock: Some(clock),
        }
    }

    /// Durations requested so far.
    ///
    /// # Panics
    ///
    /// Panics when the recording mutex is poisoned.
    pub fn slept(&self) -> Vec<Duration> {
        match self.slept.lock() {
            Ok(entries) => entries.clone(),
            Err(_) => panic!("sleeper mutex"),
        }
    }
}

#[async_trait]
impl PipelineSleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        match self.slept.lock() {
            Ok(mut entries) => entries.push(duration),
            Err(_) => panic!("sleeper mutex"),
        }
        if let Some(clock) = &self.clock {
            clock.advance(duration);
        }
    }
}

/// Jitter that always adds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl PauseJitter for NoJitter {
    fn jitter(&self, _ceiling: Duration) -> Duration {
        Duration::ZERO
    }
}
