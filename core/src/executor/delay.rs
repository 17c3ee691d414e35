// ## 📂 File: `src/executor/delay.rs`
// ## Wait policies between retries, interruptible by shutdown

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayKind {
    Linear,
    Backoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayUnit {
    Millis,
    Seconds,
}

impl DelayUnit {
    fn duration(&self, amount: u64) -> Duration {
        match self {
            DelayUnit::Millis => Duration::from_millis(amount),
            DelayUnit::Seconds => Duration::from_secs(amount),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayConfiguration {
    pub kind: DelayKind,
    pub base_delay: u64,
    pub max_delay: u64,
    pub unit: DelayUnit,
}

impl Default for DelayConfiguration {
    fn default() -> Self {
        Self { kind: DelayKind::Backoff, base_delay: 1, max_delay: 60, unit: DelayUnit::Seconds }
    }
}

impl DelayConfiguration {
    pub fn linear(delay: u64, unit: DelayUnit) -> Self {
        Self { kind: DelayKind::Linear, base_delay: delay, max_delay: delay, unit }
    }

    pub fn backoff(base_delay: u64, max_delay: u64, unit: DelayUnit) -> Self {
        Self { kind: DelayKind::Backoff, base_delay, max_delay, unit }
    }

    /// A fresh delayer; attempt counting starts at zero.
    pub fn delayer(&self) -> Box<dyn Delayer> {
        match self.kind {
            DelayKind::Linear => Box::new(LinearDelayer { delay: self.unit.duration(self.base_delay) }),
            DelayKind::Backoff => Box::new(BackoffDelayer {
                base: self.unit.duration(self.base_delay),
                max: self.unit.duration(self.max_delay),
                attempt: 0,
            }),
        }
    }
}

pub trait Delayer: Send {
    /// Duration of the next wait. Advances the attempt counter.
    fn next_delay(&mut self) -> Duration;

    /// Wait `next_delay()`. Returns `false` when shutdown cut the wait short.
    fn delay(&mut self, shutdown: &Shutdown) -> bool {
        let wait = self.next_delay();
        !shutdown.wait_timeout(wait)
    }
}

#[derive(Debug, Clone)]
pub struct LinearDelayer {
    delay: Duration,
}

impl Delayer for LinearDelayer {
    fn next_delay(&mut self) -> Duration {
        self.delay
    }
}

/// `min(base * 2^attempt, max)`.
#[derive(Debug, Clone)]
pub struct BackoffDelayer {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Delayer for BackoffDelayer {
    fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let wait = self.base.checked_mul(factor).unwrap_or(self.max).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        wait
    }
}

/// Process-wide stop signal. Cloning shares the signal.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock() = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block up to `timeout`. Returns `true` if shutdown was (or became)
    /// triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let mut triggered = flag.lock();
        if !*triggered {
            let _ = cvar.wait_while_for(&mut triggered, |t| !*t, timeout);
        }
        *triggered
    }
}
