use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Keeps at least `interval` between the end of one fetch, marked with
/// [`Throttle::finished`], and the start of the next [`Throttle::wait`].
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Blocks until the interval since the last finished fetch has passed.
    /// Returns the time slept.
    pub fn wait(&self) -> Duration {
        let Some(previous) = *self.guard() else {
            return Duration::ZERO;
        };
        let remaining = self.interval.saturating_sub(previous.elapsed());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
        remaining
    }

    pub fn finished(&self) {
        *self.guard() = Some(Instant::now());
    }

    fn guard(&self) -> MutexGuard<'_, Option<Instant>> {
        match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
