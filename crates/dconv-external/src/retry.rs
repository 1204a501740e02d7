use std::thread;
use std::time::Duration;

/// Retries a fallible operation a bounded number of times, waiting
/// `interval` milliseconds between attempts.
///
/// Ported from distinst's `external/src/retry.rs`; used by the Block Layer
/// Adapter for kernel partition-table reprobes and by the Verified Migrator
/// for unmount-busy backoff (§5 Shared resources).
pub struct Retry {
    attempts: u64,
    interval: u64,
}

impl Default for Retry {
    fn default() -> Retry { Retry { attempts: 3, interval: 1000 } }
}

impl Retry {
    pub fn attempts(mut self, attempts: u64) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    pub fn retry_until_ok<F, T, E>(&self, mut func: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        let duration = Duration::from_millis(self.interval);
        let mut attempt = 0;
        loop {
            match func() {
                Ok(value) => return Ok(value),
                Err(why) => {
                    if attempt == self.attempts {
                        return Err(why);
                    } else {
                        attempt += 1;
                        thread::sleep(duration);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn succeeds_once_under_the_attempt_limit() {
        let calls = Cell::new(0);
        let result = Retry::default().attempts(3).interval(1).retry_until_ok(|| {
            let n = calls.get() + 1;
            calls.set(n);
            if n < 3 { Err(()) } else { Ok(n) }
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn gives_up_after_exhausting_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), ()> = Retry::default().attempts(2).interval(1).retry_until_ok(|| {
            calls.set(calls.get() + 1);
            Err(())
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }
}
