// ABOUTME: Exponential reconnect backoff with jitter, reset to the initial delay on every successful connect
// ABOUTME: 500ms initial, x1.6 growth, capped at 12s, +-10% jitter applied at the point of use

use rand::Rng;
use std::time::Duration;

const INITIAL: Duration = Duration::from_millis(500);
const CAP: Duration = Duration::from_millis(12_000);
const MULTIPLIER: f64 = 1.6;

pub(crate) struct Backoff {
    current: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self { current: INITIAL }
    }

    pub fn reset(&mut self) {
        self.current = INITIAL;
    }

    /// Returns the jittered delay to sleep before the next connect attempt,
    /// and advances the stored (unjittered) delay for the attempt after that.
    pub fn next_delay(&mut self) -> Duration {
        let delay = jitter(self.current);
        self.current = std::cmp::min(self.current.mul_f64(MULTIPLIER), CAP);
        delay
    }
}

fn jitter(base: Duration) -> Duration {
    let base_ms = base.as_millis() as f64;
    let offset = (rand::thread_rng().gen::<f64>() - 0.5) * 0.2 * base_ms;
    Duration::from_millis((base_ms + offset).round().max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resets_to_initial() {
        let mut b = Backoff::new();
        let _ = b.next_delay();
        let _ = b.next_delay();
        b.reset();
        assert_eq!(b.current, INITIAL);
    }

    #[test]
    fn grows_and_caps() {
        let mut b = Backoff::new();
        let mut last = Duration::ZERO;
        for _ in 0..40 {
            let d = b.next_delay();
            assert!(d <= CAP + CAP.mul_f64(0.1) + Duration::from_millis(1));
            last = d;
        }
        assert!(last > Duration::ZERO);
    }
}
