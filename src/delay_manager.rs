use std::time::Duration;
use std::thread;
use rand::Rng;
use log::info;

/// Courtesy pause between companies. Not adaptive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Throttle {
    delay: Duration,
    jitter: Duration,
}

impl Throttle {
    pub fn new(delay: Duration, jitter: Duration) -> Self {
        Throttle { delay, jitter }
    }

    pub fn none() -> Self {
        Throttle::default()
    }

    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.delay;
        }
        let mut rng = rand::thread_rng();
        self.delay + Duration::from_millis(rng.gen_range(0..=jitter_ms))
    }

    pub fn pause(&self) {
        let wait = self.next_delay();
        if wait.is_zero() {
            return;
        }
        info!("Waiting for {} ms (site delay)...", wait.as_millis());
        thread::sleep(wait);
    }
}
