//! Fixed-interval rate limiting.
//!
//! The classification endpoint enforces a shared external rate budget, so
//! every classification call in the process goes through one [`RateGate`]:
//! an explicit fixed-interval gate rather than sleeps scattered through the
//! pipeline.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Serializes callers and spaces them at least one interval apart.
///
/// The first acquisition proceeds immediately; each subsequent one waits
/// until the interval has elapsed since the previous acquisition. Waiting
/// is a blocking async wait, not a best-effort throttle: concurrent callers
/// queue on the internal lock and are released one per interval.
pub struct RateGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateGate {
    /// Creates a gate with the given minimum spacing.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Waits until a call is allowed, then records the slot as taken.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep(ready_at - now).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_acquire_is_immediate() {
        let gate = RateGate::new(Duration::from_millis(200));
        let start = Instant::now();
        gate.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn consecutive_acquires_are_spaced() {
        let gate = RateGate::new(Duration::from_millis(50));
        gate.acquire().await;
        let start = Instant::now();
        gate.acquire().await;
        gate.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn concurrent_acquires_serialize() {
        use std::sync::Arc;

        let gate = Arc::new(RateGate::new(Duration::from_millis(40)));
        let start = Instant::now();

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.acquire().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        // Three acquisitions: the first free, two more spaced 40ms apart.
        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
