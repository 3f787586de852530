use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum-spacing gate for outbound calls, keyed per source.
///
/// `acquire` reserves the next free slot for a source under the lock and sleeps
/// outside it, so concurrent callers queue on distinct slots spaced at least
/// `min_delay` apart.
pub struct RateGate {
    default_delay: Duration,
    overrides: HashMap<&'static str, Duration>,
    last_call: Mutex<HashMap<&'static str, Instant>>,
}

impl RateGate {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay,
            overrides: HashMap::new(),
            last_call: Mutex::new(HashMap::new()),
        }
    }

    /// Per-source spacing, e.g. a stricter quota for a free-tier API key
    pub fn with_source_delay(mut self, source: &'static str, delay: Duration) -> Self {
        self.overrides.insert(source, delay);
        self
    }

    pub fn min_delay(&self, source: &str) -> Duration {
        self.overrides
            .get(source)
            .copied()
            .unwrap_or(self.default_delay)
    }

    /// Waits for the source's next slot and returns the instant granted
    pub async fn acquire(&self, source: &'static str) -> Instant {
        let delay = self.min_delay(source);

        let mut reservation = {
            let mut last_call = self.last_call.lock().await;
            let now = Instant::now();
            let slot = match last_call.get(source) {
                Some(prev) => (*prev + delay).max(now),
                None => now,
            };
            let previous = last_call.insert(source, slot);
            Reservation {
                gate: self,
                source,
                slot,
                previous,
                armed: true,
            }
        };

        let slot = reservation.slot;
        let now = Instant::now();
        if slot > now {
            tracing::debug!(
                "Rate gate: waiting {:.2}s for {} slot",
                (slot - now).as_secs_f64(),
                source
            );
            tokio::time::sleep_until(slot).await;
        }

        reservation.armed = false;
        slot
    }
}

/// A slot taken but not yet reached. Dropped while armed (the caller was
/// cancelled mid-wait), it hands the slot back when nobody has queued behind it.
struct Reservation<'a> {
    gate: &'a RateGate,
    source: &'static str,
    slot: Instant,
    previous: Option<Instant>,
    armed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(mut last_call) = self.gate.last_call.try_lock() else {
            return;
        };
        if last_call.get(self.source) != Some(&self.slot) {
            return;
        }
        match self.previous {
            Some(prev) => {
                last_call.insert(self.source, prev);
            }
            None => {
                last_call.remove(self.source);
            }
        }
        tracing::debug!("Rate gate: released unused {} slot", self.source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::task::JoinSet;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_immediate() {
        let gate = RateGate::new(Duration::from_secs(1));
        let start = Instant::now();
        let granted = gate.acquire("yahoo").await;
        assert_eq!(granted, start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_calls_are_spaced() {
        let gate = RateGate::new(Duration::from_millis(500));
        let first = gate.acquire("yahoo").await;
        let second = gate.acquire("yahoo").await;
        assert!(second - first >= Duration::from_millis(500));
        assert!(Instant::now() >= second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_workers_never_closer_than_min_delay() {
        let delay = Duration::from_millis(250);
        let gate = Arc::new(RateGate::new(delay));
        let mut tasks = JoinSet::new();

        for _ in 0..8 {
            let gate = Arc::clone(&gate);
            tasks.spawn(async move { gate.acquire("yahoo").await });
        }

        let mut granted = Vec::new();
        while let Some(result) = tasks.join_next().await {
            granted.push(result.unwrap());
        }
        granted.sort();

        assert_eq!(granted.len(), 8);
        for pair in granted.windows(2) {
            assert!(pair[1] - pair[0] >= delay, "slots {:?} too close", pair);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_releases_its_slot() {
        let gate = RateGate::new(Duration::from_secs(1));
        let start = gate.acquire("yahoo").await;

        let waited = tokio::time::timeout(Duration::from_millis(100), gate.acquire("yahoo")).await;
        assert!(waited.is_err());

        // next caller takes the slot the cancelled one gave up
        let granted = gate.acquire("yahoo").await;
        assert_eq!(granted - start, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_keeps_later_slots() {
        let gate = Arc::new(RateGate::new(Duration::from_secs(1)));
        let start = gate.acquire("yahoo").await;

        let cancelled = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire("yahoo").await })
        };
        tokio::task::yield_now().await;
        let queued = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire("yahoo").await })
        };
        tokio::task::yield_now().await;
        cancelled.abort();

        let granted = queued.await.unwrap();
        assert_eq!(granted - start, Duration::from_secs(2));
        let next = gate.acquire("yahoo").await;
        assert_eq!(next - granted, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sources_are_independent() {
        let gate = RateGate::new(Duration::from_secs(5))
            .with_source_delay("alpha_vantage", Duration::from_secs(12));
        let start = Instant::now();

        gate.acquire("yahoo").await;
        gate.acquire("alpha_vantage").await;
        assert_eq!(Instant::now(), start);

        let av = gate.acquire("alpha_vantage").await;
        assert_eq!(av - start, Duration::from_secs(12));
        assert_eq!(gate.min_delay("yahoo"), Duration::from_secs(5));
    }
}
