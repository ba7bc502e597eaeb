use std::time::{Duration, Instant};

/// Tracks the fetch pacing of a single pool worker
///
/// Each worker owns one of these; rate limiting is per worker and never shared,
/// so no synchronization is needed.
#[derive(Debug, Clone)]
pub struct WorkerState {
    /// Number of remote fetches this worker started
    pub fetch_count: u64,

    /// Instant the last fetch started
    pub last_fetch_time: Option<Instant>,

    /// Minimum spacing between two consecutive fetches
    pub min_delay: Duration,
}

impl WorkerState {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            fetch_count: 0,
            last_fetch_time: None,
            min_delay,
        }
    }

    /// Checks if a fetch may start at `now`
    pub fn can_fetch(&self, now: Instant) -> bool {
        self.time_until_next_fetch(now).is_none()
    }

    /// Returns None if a fetch can start now, or the duration to wait otherwise
    pub fn time_until_next_fetch(&self, now: Instant) -> Option<Duration> {
        let last = self.last_fetch_time?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.min_delay {
            Some(self.min_delay - elapsed)
        } else {
            None
        }
    }

    /// Records that a fetch started at `now`
    pub fn record_fetch(&mut self, now: Instant) {
        self.fetch_count += 1;
        self.last_fetch_time = Some(now);
    }

    /// Sleeps until the next fetch is allowed, then records it
    pub async fn pace(&mut self) {
        if let Some(wait) = self.time_until_next_fetch(Instant::now()) {
            tokio::time::sleep(wait).await;
        }
        self.record_fetch(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_worker_can_fetch_immediately() {
        let state = WorkerState::new(Duration::from_millis(100));
        assert!(state.can_fetch(Instant::now()));
        assert_eq!(state.fetch_count, 0);
    }

    #[test]
    fn test_cannot_fetch_within_delay() {
        let mut state = WorkerState::new(Duration::from_millis(1000));
        let now = Instant::now();
        state.record_fetch(now);

        assert!(!state.can_fetch(now + Duration::from_millis(500)));
        assert_eq!(
            state.time_until_next_fetch(now + Duration::from_millis(400)),
            Some(Duration::from_millis(600))
        );
    }

    #[test]
    fn test_can_fetch_after_delay() {
        let mut state = WorkerState::new(Duration::from_millis(1000));
        let now = Instant::now();
        state.record_fetch(now);

        assert!(state.can_fetch(now + Duration::from_millis(1000)));
    }

    #[test]
    fn test_zero_delay_never_waits() {
        let mut state = WorkerState::new(Duration::ZERO);
        let now = Instant::now();
        state.record_fetch(now);
        assert!(state.can_fetch(now));
    }

    #[tokio::test]
    async fn test_pace_spaces_fetches() {
        let mut state = WorkerState::new(Duration::from_millis(50));
        let start = Instant::now();
        state.pace().await;
        state.pace().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(state.fetch_count, 2);
    }
}
