use blewatch_domain::clock::{Clock, Timestamp};
use tokio::time::Instant;

/// Monotonic clock on tokio's timeline, so paused test time moves it too.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    #[must_use]
    pub fn new() -> TokioClock {
        TokioClock {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        TokioClock::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_origin(self.origin.elapsed())
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use blewatch_domain::clock::{Clock, Timestamp};

    use super::TokioClock;

    #[tokio::test(start_paused = true)]
    async fn follows_paused_time() {
        let clock = TokioClock::new();
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), Timestamp::from_secs(90));
    }
}
