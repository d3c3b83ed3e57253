use std::time::Duration;
use tokio::time::Instant;

/// Absolute point in time by which a cache-backed operation must finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Deadline(Instant::now() + timeout)
    }

    pub fn at(instant: Instant) -> Self {
        Deadline(instant)
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.0
    }
}
