use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Arrivals this much earlier than the expected period still count as on time.
pub const TOLERANCE: Duration = Duration::from_millis(50);

/// Tracks how regularly an expected line arrives.
#[derive(Debug)]
pub struct CadenceTracker {
    expected: Duration,
    last: Option<Instant>,
    count: u64,
    early: u64,
    min: Option<Duration>,
    total: Duration,
}

#[derive(Debug, PartialEq, Eq)]
pub struct CadenceSummary {
    pub count: u64,
    pub early: u64,
    pub min: Option<Duration>,
    pub avg: Option<Duration>,
}

impl CadenceTracker {
    pub fn new(expected: Duration) -> Self {
        Self {
            expected,
            last: None,
            count: 0,
            early: 0,
            min: None,
            total: Duration::ZERO,
        }
    }

    /// Records an arrival and returns the interval since the previous one.
    pub fn record(&mut self, at: Instant) -> Option<Duration> {
        self.count += 1;
        let interval = self.last.map(|last| at.saturating_duration_since(last));
        self.last = Some(at);

        if let Some(interval) = interval {
            self.total += interval;
            self.min = Some(self.min.map_or(interval, |m| m.min(interval)));
            if self.is_early(interval) {
                self.early += 1;
            }
        }
        interval
    }

    pub fn is_early(&self, interval: Duration) -> bool {
        interval + TOLERANCE < self.expected
    }

    pub fn expected(&self) -> Duration {
        self.expected
    }

    pub fn summary(&self) -> CadenceSummary {
        let intervals = self.count.saturating_sub(1);
        let avg = u32::try_from(intervals)
            .ok()
            .filter(|&n| n > 0)
            .map(|n| self.total / n);
        CadenceSummary {
            count: self.count,
            early: self.early,
            min: self.min,
            avg,
        }
    }
}

impl fmt::Display for CadenceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} received", self.count)?;
        if let (Some(min), Some(avg)) = (self.min, self.avg) {
            write!(
                f,
                ", interval min {}ms avg {}ms",
                min.as_millis(),
                avg.as_millis()
            )?;
        }
        if self.early > 0 {
            write!(f, ", {} early", self.early)?;
        }
        Ok(())
    }
}
