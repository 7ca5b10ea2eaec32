use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing analysis activity.
#[derive(Default)]
pub struct PipelineMetrics {
    accepted: AtomicU64,
    in_flight: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request handed to the scheduler.
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark an execution as running; the returned guard decrements the gauge on drop.
    pub fn start_execution(&self) -> InFlightGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard { metrics: self }
    }

    /// Record an execution that wrote a `COMPLETED` analysis.
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an execution that ended in the error path.
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Keeps the in-flight gauge raised while a pipeline execution runs.
pub struct InFlightGuard<'a> {
    metrics: &'a PipelineMetrics,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Requests accepted since startup.
    pub accepted: u64,
    /// Executions currently holding a worker slot.
    pub in_flight: u64,
    /// Executions that persisted a completed analysis.
    pub completed: u64,
    /// Executions that recorded an error.
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_tracks_guard_lifetime() {
        let metrics = PipelineMetrics::new();
        metrics.record_accepted();
        {
            let _first = metrics.start_execution();
            let _second = metrics.start_execution();
            assert_eq!(metrics.snapshot().in_flight, 2);
        }
        assert_eq!(metrics.snapshot().in_flight, 0);
        assert_eq!(metrics.snapshot().accepted, 1);
    }

    #[test]
    fn outcome_counters_are_independent() {
        let metrics = PipelineMetrics::new();
        metrics.record_completed();
        metrics.record_completed();
        metrics.record_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.accepted, 0);
    }
}
