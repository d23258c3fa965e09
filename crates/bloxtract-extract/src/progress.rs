//! Progress reporting.
//!
//! The progress sink is the engine's user-facing channel: throttled
//! `(done, total, elapsed, rate)` updates plus leveled log events. It is
//! distinct from `tracing`, which carries developer diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Severity of a user-facing log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Phase transitions and routine notices
    Info,
    /// Completed milestones
    Success,
    /// Degraded but continuing (e.g. backend fallback)
    Warning,
    /// Contained failures
    Error,
}

/// One throttled progress update.
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    /// Entries finished so far; monotonically non-decreasing
    pub done: u64,
    /// Total entries in this run
    pub total: u64,
    /// Time since the run started
    pub elapsed: Duration,
    /// Average entries per second over the whole run
    pub rate: f64,
}

/// Receiver for progress updates and log events.
pub trait ProgressSink: Send + Sync {
    /// Called at most ~10 times per second while entries complete.
    fn on_progress(&self, update: ProgressUpdate);

    /// Called for user-facing log events.
    fn on_log(&self, level: LogLevel, message: &str);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _update: ProgressUpdate) {}
    fn on_log(&self, _level: LogLevel, _message: &str) {}
}

/// Minimum spacing between two progress callbacks.
const MIN_REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Throttling wrapper the orchestrator feeds per-entry completions into.
pub(crate) struct ProgressReporter {
    sink: std::sync::Arc<dyn ProgressSink>,
    started: Instant,
    total: u64,
    done: AtomicU64,
    last_report: Mutex<Instant>,
}

impl ProgressReporter {
    pub(crate) fn new(sink: std::sync::Arc<dyn ProgressSink>, total: u64) -> Self {
        let now = Instant::now();
        Self {
            sink,
            started: now,
            total,
            done: AtomicU64::new(0),
            last_report: Mutex::new(now.checked_sub(MIN_REPORT_INTERVAL).unwrap_or(now)),
        }
    }

    /// Record one finished entry, reporting if the throttle window allows.
    pub(crate) fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;

        let now = Instant::now();
        {
            let mut last = self.last_report.lock();
            if now.duration_since(*last) < MIN_REPORT_INTERVAL && done < self.total {
                return;
            }
            *last = now;
        }

        self.report(done);
    }

    /// Emit a final update with the true completion count.
    pub(crate) fn finish(&self) {
        self.report(self.done.load(Ordering::Relaxed));
    }

    pub(crate) fn done_count(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    fn report(&self, done: u64) {
        let elapsed = self.started.elapsed();
        let rate = if elapsed.as_secs_f64() > 0.0 {
            done as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        self.sink.on_progress(ProgressUpdate {
            done,
            total: self.total,
            elapsed,
            rate,
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Default)]
    struct Recording {
        updates: StdMutex<Vec<ProgressUpdate>>,
    }

    impl ProgressSink for Recording {
        fn on_progress(&self, update: ProgressUpdate) {
            self.updates.lock().unwrap().push(update);
        }
        fn on_log(&self, _level: LogLevel, _message: &str) {}
    }

    #[test]
    fn done_is_monotonic_and_final_tick_reports() {
        let sink = Arc::new(Recording::default());
        let reporter = ProgressReporter::new(Arc::clone(&sink) as Arc<dyn ProgressSink>, 5);
        for _ in 0..5 {
            reporter.tick();
        }
        reporter.finish();

        let updates = sink.updates.lock().unwrap();
        assert!(!updates.is_empty());
        let mut previous = 0;
        for update in updates.iter() {
            assert!(update.done >= previous);
            previous = update.done;
        }
        assert_eq!(updates.last().unwrap().done, 5);
    }

    #[test]
    fn throttle_suppresses_rapid_updates() {
        let sink = Arc::new(Recording::default());
        let reporter = ProgressReporter::new(Arc::clone(&sink) as Arc<dyn ProgressSink>, 10_000);
        for _ in 0..10_000 {
            reporter.tick();
        }
        // Far fewer callbacks than ticks
        assert!(sink.updates.lock().unwrap().len() < 100);
    }
}
