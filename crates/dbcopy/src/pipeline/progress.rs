//! Per-phase progress reporting.
//!
//! Each phase holds a [`PhaseGuard`] for its whole loop. Workers record
//! finished tables on it concurrently; when the guard drops, on success or
//! on error, the reporter is told the phase is over.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Pipeline phases, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Schema,
    Data,
    Indexes,
    Verify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Schema => "Schema copy",
            Phase::Data => "Data copy",
            Phase::Indexes => "Index copy",
            Phase::Verify => "Verify data",
        };
        f.write_str(label)
    }
}

/// Progress update, also the JSON line format of [`JsonProgress`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub phase: Phase,
    /// "started", "table" or "finished".
    pub event: String,
    /// Table just finished, for "table" events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub tables_total: usize,
    pub tables_completed: usize,
    /// Rows (data, verify) or indexes (indexes) handled so far.
    pub items: u64,
    /// Whether the phase ran to completion; "finished" events only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
}

/// Receives progress updates. Called from concurrent workers.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: &ProgressUpdate);
}

/// Logs progress through `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, update: &ProgressUpdate) {
        match update.event.as_str() {
            "started" => info!("{}: {} tables", update.phase, update.tables_total),
            "table" => info!(
                "{}: {} done ({}/{})",
                update.phase,
                update.table.as_deref().unwrap_or("?"),
                update.tables_completed,
                update.tables_total
            ),
            _ if update.completed == Some(false) => warn!(
                "{} aborted after {}/{} tables",
                update.phase, update.tables_completed, update.tables_total
            ),
            _ => info!(
                "{} finished: {} tables, {} items in {:.1}s",
                update.phase,
                update.tables_completed,
                update.items,
                update.elapsed_seconds.unwrap_or_default()
            ),
        }
    }
}

/// Writes each update as one JSON line on stderr.
#[derive(Debug, Default)]
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, update: &ProgressUpdate) {
        match serde_json::to_string(update) {
            Ok(line) => eprintln!("{}", line),
            Err(e) => warn!("Failed to serialize progress update: {}", e),
        }
    }
}

/// Discards progress.
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _update: &ProgressUpdate) {}
}

/// Tracks one phase. Reports "finished" when dropped.
pub struct PhaseGuard<'a> {
    phase: Phase,
    reporter: &'a dyn ProgressReporter,
    tables_total: usize,
    tables_completed: AtomicUsize,
    items: AtomicU64,
    completed: AtomicBool,
    started: Instant,
}

impl<'a> PhaseGuard<'a> {
    pub fn start(phase: Phase, tables_total: usize, reporter: &'a dyn ProgressReporter) -> Self {
        let guard = Self {
            phase,
            reporter,
            tables_total,
            tables_completed: AtomicUsize::new(0),
            items: AtomicU64::new(0),
            completed: AtomicBool::new(false),
            started: Instant::now(),
        };
        guard.emit("started", None);
        guard
    }

    /// Record a finished table and the items it contributed.
    pub fn table_done(&self, table: &str, items: u64) {
        self.tables_completed.fetch_add(1, Ordering::Relaxed);
        self.items.fetch_add(items, Ordering::Relaxed);
        self.emit("table", Some(table));
    }

    /// Mark the phase as having run to completion.
    pub fn complete(&self) {
        self.completed.store(true, Ordering::Relaxed);
    }

    pub fn tables_completed(&self) -> usize {
        self.tables_completed.load(Ordering::Relaxed)
    }

    pub fn items(&self) -> u64 {
        self.items.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn emit(&self, event: &str, table: Option<&str>) {
        let finished = event == "finished";
        self.reporter.report(&ProgressUpdate {
            phase: self.phase,
            event: event.to_string(),
            table: table.map(str::to_string),
            tables_total: self.tables_total,
            tables_completed: self.tables_completed(),
            items: self.items(),
            completed: finished.then(|| self.completed.load(Ordering::Relaxed)),
            elapsed_seconds: finished.then(|| self.elapsed().as_secs_f64()),
        });
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.emit("finished", None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressUpdate>>);

    impl ProgressReporter for Recorder {
        fn report(&self, update: &ProgressUpdate) {
            self.0.lock().unwrap().push(update.clone());
        }
    }

    #[test]
    fn test_guard_reports_start_tables_and_finish() {
        let recorder = Recorder::default();
        {
            let guard = PhaseGuard::start(Phase::Data, 2, &recorder);
            guard.table_done("a", 10);
            guard.table_done("b", 5);
            guard.complete();
        }
        let updates = recorder.0.lock().unwrap();
        let events: Vec<&str> = updates.iter().map(|u| u.event.as_str()).collect();
        assert_eq!(events, vec!["started", "table", "table", "finished"]);

        let last = updates.last().unwrap();
        assert_eq!(last.items, 15);
        assert_eq!(last.tables_completed, 2);
        assert_eq!(last.completed, Some(true));
    }

    #[test]
    fn test_guard_reports_finish_on_early_exit() {
        fn failing_phase(reporter: &dyn ProgressReporter) -> Result<(), String> {
            let guard = PhaseGuard::start(Phase::Schema, 3, reporter);
            guard.table_done("a", 1);
            Err("boom".into())
        }

        let recorder = Recorder::default();
        assert!(failing_phase(&recorder).is_err());
        let updates = recorder.0.lock().unwrap();
        let last = updates.last().unwrap();
        assert_eq!(last.event, "finished");
        assert_eq!(last.completed, Some(false));
        assert_eq!(last.tables_completed, 1);
    }

    #[test]
    fn test_progress_update_json_shape() {
        let update = ProgressUpdate {
            phase: Phase::Indexes,
            event: "started".into(),
            table: None,
            tables_total: 4,
            tables_completed: 0,
            items: 0,
            completed: None,
            elapsed_seconds: None,
        };
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(
            json,
            r#"{"phase":"indexes","event":"started","tables_total":4,"tables_completed":0,"items":0}"#
        );
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(Phase::Schema.to_string(), "Schema copy");
        assert_eq!(Phase::Verify.to_string(), "Verify data");
    }
}
