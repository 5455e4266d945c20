use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::Value;

/// One recorded statement. `elapsed` is `None` when the statement was only
/// pretended and never reached the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryLogEntry {
    pub query: String,
    pub bindings: Vec<Value>,
    pub elapsed: Option<Duration>,
}

/// Saved flags and entries around a pretend bracket.
pub(crate) struct PretendSnapshot {
    saved_entries: Vec<QueryLogEntry>,
    was_enabled: bool,
    was_pretending: bool,
}

/// Shared recording state: whether statements are logged, whether they are
/// executed at all, and the captured entries.
#[derive(Debug, Default)]
pub(crate) struct QueryLog {
    enabled: AtomicBool,
    pretending: AtomicBool,
    entries: Mutex<Vec<QueryLogEntry>>,
}

impl QueryLog {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            pretending: AtomicBool::new(false),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn is_pretending(&self) -> bool {
        self.pretending.load(Ordering::SeqCst)
    }

    /// Record a statement if logging is on. No-op otherwise.
    pub(crate) fn record(&self, query: &str, bindings: &[Value], elapsed: Option<Duration>) {
        if !self.is_enabled() {
            return;
        }
        self.lock().push(QueryLogEntry {
            query: query.to_string(),
            bindings: bindings.to_vec(),
            elapsed,
        });
    }

    pub(crate) fn entries(&self) -> Vec<QueryLogEntry> {
        self.lock().clone()
    }

    pub(crate) fn flush(&self) {
        self.lock().clear();
    }

    /// Enter dry-run mode with a fresh buffer. Existing entries are parked
    /// in the snapshot and restored by [`QueryLog::finish_pretend`].
    pub(crate) fn start_pretend(&self) -> PretendSnapshot {
        let was_enabled = self.enabled.swap(true, Ordering::SeqCst);
        let was_pretending = self.pretending.swap(true, Ordering::SeqCst);
        let saved_entries = mem::take(&mut *self.lock());
        PretendSnapshot {
            saved_entries,
            was_enabled,
            was_pretending,
        }
    }

    /// Leave dry-run mode, restore the parked entries and flags, and hand
    /// back what the bracket captured.
    pub(crate) fn finish_pretend(&self, snapshot: PretendSnapshot) -> Vec<QueryLogEntry> {
        self.pretending
            .store(snapshot.was_pretending, Ordering::SeqCst);
        self.enabled.store(snapshot.was_enabled, Ordering::SeqCst);
        mem::replace(&mut *self.lock(), snapshot.saved_entries)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueryLogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_respects_the_enabled_flag() {
        let log = QueryLog::new(false);
        log.record("SELECT 1", &[], None);
        assert!(log.entries().is_empty());

        log.enable();
        log.record("SELECT 1", &[], Some(Duration::from_millis(3)));
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.entries()[0].query, "SELECT 1");

        log.flush();
        assert!(log.entries().is_empty());
    }

    #[test]
    fn pretend_bracket_captures_only_its_own_statements() {
        let log = QueryLog::new(true);
        log.record("SELECT 1", &[], Some(Duration::from_millis(1)));

        let snapshot = log.start_pretend();
        assert!(log.is_pretending());
        log.record("INSERT INTO t VALUES ($1)", &[Value::Int(1)], None);
        let captured = log.finish_pretend(snapshot);

        assert!(!log.is_pretending());
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].query, "INSERT INTO t VALUES ($1)");
        assert_eq!(captured[0].elapsed, None);

        let remaining = log.entries();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].query, "SELECT 1");
    }

    #[test]
    fn pretend_forces_logging_on_and_restores_it_after() {
        let log = QueryLog::new(false);
        let snapshot = log.start_pretend();
        assert!(log.is_enabled());
        log.record("DELETE FROM t", &[], None);
        let captured = log.finish_pretend(snapshot);
        assert_eq!(captured.len(), 1);
        assert!(!log.is_enabled());
    }
}
