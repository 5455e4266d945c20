use std::sync::{Mutex, MutexGuard, PoisonError};

/// The wire statement a transaction boundary call maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TxAction {
    Begin,
    Savepoint(String),
    Commit,
    Rollback,
    RollbackTo(String),
}

impl TxAction {
    pub(crate) fn statement(&self) -> String {
        match self {
            TxAction::Begin => "BEGIN".to_string(),
            TxAction::Savepoint(name) => format!("SAVEPOINT {name}"),
            TxAction::Commit => "COMMIT".to_string(),
            TxAction::Rollback => "ROLLBACK".to_string(),
            TxAction::RollbackTo(name) => format!("ROLLBACK TO SAVEPOINT {name}"),
        }
    }
}

/// Transaction nesting tracker. The outermost boundary maps to a real
/// transaction; inner boundaries are emulated with savepoints named
/// `trans{level}` after the level that created them.
///
/// Deciding an action and recording the level change are separate steps
/// so a failed wire statement leaves the level untouched.
#[derive(Debug, Default)]
pub(crate) struct TransactionState {
    depth: Mutex<usize>,
}

impl TransactionState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn level(&self) -> usize {
        *self.lock()
    }

    /// Statement for opening the next boundary at the current level.
    pub(crate) fn begin_action(&self) -> TxAction {
        let depth = *self.lock();
        if depth == 0 {
            TxAction::Begin
        } else {
            TxAction::Savepoint(savepoint_name(depth + 1))
        }
    }

    /// Statement for committing at the current level. Inner commits issue
    /// nothing; the savepoint is simply abandoned.
    pub(crate) fn commit_action(&self) -> Option<TxAction> {
        match *self.lock() {
            1 => Some(TxAction::Commit),
            _ => None,
        }
    }

    /// Statement for rolling back at the current level. `None` when no
    /// transaction is active.
    pub(crate) fn rollback_action(&self) -> Option<TxAction> {
        match *self.lock() {
            0 => None,
            1 => Some(TxAction::Rollback),
            depth => Some(TxAction::RollbackTo(savepoint_name(depth))),
        }
    }

    pub(crate) fn mark_opened(&self) {
        *self.lock() += 1;
    }

    pub(crate) fn mark_closed(&self) {
        let mut depth = self.lock();
        *depth = depth.saturating_sub(1);
    }

    pub(crate) fn reset_to(&self, depth: usize) {
        *self.lock() = depth;
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.depth.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn savepoint_name(depth: usize) -> String {
    format!("trans{depth}")
}
