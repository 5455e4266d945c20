//! Test doubles for exercising connection-dependent code without a server.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::conn::{QueryLog, TransactionState};
use crate::{value, Connection, Error, QueryLogEntry, Row, Value};

/// A statement captured by [`RecordingConnection`], after binding
/// preparation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub query: String,
    pub bindings: Vec<Value>,
}

/// An in-memory [`Connection`] that records every statement and serves
/// canned rows. Shares the savepoint and query-log machinery with the
/// real connection, so transaction nesting and pretend mode behave the
/// same. Statements are never timed; logged entries carry no elapsed
/// value.
pub struct RecordingConnection {
    statements: Mutex<Vec<RecordedStatement>>,
    responses: Mutex<VecDeque<Vec<Row>>>,
    affected: Mutex<VecDeque<u64>>,
    state: TransactionState,
    log: QueryLog,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self {
            statements: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            affected: Mutex::new(VecDeque::new()),
            state: TransactionState::new(),
            log: QueryLog::new(true),
        }
    }

    /// Queue a row set for the next read query.
    pub fn push_rows(&self, rows: Vec<Row>) {
        lock(&self.responses).push_back(rows);
    }

    /// Queue an affected-row count for the next affecting statement.
    pub fn push_affected(&self, count: u64) {
        lock(&self.affected).push_back(count);
    }

    pub fn recorded(&self) -> Vec<RecordedStatement> {
        lock(&self.statements).clone()
    }

    pub fn recorded_queries(&self) -> Vec<String> {
        lock(&self.statements)
            .iter()
            .map(|statement| statement.query.clone())
            .collect()
    }

    pub fn query_log(&self) -> Vec<QueryLogEntry> {
        self.log.entries()
    }

    fn record(&self, query: &str, bindings: &[Value]) {
        lock(&self.statements).push(RecordedStatement {
            query: query.to_string(),
            bindings: bindings.to_vec(),
        });
        self.log.record(query, bindings, None);
    }
}

impl Default for RecordingConnection {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn fetch_one(&self, query: &str, bindings: &[Value]) -> Result<Option<Row>, Error> {
        Ok(self.fetch(query, bindings).await?.into_iter().next())
    }

    async fn fetch(&self, query: &str, bindings: &[Value]) -> Result<Vec<Row>, Error> {
        let bindings = value::prepare_bindings(bindings);
        self.record(query, &bindings);
        if self.log.is_pretending() {
            return Ok(Vec::new());
        }
        Ok(lock(&self.responses).pop_front().unwrap_or_default())
    }

    async fn execute(&self, query: &str, bindings: &[Value]) -> Result<bool, Error> {
        let bindings = value::prepare_bindings(bindings);
        self.record(query, &bindings);
        Ok(true)
    }

    async fn affecting_statement(&self, query: &str, bindings: &[Value]) -> Result<u64, Error> {
        let bindings = value::prepare_bindings(bindings);
        self.record(query, &bindings);
        if self.log.is_pretending() {
            return Ok(0);
        }
        Ok(lock(&self.affected).pop_front().unwrap_or(0))
    }

    async fn begin_transaction(&self) -> Result<(), Error> {
        let action = self.state.begin_action();
        self.record(&action.statement(), &[]);
        self.state.mark_opened();
        Ok(())
    }

    async fn commit(&self) -> Result<(), Error> {
        if let Some(action) = self.state.commit_action() {
            self.record(&action.statement(), &[]);
        }
        self.state.mark_closed();
        Ok(())
    }

    async fn roll_back(&self) -> Result<(), Error> {
        let Some(action) = self.state.rollback_action() else {
            return Ok(());
        };
        self.record(&action.statement(), &[]);
        self.state.mark_closed();
        Ok(())
    }

    fn transaction_level(&self) -> usize {
        self.state.level()
    }

    async fn pretend<F>(&self, callback: F) -> Result<Vec<QueryLogEntry>, Error>
    where
        F: for<'c> FnOnce(&'c Self) -> BoxFuture<'c, Result<(), Error>> + Send,
        Self: Sized,
    {
        let level_before = self.state.level();
        let snapshot = self.log.start_pretend();
        let result = callback(self).await;
        let captured = self.log.finish_pretend(snapshot);
        self.state.reset_to(level_before);
        result.map(|()| captured)
    }
}
