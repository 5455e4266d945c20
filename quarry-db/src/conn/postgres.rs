use std::time::Instant;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use tokio::sync::Mutex;

use super::log::QueryLog;
use super::savepoints::{TransactionState, TxAction};
use crate::{value, Connection, Error, QueryLogEntry, Row, Value};

/// A logical session pinned to one physical PostgreSQL connection.
///
/// The underlying sqlx handle is checked out of the pool for the lifetime
/// of this value and serializes statements behind an async mutex, so
/// transaction state always refers to the same server session.
pub struct PostgresConnection {
    conn: Mutex<PoolConnection<Postgres>>,
    state: TransactionState,
    log: QueryLog,
}

impl PostgresConnection {
    pub(crate) fn new(conn: PoolConnection<Postgres>, log_queries: bool) -> Self {
        Self {
            conn: Mutex::new(conn),
            state: TransactionState::new(),
            log: QueryLog::new(log_queries),
        }
    }

    pub fn enable_query_log(&self) {
        self.log.enable();
    }

    pub fn disable_query_log(&self) {
        self.log.disable();
    }

    /// Entries recorded so far. Pretended statements carry no elapsed time.
    pub fn query_log(&self) -> Vec<QueryLogEntry> {
        self.log.entries()
    }

    pub fn flush_query_log(&self) {
        self.log.flush();
    }

    pub fn pretending(&self) -> bool {
        self.log.is_pretending()
    }

    async fn run_fetch(&self, query: &str, bindings: &[Value]) -> Result<Vec<Row>, Error> {
        let bindings = value::prepare_bindings(bindings);
        if self.log.is_pretending() {
            self.log.record(query, &bindings, None);
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let pg_rows = {
            let mut conn = self.conn.lock().await;
            bind_values(query, &bindings).fetch_all(&mut **conn).await?
        };
        let elapsed = started.elapsed();
        self.log.record(query, &bindings, Some(elapsed));
        tracing::debug!(target: "quarry_db::query", %query, rows = pg_rows.len(), ?elapsed, "fetched");
        pg_rows.iter().map(Row::from_pg).collect()
    }

    async fn run_execute(&self, query: &str, bindings: &[Value]) -> Result<u64, Error> {
        let bindings = value::prepare_bindings(bindings);
        if self.log.is_pretending() {
            self.log.record(query, &bindings, None);
            return Ok(0);
        }
        let started = Instant::now();
        let result = {
            let mut conn = self.conn.lock().await;
            bind_values(query, &bindings).execute(&mut **conn).await?
        };
        let elapsed = started.elapsed();
        self.log.record(query, &bindings, Some(elapsed));
        tracing::debug!(
            target: "quarry_db::query",
            %query,
            rows_affected = result.rows_affected(),
            ?elapsed,
            "executed"
        );
        Ok(result.rows_affected())
    }

    async fn run_control(&self, action: &TxAction) -> Result<(), Error> {
        let statement = action.statement();
        if self.log.is_pretending() {
            self.log.record(&statement, &[], None);
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        sqlx::query(&statement).execute(&mut **conn).await?;
        tracing::debug!(target: "quarry_db::query", query = %statement, "transaction control");
        Ok(())
    }
}

fn bind_values<'q>(query: &'q str, bindings: &'q [Value]) -> Query<'q, Postgres, PgArguments> {
    let mut prepared = sqlx::query(query);
    for value in bindings {
        prepared = match value {
            Value::Null => prepared.bind(Option::<String>::None),
            Value::Bool(v) => prepared.bind(*v),
            Value::Int(v) => prepared.bind(*v),
            Value::Float(v) => prepared.bind(*v),
            Value::Text(v) => prepared.bind(v.as_str()),
            Value::Bytes(v) => prepared.bind(v.as_slice()),
            Value::Uuid(v) => prepared.bind(*v),
            Value::Timestamp(v) => prepared.bind(*v),
            Value::Json(v) => prepared.bind(v),
        };
    }
    prepared
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn fetch_one(&self, query: &str, bindings: &[Value]) -> Result<Option<Row>, Error> {
        Ok(self.run_fetch(query, bindings).await?.into_iter().next())
    }

    async fn fetch(&self, query: &str, bindings: &[Value]) -> Result<Vec<Row>, Error> {
        self.run_fetch(query, bindings).await
    }

    async fn execute(&self, query: &str, bindings: &[Value]) -> Result<bool, Error> {
        self.run_execute(query, bindings).await.map(|_| true)
    }

    async fn affecting_statement(&self, query: &str, bindings: &[Value]) -> Result<u64, Error> {
        self.run_execute(query, bindings).await
    }

    async fn begin_transaction(&self) -> Result<(), Error> {
        let action = self.state.begin_action();
        self.run_control(&action).await?;
        self.state.mark_opened();
        Ok(())
    }

    async fn commit(&self) -> Result<(), Error> {
        if let Some(action) = self.state.commit_action() {
            self.run_control(&action).await?;
        }
        self.state.mark_closed();
        Ok(())
    }

    async fn roll_back(&self) -> Result<(), Error> {
        let Some(action) = self.state.rollback_action() else {
            return Ok(());
        };
        self.run_control(&action).await?;
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
