mod log;
mod postgres;
mod savepoints;

use async_trait::async_trait;
use futures::future::BoxFuture;

pub use log::QueryLogEntry;
pub use postgres::PostgresConnection;

pub(crate) use log::QueryLog;
pub(crate) use savepoints::TransactionState;

use crate::{value, Error, Expression, QueryBuilder, Row, Value};

/// A logical database session: runs queries, manages transaction
/// boundaries, and can execute in dry-run mode.
///
/// Read and write paths take the query text plus a binding slice; pass
/// `&[]` when a statement has no parameters. Transaction nesting is
/// emulated with savepoints, so [`Connection::transaction_level`] counts
/// open boundaries rather than server-side transactions.
///
/// # Example
/// ```no_run
/// use quarry_db::prelude::*;
///
/// # async fn demo() -> Result<(), quarry_db::Error> {
/// let db = Database::connect("postgres://localhost/app").await?;
/// let conn = db.connection().await?;
///
/// let _user = conn
///     .fetch_one("SELECT * FROM users WHERE id = $1", &[Value::Int(1)])
///     .await?;
///
/// conn.transaction(|conn| {
///     Box::pin(async move {
///         conn.table("audits")
///             .insert(vec![("event", Value::from("login"))])
///             .await?;
///         Ok(())
///     })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Connection: Send + Sync {
    /// Begin a fluent query against a database table.
    fn table(&self, table: impl Into<String>) -> QueryBuilder<'_, Self>
    where
        Self: Sized,
    {
        QueryBuilder::new(self, table)
    }

    /// Get a new raw query expression.
    fn raw(&self, value: impl Into<String>) -> Expression {
        Expression::new(value)
    }

    /// Run a read query and return a single row, if any.
    async fn fetch_one(&self, query: &str, bindings: &[Value]) -> Result<Option<Row>, Error>;

    /// Run a read query and return every row.
    async fn fetch(&self, query: &str, bindings: &[Value]) -> Result<Vec<Row>, Error>;

    /// Alias of [`Connection::fetch`], kept for callers of the older name.
    async fn fetch_all(&self, query: &str, bindings: &[Value]) -> Result<Vec<Row>, Error> {
        self.fetch(query, bindings).await
    }

    /// Execute a statement and report whether it ran.
    async fn execute(&self, query: &str, bindings: &[Value]) -> Result<bool, Error>;

    /// Execute a statement and return the number of rows it affected.
    async fn affecting_statement(&self, query: &str, bindings: &[Value]) -> Result<u64, Error>;

    /// Normalize parameter values before execution.
    fn prepare_bindings(&self, bindings: &[Value]) -> Vec<Value> {
        value::prepare_bindings(bindings)
    }

    /// Start a transaction boundary, nesting with a savepoint when one is
    /// already open.
    async fn begin_transaction(&self) -> Result<(), Error>;

    /// Commit the current boundary. Only the outermost commit reaches the
    /// database; inner commits just close their level.
    async fn commit(&self) -> Result<(), Error>;

    /// Roll back the current boundary, targeting its savepoint when
    /// nested. No-op when no transaction is active.
    async fn roll_back(&self) -> Result<(), Error>;

    /// Number of open transaction boundaries.
    fn transaction_level(&self) -> usize;

    /// Run the callback inside a transaction: commit on `Ok`, roll back on
    /// `Err` and surface the callback's error.
    async fn transaction<T, F>(&self, callback: F) -> Result<T, Error>
    where
        T: Send,
        F: for<'c> FnOnce(&'c Self) -> BoxFuture<'c, Result<T, Error>> + Send,
        Self: Sized,
    {
        self.begin_transaction().await?;
        match callback(self).await {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.roll_back().await {
                    tracing::error!(error = %rollback_err, "rollback after failed transaction callback also failed");
                }
                Err(err)
            }
        }
    }

    /// Execute the callback in dry-run mode: statements are recorded, not
    /// run. Returns the captured log.
    async fn pretend<F>(&self, callback: F) -> Result<Vec<QueryLogEntry>, Error>
    where
        F: for<'c> FnOnce(&'c Self) -> BoxFuture<'c, Result<(), Error>> + Send,
        Self: Sized;
}
