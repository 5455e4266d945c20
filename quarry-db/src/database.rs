use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tokio::time::timeout;

use crate::{Config, Error, PostgresConnection};

pub type PgPool = Pool<Postgres>;

/// Connection-pool wrapper and factory for logical sessions.
#[derive(Clone, Debug)]
pub struct Database {
    pool: PgPool,
    config: Config,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        Self::connect_with(Config::new(database_url)).await
    }

    pub async fn connect_with(config: Config) -> Result<Self, Error> {
        let options = PgPoolOptions::new().max_connections(config.max_connections);
        let pool = timeout(config.connect_timeout(), options.connect(&config.url))
            .await
            .map_err(|_| Error::Configuration("connection timed out".to_string()))?
            .map_err(Error::Database)?;
        Ok(Self { pool, config })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check a connection out of the pool and pin it to a logical session.
    /// Transaction state on the session stays on that one physical
    /// connection until it is dropped back into the pool.
    pub async fn connection(&self) -> Result<PostgresConnection, Error> {
        let conn = self.pool.acquire().await?;
        Ok(PostgresConnection::new(conn, self.config.log_queries))
    }
}
