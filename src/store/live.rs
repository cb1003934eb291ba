//! Guarded access to the shared Postgres pool.
//!
//! Every store call goes through [`LiveDatabase::pool`]: the current pool is
//! probed with a ping, and if the connection is gone the pool is closed and
//! replaced before the caller gets a handle. A saturated pool that only timed
//! out is reported as an error and left open, since other requests still use it.

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{postgres::PgPoolOptions, Connection, PgPool};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct LiveDatabase {
    dsn: SecretString,
    pool: RwLock<PgPool>,
}

impl LiveDatabase {
    /// Connect a new pool.
    ///
    /// # Errors
    /// Returns an error if the database can't be reached.
    pub async fn connect(dsn: SecretString) -> Result<Self> {
        let pool = connect_pool(&dsn).await?;
        Ok(Self {
            dsn,
            pool: RwLock::new(pool),
        })
    }

    /// Return a pool that just answered a ping, reconnecting if needed.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable even after reconnecting.
    pub async fn pool(&self) -> Result<PgPool> {
        let current = self.pool.read().await.clone();
        match ping(&current).await {
            Ok(()) => return Ok(current),
            Err(err) if is_connection_error(&err) => {
                warn!("database is disconnected ({err}), reconnecting");
            }
            Err(err) => return Err(err).context("database ping failed"),
        }

        let mut guard = self.pool.write().await;
        // Another request may have replaced the pool while we waited.
        match ping(&guard).await {
            Ok(()) => {
                debug!("database was reconnected by a concurrent request");
                return Ok(guard.clone());
            }
            Err(err) if !is_connection_error(&err) => {
                return Err(err).context("database ping failed");
            }
            Err(_) => {}
        }

        guard.close().await;
        let fresh = connect_pool(&self.dsn)
            .await
            .context("failed to reconnect to database")?;
        *guard = fresh.clone();
        info!("database is connected");

        Ok(fresh)
    }
}

async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut connection = pool.acquire().await?;
    connection.ping().await
}

/// Only a lost connection warrants a new pool; `PoolTimedOut` means busy.
fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed
    )
}

async fn connect_pool(dsn: &SecretString) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .acquire_timeout(Duration::from_secs(5))
        .connect(dsn.expose_secret())
        .await
        .context("Failed to connect to database")
}
