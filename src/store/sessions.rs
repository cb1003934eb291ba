//! Postgres session store.
//!
//! Table: `sessions (id TEXT PK, data JSONB, expires_at BIGINT)`. Rows past
//! `expires_at` read as absent; nothing deletes them here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::Row;
use std::sync::Arc;
use tracing::Instrument;

use super::{LiveDatabase, SessionStore};
use crate::auth::{Clock, Session, SessionId, SystemClock};

pub struct PgSessionStore {
    db: Arc<LiveDatabase>,
    ttl_seconds: i64,
    clock: Arc<dyn Clock>,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(db: Arc<LiveDatabase>, ttl_seconds: i64) -> Self {
        Self {
            db,
            ttl_seconds,
            clock: Arc::new(SystemClock),
        }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>> {
        let query = "SELECT data::text AS data FROM sessions WHERE id = $1 AND expires_at > $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let pool = self.db.pool().await?;
        let row = sqlx::query(query)
            .bind(id.as_str())
            .bind(self.clock.now_unix())
            .fetch_optional(&pool)
            .instrument(span)
            .await
            .context("failed to load session")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let data: String = row
            .try_get("data")
            .context("failed to decode session data column")?;
        let values: Map<String, Value> =
            serde_json::from_str(&data).context("failed to decode session data")?;

        Ok(Some(Session::from_parts(id.clone(), values)))
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let query = r"
            INSERT INTO sessions (id, data, expires_at)
            VALUES ($1, $2::jsonb, $3)
            ON CONFLICT (id) DO UPDATE
            SET data = EXCLUDED.data, expires_at = EXCLUDED.expires_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.statement = query
        );
        let data =
            serde_json::to_string(session.values()).context("failed to encode session data")?;
        let expires_at = self.clock.now_unix().saturating_add(self.ttl_seconds);
        let pool = self.db.pool().await?;
        sqlx::query(query)
            .bind(session.id().as_str())
            .bind(data)
            .bind(expires_at)
            .execute(&pool)
            .instrument(span)
            .await
            .context("failed to save session")?;

        Ok(())
    }
}
