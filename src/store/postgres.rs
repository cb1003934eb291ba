//! Postgres credential store.
//!
//! Expected tables:
//! - `user_types (user_type_id INT PK, user_type_name VARCHAR(50) UNIQUE)`
//! - `users (user_id BIGINT PK, email VARCHAR(255) UNIQUE, mobile_number VARCHAR(20) UNIQUE,
//!   user_type_id INT, is_active BOOLEAN DEFAULT TRUE, created_at, last_login TIMESTAMPTZ,
//!   last_accessed_from VARCHAR(39))`
//!
//! `email` and `is_active` are nullable: a missing email decodes as empty and a
//! missing flag as inactive.
//! - `otp_requests (otp_request_id BIGSERIAL PK, user_id BIGINT, otp_code VARCHAR(24),
//!   requested_at BIGINT, delivery_method VARCHAR(10), valid_till BIGINT,
//!   session_id VARCHAR(1024), UNIQUE (user_id, otp_code, session_id))`

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, Row};
use std::sync::Arc;
use tracing::Instrument;

use super::{CredentialStore, LiveDatabase, NewOtpRequest, OtpRequest, User, UserType};
use crate::auth::SessionId;

const LAST_ACCESSED_FROM_MAX: usize = 39;

pub struct PgCredentialStore {
    db: Arc<LiveDatabase>,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(db: Arc<LiveDatabase>) -> Self {
        Self { db }
    }
}

fn query_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(user_from_columns(
        row.try_get("user_id").context("failed to decode user_id")?,
        row.try_get("email").context("failed to decode email")?,
        row.try_get("mobile_number")
            .context("failed to decode mobile_number")?,
        row.try_get("user_type_id")
            .context("failed to decode user_type_id")?,
        row.try_get("is_active").context("failed to decode is_active")?,
    ))
}

fn user_from_columns(
    id: i64,
    email: Option<String>,
    mobile_number: Option<String>,
    user_type_id: i32,
    is_active: Option<bool>,
) -> User {
    User {
        id,
        email: email.unwrap_or_default(),
        mobile_number,
        user_type_id,
        is_active: is_active.unwrap_or(false),
    }
}

fn otp_request_from_row(row: &PgRow) -> Result<OtpRequest> {
    Ok(OtpRequest {
        id: row
            .try_get("otp_request_id")
            .context("failed to decode otp_request_id")?,
        user_id: row.try_get("user_id").context("failed to decode user_id")?,
        code: row.try_get("otp_code").context("failed to decode otp_code")?,
        delivery_method: row
            .try_get::<Option<String>, _>("delivery_method")
            .context("failed to decode delivery_method")?
            .unwrap_or_default(),
        requested_at: row
            .try_get("requested_at")
            .context("failed to decode requested_at")?,
        valid_till: row
            .try_get("valid_till")
            .context("failed to decode valid_till")?,
        session_binding: row
            .try_get("session_id")
            .context("failed to decode session_id")?,
        user_email: row
            .try_get::<Option<String>, _>("email")
            .context("failed to decode email")?
            .unwrap_or_default(),
        user_type_id: row
            .try_get("user_type_id")
            .context("failed to decode user_type_id")?,
    })
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn ensure_live(&self) -> Result<()> {
        self.db.pool().await.map(|_| ())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = r"
            SELECT user_id, email, mobile_number, user_type_id, is_active
            FROM users
            WHERE email = $1 AND is_active
        ";
        let pool = self.db.pool().await?;
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup user by email")?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_id_and_role(
        &self,
        user_id: i64,
        user_type_id: i32,
    ) -> Result<Option<User>> {
        let query = r"
            SELECT user_id, email, mobile_number, user_type_id, is_active
            FROM users
            WHERE user_id = $1 AND user_type_id = $2
        ";
        let pool = self.db.pool().await?;
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(user_type_id)
            .fetch_optional(&pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup user by id and role")?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_type(&self, user_type_id: i32) -> Result<Option<UserType>> {
        let query = "SELECT user_type_id, user_type_name FROM user_types WHERE user_type_id = $1";
        let pool = self.db.pool().await?;
        let row = sqlx::query(query)
            .bind(user_type_id)
            .fetch_optional(&pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup user type")?;

        row.map(|row| -> Result<UserType> {
            Ok(UserType {
                id: row
                    .try_get("user_type_id")
                    .context("failed to decode user_type_id")?,
                name: row
                    .try_get::<Option<String>, _>("user_type_name")
                    .context("failed to decode user_type_name")?
                    .unwrap_or_default(),
            })
        })
        .transpose()
    }

    async fn insert_otp_request(&self, request: &NewOtpRequest<'_>) -> Result<i64> {
        let query = r"
            INSERT INTO otp_requests
                (user_id, otp_code, delivery_method, session_id, requested_at, valid_till)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING otp_request_id
        ";
        let pool = self.db.pool().await?;
        let row = sqlx::query(query)
            .bind(request.user_id)
            .bind(request.code)
            .bind(request.delivery_method.as_str())
            .bind(request.session_binding.as_str())
            .bind(request.requested_at)
            .bind(request.valid_till)
            .fetch_one(&pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert OTP request")?;

        row.try_get("otp_request_id")
            .context("failed to decode otp_request_id")
    }

    async fn find_valid_otp(
        &self,
        email: &str,
        code: &str,
        session_binding: &SessionId,
        now: i64,
    ) -> Result<Option<OtpRequest>> {
        // Valid while now < valid_till; the deadline second itself is expired.
        let query = r"
            SELECT otr.otp_request_id, otr.user_id, otr.otp_code, otr.delivery_method,
                   otr.requested_at, otr.valid_till, otr.session_id,
                   u.email, u.user_type_id
            FROM otp_requests AS otr
            JOIN users AS u ON otr.user_id = u.user_id
            WHERE u.email = $1
              AND otr.otp_code = $2
              AND otr.session_id = $3
              AND otr.valid_till > $4
            ORDER BY otr.otp_request_id DESC
            LIMIT 1
        ";
        let pool = self.db.pool().await?;
        let row = sqlx::query(query)
            .bind(email)
            .bind(code)
            .bind(session_binding.as_str())
            .bind(now)
            .fetch_optional(&pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup OTP request")?;

        row.as_ref().map(otp_request_from_row).transpose()
    }

    async fn record_login(&self, user_id: i64, origin: Option<&str>) -> Result<()> {
        let query = r"
            UPDATE users
            SET last_login = NOW(), last_accessed_from = $2
            WHERE user_id = $1
        ";
        let origin: String = origin
            .unwrap_or_default()
            .chars()
            .take(LAST_ACCESSED_FROM_MAX)
            .collect();
        let pool = self.db.pool().await?;
        sqlx::query(query)
            .bind(user_id)
            .bind(origin)
            .execute(&pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to record login")?;

        Ok(())
    }
}
