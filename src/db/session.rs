//! Durable session records.
//!
//! One row per login. The row carries the refresh signing secret so refresh
//! tokens stay verifiable across cache evictions and restarts; the auth
//! signing secret lives only in the secret cache.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::authority::{BackendError, SessionRepository};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub auth_token: String,
    pub refresh_token: String,
    /// Signing secret for `refresh_token`.
    pub refresh_secret: String,
    pub device_type: i32,
    pub login_ip: String,
    pub login_region: String,
    /// Unix seconds
    pub login_time: i64,
    /// Unix seconds
    pub refresh_expires_at: i64,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    auth_token: String,
    refresh_token: String,
    refresh_secret: String,
    device_type: i64,
    login_ip: String,
    login_region: String,
    login_time: i64,
    refresh_expires_at: i64,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            auth_token: row.auth_token,
            refresh_token: row.refresh_token,
            refresh_secret: row.refresh_secret,
            device_type: row.device_type as i32,
            login_ip: row.login_ip,
            login_region: row.login_region,
            login_time: row.login_time,
            refresh_expires_at: row.refresh_expires_at,
        }
    }
}

/// Store for session rows and the auth tokens they have moved away from.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete rows whose refresh token expired at or before `now` (Unix seconds),
    /// along with their superseded auth tokens.
    pub async fn delete_expired(&self, now: i64) -> Result<u64, BackendError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM sessions WHERE refresh_expires_at <= ?")
            .bind(now)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM superseded_auth_tokens WHERE session_id NOT IN (SELECT id FROM sessions)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionRepository for SessionStore {
    async fn insert(&self, session: &Session) -> Result<(), BackendError> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, auth_token, refresh_token, refresh_secret, device_type, login_ip, login_region, login_time, refresh_expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.auth_token)
        .bind(&session.refresh_token)
        .bind(&session.refresh_secret)
        .bind(session.device_type as i64)
        .bind(&session.login_ip)
        .bind(&session.login_region)
        .bind(session.login_time)
        .bind(session.refresh_expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_tokens(
        &self,
        user_id: &str,
        refresh_token: &str,
        auth_token: &str,
    ) -> Result<Option<Session>, BackendError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, auth_token, refresh_token, refresh_secret, device_type, login_ip, login_region, login_time, refresh_expires_at FROM sessions WHERE user_id = ? AND refresh_token = ? AND auth_token = ?",
        )
        .bind(user_id)
        .bind(refresh_token)
        .bind(auth_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Session::from))
    }

    async fn find_by_auth_token(&self, auth_token: &str) -> Result<Option<Session>, BackendError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, auth_token, refresh_token, refresh_secret, device_type, login_ip, login_region, login_time, refresh_expires_at FROM sessions WHERE auth_token = ?",
        )
        .bind(auth_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Session::from))
    }

    async fn find_by_superseded_auth_token(
        &self,
        auth_token: &str,
    ) -> Result<Option<Session>, BackendError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT s.id, s.user_id, s.auth_token, s.refresh_token, s.refresh_secret, s.device_type, s.login_ip, s.login_region, s.login_time, s.refresh_expires_at
             FROM superseded_auth_tokens t JOIN sessions s ON s.id = t.session_id
             WHERE t.auth_token = ?",
        )
        .bind(auth_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Session::from))
    }

    async fn swap_auth_token(
        &self,
        id: &str,
        old_auth_token: &str,
        new_auth_token: &str,
    ) -> Result<bool, BackendError> {
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("UPDATE sessions SET auth_token = ? WHERE id = ? AND auth_token = ?")
                .bind(new_auth_token)
                .bind(id)
                .bind(old_auth_token)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        // A token swapped back in is current again
        sqlx::query("DELETE FROM superseded_auth_tokens WHERE auth_token = ?")
            .bind(new_auth_token)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT OR REPLACE INTO superseded_auth_tokens (auth_token, session_id) VALUES (?, ?)",
        )
        .bind(old_auth_token)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn remove_by_auth_token(&self, auth_token: &str) -> Result<bool, BackendError> {
        let mut tx = self.pool.begin().await?;

        let removed: Option<(String,)> =
            sqlx::query_as("DELETE FROM sessions WHERE auth_token = ? RETURNING id")
                .bind(auth_token)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((id,)) = removed else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM superseded_auth_tokens WHERE session_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>, BackendError> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, auth_token, refresh_token, refresh_secret, device_type, login_ip, login_region, login_time, refresh_expires_at FROM sessions WHERE user_id = ? ORDER BY login_time DESC, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Session::from).collect())
    }
}
