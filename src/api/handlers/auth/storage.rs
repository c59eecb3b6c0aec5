//! Persistence for users, roles and sessions.
//!
//! Two traits split the surface: [`CredentialStore`] for accounts and roles,
//! [`SessionStore`] for refresh sessions. The Postgres implementations live here;
//! handlers only see the traits.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::models::{BoundedInsert, CreateUserOutcome, NewSession, NewUser, Role, Session, User};
use super::utils::is_unique_violation;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Active (not soft-deleted) user by normalized email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Active user by id.
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Active role by id.
    async fn find_role(&self, role_id: Uuid) -> Result<Option<Role>>;

    async fn find_role_by_title(&self, title: &str) -> Result<Option<Role>>;

    /// Insert the user and its profile atomically.
    async fn create_user(&self, user: NewUser) -> Result<CreateUserOutcome>;

    /// Mark the user deleted. Returns `false` if no active user matched.
    async fn soft_delete_user(&self, user_id: Uuid) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Non-revoked sessions for `user_id`, oldest first.
    async fn list_active(&self, user_id: Uuid) -> Result<Vec<Session>>;

    /// Insert `session` after revoking enough of the owner's oldest active sessions
    /// to keep the count at or below `max_sessions`. Concurrent calls for the same
    /// owner are serialized.
    async fn insert_bounded(&self, session: NewSession, max_sessions: usize)
        -> Result<BoundedInsert>;

    /// Non-revoked, unexpired session matching the owner and token hash.
    async fn find_active(&self, user_id: Uuid, refresh_token_hash: &str)
        -> Result<Option<Session>>;

    /// Swap the stored hash only if it still equals `current_hash`.
    async fn replace_refresh_hash(
        &self,
        session_id: Uuid,
        current_hash: &str,
        new_hash: &str,
    ) -> Result<Option<Session>>;

    /// Returns `false` if no live session matched.
    async fn revoke(&self, session_id: Uuid) -> Result<bool>;

    /// Like [`SessionStore::revoke`] but only for a session owned by `user_id`.
    async fn revoke_owned(&self, user_id: Uuid, session_id: Uuid) -> Result<bool>;

    /// Remove every session for `user_id`; returns how many were removed.
    async fn delete_all_for(&self, user_id: Uuid) -> Result<u64>;
}

/// Ids to revoke so that, after one insert, at most `max_sessions` remain active.
///
/// `active` must be ordered oldest first.
pub(super) fn sessions_to_evict(active: &[Uuid], max_sessions: usize) -> &[Uuid] {
    let excess = (active.len() + 1).saturating_sub(max_sessions.max(1));
    &active[..excess.min(active.len())]
}

const USER_COLUMNS: &str = "id, email, password_hash, role_id, is_deleted";
const ROLE_COLUMNS: &str = "id, title, permissions, is_deleted";
const SESSION_COLUMNS: &str =
    "id, user_id, refresh_token_hash, user_agent, ip_address, created_at, expires_at, is_revoked";

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role_id: row.get("role_id"),
        is_deleted: row.get("is_deleted"),
    }
}

fn role_from_row(row: &PgRow) -> Role {
    Role {
        id: row.get("id"),
        title: row.get("title"),
        permissions: row.get("permissions"),
        is_deleted: row.get("is_deleted"),
    }
}

fn session_from_row(row: &PgRow) -> Session {
    Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        refresh_token_hash: row.get("refresh_token_hash"),
        user_agent: row.get("user_agent"),
        ip_address: row.get("ip_address"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        is_revoked: row.get("is_revoked"),
    }
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND NOT is_deleted");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup user by email")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND NOT is_deleted");
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup user")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_role(&self, role_id: Uuid) -> Result<Option<Role>> {
        let query = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1 AND NOT is_deleted");
        let row = sqlx::query(&query)
            .bind(role_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup role")?;
        Ok(row.as_ref().map(role_from_row))
    }

    async fn find_role_by_title(&self, title: &str) -> Result<Option<Role>> {
        let query =
            format!("SELECT {ROLE_COLUMNS} FROM roles WHERE title = $1 AND NOT is_deleted");
        let row = sqlx::query(&query)
            .bind(title)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup role by title")?;
        Ok(row.as_ref().map(role_from_row))
    }

    async fn create_user(&self, user: NewUser) -> Result<CreateUserOutcome> {
        let mut tx = self.pool.begin().await.context("begin create user transaction")?;

        let query = format!(
            "INSERT INTO users (id, email, password_hash, role_id) VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(Uuid::now_v7())
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role_id)
            .fetch_one(&mut *tx)
            .instrument(db_span("INSERT", &query))
            .await;

        let created = match row {
            Ok(row) => user_from_row(&row),
            Err(err) => {
                if is_unique_violation(&err) {
                    let _ = tx.rollback().await;
                    return Ok(CreateUserOutcome::Conflict);
                }
                return Err(err).context("failed to insert user");
            }
        };

        let query = r"
            INSERT INTO profiles (user_id, full_name, address, phone)
            VALUES ($1, $2, $3, $4)
        ";
        sqlx::query(query)
            .bind(created.id)
            .bind(&user.profile.full_name)
            .bind(user.profile.address.as_deref())
            .bind(user.profile.phone.as_deref())
            .execute(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert profile")?;

        tx.commit().await.context("commit create user transaction")?;

        Ok(CreateUserOutcome::Created(created))
    }

    async fn soft_delete_user(&self, user_id: Uuid) -> Result<bool> {
        let query = "UPDATE users SET is_deleted = TRUE WHERE id = $1 AND NOT is_deleted";
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to soft delete user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        let query = "SELECT 1";
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("database ping failed")?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn list_active(&self, user_id: Uuid) -> Result<Vec<Session>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = $1 AND NOT is_revoked ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to list sessions")?;
        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn insert_bounded(
        &self,
        session: NewSession,
        max_sessions: usize,
    ) -> Result<BoundedInsert> {
        let mut tx = self.pool.begin().await.context("begin session transaction")?;

        // Row lock on the owner serializes concurrent logins for the same user.
        let query = "SELECT id FROM users WHERE id = $1 FOR UPDATE";
        let owner = sqlx::query(query)
            .bind(session.user_id)
            .fetch_optional(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lock session owner")?;
        if owner.is_none() {
            let _ = tx.rollback().await;
            return Err(anyhow!("session owner {} does not exist", session.user_id));
        }

        let query = "SELECT id FROM sessions WHERE user_id = $1 AND NOT is_revoked ORDER BY created_at ASC, id ASC";
        let active: Vec<Uuid> = sqlx::query(query)
            .bind(session.user_id)
            .fetch_all(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to count active sessions")?
            .iter()
            .map(|row| row.get("id"))
            .collect();

        let evicted = sessions_to_evict(&active, max_sessions).to_vec();
        if !evicted.is_empty() {
            let query =
                "UPDATE sessions SET is_revoked = TRUE, revoked_at = NOW() WHERE id = ANY($1)";
            sqlx::query(query)
                .bind(evicted.as_slice())
                .execute(&mut *tx)
                .instrument(db_span("UPDATE", query))
                .await
                .context("failed to evict sessions")?;
        }

        let query = format!(
            "INSERT INTO sessions (id, user_id, refresh_token_hash, user_agent, ip_address, created_at, expires_at) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {SESSION_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(session.id)
            .bind(session.user_id)
            .bind(&session.refresh_token_hash)
            .bind(session.client.user_agent.as_deref())
            .bind(session.client.ip_address.as_deref())
            .bind(session.created_at)
            .bind(session.expires_at)
            .fetch_one(&mut *tx)
            .instrument(db_span("INSERT", &query))
            .await
            .context("failed to insert session")?;

        tx.commit().await.context("commit session transaction")?;

        Ok(BoundedInsert {
            session: session_from_row(&row),
            evicted,
        })
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        refresh_token_hash: &str,
    ) -> Result<Option<Session>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = $1 AND refresh_token_hash = $2 AND NOT is_revoked AND expires_at > NOW()"
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(refresh_token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup session")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn replace_refresh_hash(
        &self,
        session_id: Uuid,
        current_hash: &str,
        new_hash: &str,
    ) -> Result<Option<Session>> {
        let query = format!(
            "UPDATE sessions SET refresh_token_hash = $3, rotated_at = NOW() WHERE id = $1 AND refresh_token_hash = $2 AND NOT is_revoked RETURNING {SESSION_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(session_id)
            .bind(current_hash)
            .bind(new_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to rotate session token")?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn revoke(&self, session_id: Uuid) -> Result<bool> {
        let query =
            "UPDATE sessions SET is_revoked = TRUE, revoked_at = NOW() WHERE id = $1 AND NOT is_revoked";
        let result = sqlx::query(query)
            .bind(session_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke session")?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_owned(&self, user_id: Uuid, session_id: Uuid) -> Result<bool> {
        let query = "UPDATE sessions SET is_revoked = TRUE, revoked_at = NOW() WHERE id = $1 AND user_id = $2 AND NOT is_revoked";
        let result = sqlx::query(query)
            .bind(session_id)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke session")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_for(&self, user_id: Uuid) -> Result<u64> {
        let query = "DELETE FROM sessions WHERE user_id = $1";
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete sessions")?;
        Ok(result.rows_affected())
    }
}
