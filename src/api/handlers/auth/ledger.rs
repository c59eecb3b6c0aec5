//! Session ledger: the authoritative record of refresh sessions.
//!
//! Only hashes of refresh tokens are stored. Each user holds at most `max_sessions`
//! active sessions; creating one more revokes the oldest.

use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tracing::info;
use uuid::Uuid;

use super::{
    error::AuthError,
    models::{ClientMetadata, NewSession, Session},
    storage::SessionStore,
    utils::{bounded, hash_refresh_token},
};

pub struct SessionLedger {
    store: Arc<dyn SessionStore>,
    max_sessions: usize,
    timeout: Duration,
}

impl SessionLedger {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, max_sessions: usize, timeout: Duration) -> Self {
        Self {
            store,
            max_sessions: max_sessions.max(1),
            timeout,
        }
    }

    /// Active sessions for `user_id`, oldest first.
    ///
    /// # Errors
    /// [`AuthError::Unavailable`] on store timeout, [`AuthError::Internal`] otherwise.
    pub async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, AuthError> {
        bounded(self.timeout, "list sessions", self.store.list_active(user_id)).await
    }

    /// Record a new session for `refresh_token`, evicting the oldest sessions over the bound.
    ///
    /// # Errors
    /// [`AuthError::Unavailable`] on store timeout, [`AuthError::Internal`] otherwise
    /// (including a missing owner).
    pub async fn create_session(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        client: ClientMetadata,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        let session = NewSession {
            id: Uuid::now_v7(),
            user_id,
            refresh_token_hash: hash_refresh_token(refresh_token),
            client,
            created_at: Utc::now(),
            expires_at,
        };
        let inserted = bounded(
            self.timeout,
            "create session",
            self.store.insert_bounded(session, self.max_sessions),
        )
        .await?;
        if !inserted.evicted.is_empty() {
            info!(
                user_id = %user_id,
                evicted = inserted.evicted.len(),
                "session limit reached, revoked oldest sessions"
            );
        }
        Ok(inserted.session)
    }

    /// Live session matching the owner and the presented refresh token.
    ///
    /// # Errors
    /// [`AuthError::Unavailable`] on store timeout, [`AuthError::Internal`] otherwise.
    pub async fn find_active(
        &self,
        user_id: Uuid,
        refresh_token: &str,
    ) -> Result<Option<Session>, AuthError> {
        let hash = hash_refresh_token(refresh_token);
        bounded(
            self.timeout,
            "find session",
            self.store.find_active(user_id, &hash),
        )
        .await
    }

    /// Replace the session's refresh token. Succeeds only while the stored hash still
    /// matches `current_token`, so one presented token rotates at most once.
    ///
    /// # Errors
    /// [`AuthError::NotFound`] when the session is gone, revoked or already rotated.
    pub async fn revise_session(
        &self,
        session_id: Uuid,
        current_token: &str,
        new_token: &str,
    ) -> Result<Session, AuthError> {
        let current = hash_refresh_token(current_token);
        let next = hash_refresh_token(new_token);
        bounded(
            self.timeout,
            "rotate session",
            self.store.replace_refresh_hash(session_id, &current, &next),
        )
        .await?
        .ok_or(AuthError::NotFound)
    }

    /// # Errors
    /// [`AuthError::NotFound`] when no live session has this id.
    pub async fn revoke(&self, session_id: Uuid) -> Result<(), AuthError> {
        let revoked = bounded(self.timeout, "revoke session", self.store.revoke(session_id)).await?;
        if revoked {
            Ok(())
        } else {
            Err(AuthError::NotFound)
        }
    }

    /// Revoke a session only if `user_id` owns it.
    ///
    /// # Errors
    /// [`AuthError::NotFound`] when no live session with this id belongs to the user.
    pub async fn revoke_owned(&self, user_id: Uuid, session_id: Uuid) -> Result<(), AuthError> {
        let revoked = bounded(
            self.timeout,
            "revoke session",
            self.store.revoke_owned(user_id, session_id),
        )
        .await?;
        if revoked {
            Ok(())
        } else {
            Err(AuthError::NotFound)
        }
    }

    /// Remove every session owned by `user_id`.
    ///
    /// # Errors
    /// [`AuthError::Unavailable`] on store timeout, [`AuthError::Internal`] otherwise.
    pub async fn delete_all_for(&self, user_id: Uuid) -> Result<u64, AuthError> {
        bounded(
            self.timeout,
            "delete sessions",
            self.store.delete_all_for(user_id),
        )
        .await
    }
}
