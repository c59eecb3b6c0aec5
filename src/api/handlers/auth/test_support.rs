//! In-memory stores and a ready-made `AuthState` for handler tests.
#![allow(clippy::unwrap_used)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use super::{
    models::{
        BoundedInsert, CreateUserOutcome, NewProfile, NewSession, NewUser, Role, Session, User,
        ADMIN_ROLE, DEFAULT_ROLE,
    },
    password,
    state::{AuthBackends, AuthConfig, AuthState},
    storage::{sessions_to_evict, CredentialStore, SessionStore},
};
use crate::{
    api::email::{EmailMessage, MailQueue},
    cli::globals::GlobalArgs,
    ephemeral::MemoryStore,
};

#[derive(Default)]
struct CredentialTables {
    users: Vec<User>,
    roles: Vec<Role>,
    profiles: Vec<(Uuid, NewProfile)>,
}

#[derive(Default)]
pub(crate) struct MemoryCredentials {
    tables: Mutex<CredentialTables>,
}

impl MemoryCredentials {
    /// Seeded with `User` (no permissions) and `Admin` (`users:delete`, `sessions:read`).
    pub(crate) fn with_default_roles() -> Self {
        let store = Self::default();
        store.add_role(DEFAULT_ROLE, &[]);
        store.add_role(ADMIN_ROLE, &["users:delete", "sessions:read"]);
        store
    }

    pub(crate) fn add_role(&self, title: &str, permissions: &[&str]) -> Role {
        let role = Role {
            id: Uuid::now_v7(),
            title: title.to_string(),
            permissions: permissions.iter().map(ToString::to_string).collect(),
            is_deleted: false,
        };
        self.tables.lock().unwrap().roles.push(role.clone());
        role
    }

    pub(crate) fn role_id(&self, title: &str) -> Uuid {
        let tables = self.tables.lock().unwrap();
        tables.roles.iter().find(|role| role.title == title).unwrap().id
    }

    pub(crate) fn add_user(&self, email: &str, password_hash: &str, role_title: &str) -> User {
        let role_id = self.role_id(role_title);
        let user = User {
            id: Uuid::now_v7(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role_id,
            is_deleted: false,
        };
        self.tables.lock().unwrap().users.push(user.clone());
        user
    }

    pub(crate) fn user_by_email(&self, email: &str) -> Option<User> {
        let tables = self.tables.lock().unwrap();
        tables.users.iter().find(|user| user.email == email).cloned()
    }

    pub(crate) fn profile_for(&self, user_id: Uuid) -> Option<NewProfile> {
        let tables = self.tables.lock().unwrap();
        tables
            .profiles
            .iter()
            .find(|(owner, _)| *owner == user_id)
            .map(|(_, profile)| profile.clone())
    }

    fn exists(&self, user_id: Uuid) -> bool {
        let tables = self.tables.lock().unwrap();
        tables.users.iter().any(|user| user.id == user_id)
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("store lock poisoned")
}

#[async_trait]
impl CredentialStore for MemoryCredentials {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.lock().map_err(poisoned)?;
        Ok(tables
            .users
            .iter()
            .find(|user| user.email == email && !user.is_deleted)
            .cloned())
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let tables = self.tables.lock().map_err(poisoned)?;
        Ok(tables
            .users
            .iter()
            .find(|user| user.id == user_id && !user.is_deleted)
            .cloned())
    }

    async fn find_role(&self, role_id: Uuid) -> Result<Option<Role>> {
        let tables = self.tables.lock().map_err(poisoned)?;
        Ok(tables
            .roles
            .iter()
            .find(|role| role.id == role_id && !role.is_deleted)
            .cloned())
    }

    async fn find_role_by_title(&self, title: &str) -> Result<Option<Role>> {
        let tables = self.tables.lock().map_err(poisoned)?;
        Ok(tables
            .roles
            .iter()
            .find(|role| role.title == title && !role.is_deleted)
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<CreateUserOutcome> {
        let mut tables = self.tables.lock().map_err(poisoned)?;
        if tables
            .users
            .iter()
            .any(|existing| existing.email == user.email && !existing.is_deleted)
        {
            return Ok(CreateUserOutcome::Conflict);
        }
        let created = User {
            id: Uuid::now_v7(),
            email: user.email,
            password_hash: user.password_hash,
            role_id: user.role_id,
            is_deleted: false,
        };
        tables.users.push(created.clone());
        tables.profiles.push((created.id, user.profile));
        Ok(CreateUserOutcome::Created(created))
    }

    async fn soft_delete_user(&self, user_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.lock().map_err(poisoned)?;
        match tables
            .users
            .iter_mut()
            .find(|user| user.id == user_id && !user.is_deleted)
        {
            Some(user) => {
                user.is_deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Session store kept in insertion order, which doubles as creation order.
pub(crate) struct MemorySessions {
    owners: Arc<MemoryCredentials>,
    sessions: Mutex<Vec<Session>>,
    stall: Mutex<Option<Duration>>,
}

impl MemorySessions {
    pub(crate) fn new(owners: Arc<MemoryCredentials>) -> Self {
        Self {
            owners,
            sessions: Mutex::new(Vec::new()),
            stall: Mutex::new(None),
        }
    }

    /// Make every following call sleep for `delay` first.
    pub(crate) fn stall_for(&self, delay: Duration) {
        *self.stall.lock().unwrap() = Some(delay);
    }

    pub(crate) fn all(&self) -> Vec<Session> {
        self.sessions.lock().unwrap().clone()
    }

    async fn maybe_stall(&self) {
        let delay = *self.stall.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessions {
    async fn list_active(&self, user_id: Uuid) -> Result<Vec<Session>> {
        self.maybe_stall().await;
        let sessions = self.sessions.lock().map_err(poisoned)?;
        Ok(sessions
            .iter()
            .filter(|session| session.user_id == user_id && !session.is_revoked)
            .cloned()
            .collect())
    }

    async fn insert_bounded(
        &self,
        session: NewSession,
        max_sessions: usize,
    ) -> Result<BoundedInsert> {
        self.maybe_stall().await;
        if !self.owners.exists(session.user_id) {
            return Err(anyhow!("session owner {} does not exist", session.user_id));
        }
        let mut sessions = self.sessions.lock().map_err(poisoned)?;
        let active: Vec<Uuid> = sessions
            .iter()
            .filter(|existing| existing.user_id == session.user_id && !existing.is_revoked)
            .map(|existing| existing.id)
            .collect();
        let evicted = sessions_to_evict(&active, max_sessions).to_vec();
        for existing in sessions.iter_mut() {
            if evicted.contains(&existing.id) {
                existing.is_revoked = true;
            }
        }
        let created = Session {
            id: session.id,
            user_id: session.user_id,
            refresh_token_hash: session.refresh_token_hash,
            user_agent: session.client.user_agent,
            ip_address: session.client.ip_address,
            created_at: session.created_at,
            expires_at: session.expires_at,
            is_revoked: false,
        };
        sessions.push(created.clone());
        Ok(BoundedInsert {
            session: created,
            evicted,
        })
    }

    async fn find_active(
        &self,
        user_id: Uuid,
        refresh_token_hash: &str,
    ) -> Result<Option<Session>> {
        self.maybe_stall().await;
        let now = Utc::now();
        let sessions = self.sessions.lock().map_err(poisoned)?;
        Ok(sessions
            .iter()
            .find(|session| {
                session.user_id == user_id
                    && session.refresh_token_hash == refresh_token_hash
                    && !session.is_revoked
                    && !session.is_expired_at(now)
            })
            .cloned())
    }

    async fn replace_refresh_hash(
        &self,
        session_id: Uuid,
        current_hash: &str,
        new_hash: &str,
    ) -> Result<Option<Session>> {
        self.maybe_stall().await;
        let mut sessions = self.sessions.lock().map_err(poisoned)?;
        Ok(sessions
            .iter_mut()
            .find(|session| {
                session.id == session_id
                    && session.refresh_token_hash == current_hash
                    && !session.is_revoked
            })
            .map(|session| {
                session.refresh_token_hash = new_hash.to_string();
                session.clone()
            }))
    }

    async fn revoke(&self, session_id: Uuid) -> Result<bool> {
        self.maybe_stall().await;
        let mut sessions = self.sessions.lock().map_err(poisoned)?;
        Ok(sessions
            .iter_mut()
            .find(|session| session.id == session_id && !session.is_revoked)
            .map(|session| session.is_revoked = true)
            .is_some())
    }

    async fn revoke_owned(&self, user_id: Uuid, session_id: Uuid) -> Result<bool> {
        self.maybe_stall().await;
        let mut sessions = self.sessions.lock().map_err(poisoned)?;
        Ok(sessions
            .iter_mut()
            .find(|session| {
                session.id == session_id && session.user_id == user_id && !session.is_revoked
            })
            .map(|session| session.is_revoked = true)
            .is_some())
    }

    async fn delete_all_for(&self, user_id: Uuid) -> Result<u64> {
        self.maybe_stall().await;
        let mut sessions = self.sessions.lock().map_err(poisoned)?;
        let before = sessions.len();
        sessions.retain(|session| session.user_id != user_id);
        Ok(u64::try_from(before - sessions.len()).unwrap_or(u64::MAX))
    }
}

/// Everything a handler test needs to drive and inspect the auth flows.
pub(crate) struct Harness {
    pub(crate) state: Arc<AuthState>,
    pub(crate) credentials: Arc<MemoryCredentials>,
    pub(crate) sessions: Arc<MemorySessions>,
    pub(crate) ephemeral: Arc<MemoryStore>,
    pub(crate) outbox: UnboundedReceiver<EmailMessage>,
}

pub(crate) fn globals() -> GlobalArgs {
    GlobalArgs::new(
        SecretString::from("access-secret-for-tests"),
        SecretString::from("refresh-secret-for-tests"),
        SecretString::from("cookie-secret-for-tests"),
    )
}

pub(crate) fn harness(config: AuthConfig) -> Harness {
    let credentials = Arc::new(MemoryCredentials::with_default_roles());
    let sessions = Arc::new(MemorySessions::new(credentials.clone()));
    let ephemeral = Arc::new(MemoryStore::new());
    let (mailer, outbox) = MailQueue::channel();
    let state = AuthState::new(
        config,
        &globals(),
        password::fast(),
        AuthBackends {
            credentials: credentials.clone(),
            sessions: sessions.clone(),
            ephemeral: ephemeral.clone(),
            mailer,
        },
    )
    .unwrap();
    Harness {
        state: Arc::new(state),
        credentials,
        sessions,
        ephemeral,
        outbox,
    }
}

pub(crate) fn default_harness() -> Harness {
    harness(AuthConfig::new("http://localhost:8080".to_string()))
}

/// Create a user whose password is `password`.
pub(crate) async fn seed_user(harness: &Harness, email: &str, password: &str, role: &str) -> User {
    let hash = harness
        .state
        .passwords()
        .hash(password.to_string())
        .await
        .unwrap();
    harness.credentials.add_user(email, &hash, role)
}
