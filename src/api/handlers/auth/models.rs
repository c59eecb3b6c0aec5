//! Typed records for users, roles, profiles and sessions.
//!
//! References between records are explicit ids (`role_id`, `user_id`); joins are
//! resolved with explicit store calls.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Role assigned to every account created through registration.
pub const DEFAULT_ROLE: &str = "User";
pub const ADMIN_ROLE: &str = "Admin";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub role_id: Uuid,
    pub is_deleted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Role {
    pub id: Uuid,
    pub title: String,
    pub permissions: Vec<String>,
    pub is_deleted: bool,
}

impl Role {
    /// Any-of match: true when at least one required permission is granted.
    #[must_use]
    pub fn grants_any(&self, required: &[String]) -> bool {
        required
            .iter()
            .any(|permission| self.permissions.contains(permission))
    }

    #[must_use]
    pub fn is_elevated(&self) -> bool {
        self.title != DEFAULT_ROLE
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewProfile {
    pub full_name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role_id: Uuid,
    pub profile: NewProfile,
}

#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(User),
    Conflict,
}

/// Client details recorded with each session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientMetadata {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub refresh_token_hash: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
}

impl Session {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub refresh_token_hash: String,
    pub client: ClientMetadata,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of a bounded insert: the new session and the ids it displaced.
#[derive(Clone, Debug)]
pub struct BoundedInsert {
    pub session: Session,
    pub evicted: Vec<Uuid>,
}
