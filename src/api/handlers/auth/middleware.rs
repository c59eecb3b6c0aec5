//! Access control for protected routes.
//!
//! Flow Overview: [`authenticate`] reads `Authorization: Bearer <token>`, verifies the
//! access token and attaches a [`Principal`] to the request. Routes registered with
//! [`Tier::RequireRole`] additionally need the token's role claim to equal the tier's
//! role. [`require_permission`] runs after `authenticate` and checks the caller's
//! current role in the credential store against an any-of permission list.

use anyhow::{bail, Result};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{error::AuthError, models::DEFAULT_ROLE, state::AuthState, utils::bounded};

/// Authenticated caller, available to handlers as `Extension<Principal>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    /// Role claim; only present for elevated roles.
    pub role: Option<String>,
}

/// `RequireRole` is for elevated roles only; see [`Gate::new`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tier {
    IdentityOnly,
    RequireRole(String),
}

/// State for [`authenticate`]: the shared auth state plus the route's tier.
#[derive(Clone)]
pub struct Gate {
    state: Arc<AuthState>,
    tier: Tier,
}

impl Gate {
    /// Build a gate for `tier`.
    ///
    /// # Errors
    /// `RequireRole` must name an elevated role: access tokens for the default role carry
    /// no role claim, so a gate on it could never admit anyone.
    pub fn new(state: Arc<AuthState>, tier: Tier) -> Result<Self> {
        if let Tier::RequireRole(required) = &tier {
            if required.trim().is_empty() || required == DEFAULT_ROLE {
                bail!("role gate needs an elevated role, got {required:?}");
            }
        }
        Ok(Self { state, tier })
    }

    #[must_use]
    pub fn identity(state: Arc<AuthState>) -> Self {
        Self {
            state,
            tier: Tier::IdentityOnly,
        }
    }

    /// # Errors
    /// See [`Gate::new`].
    pub fn role(state: Arc<AuthState>, role: impl Into<String>) -> Result<Self> {
        Self::new(state, Tier::RequireRole(role.into()))
    }

    /// Turn a bearer token into a principal allowed through this gate.
    fn admit(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.state.codec().verify_access(token).map_err(|err| {
            debug!("access token rejected: {err}");
            AuthError::Forbidden
        })?;
        let user_id = claims.user_id.ok_or(AuthError::Forbidden)?;

        if let Tier::RequireRole(required) = &self.tier {
            if claims.role.as_deref() != Some(required.as_str()) {
                info!(user_id = %user_id, required = %required, "role requirement not met");
                return Err(AuthError::Forbidden);
            }
        }

        Ok(Principal {
            user_id,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// Bearer token from the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::Unauthenticated)?
        .to_str()
        .map_err(|_| AuthError::BadRequest("Malformed authorization header"))?;
    match value.trim().split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AuthError::BadRequest("Expected a bearer token")),
    }
}

/// Middleware: authenticate the caller according to the gate's tier.
///
/// # Errors
/// [`AuthError::Unauthenticated`] without a header, [`AuthError::BadRequest`] for other
/// schemes or an empty token, [`AuthError::Forbidden`] for invalid tokens or a role
/// mismatch.
pub async fn authenticate(
    State(gate): State<Gate>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(request.headers())?;
    let principal = gate.admit(token)?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// State for [`require_permission`].
#[derive(Clone)]
pub struct PermissionGate {
    state: Arc<AuthState>,
    permissions: Arc<[String]>,
}

impl PermissionGate {
    #[must_use]
    pub fn new(state: Arc<AuthState>, permissions: &[&str]) -> Self {
        Self {
            state,
            permissions: permissions.iter().map(ToString::to_string).collect(),
        }
    }

    async fn check(&self, principal: &Principal) -> Result<(), AuthError> {
        let timeout = self.state.config().store_timeout();
        let user = bounded(
            timeout,
            "lookup user",
            self.state.credentials().find_user(principal.user_id),
        )
        .await?
        .ok_or(AuthError::Forbidden)?;
        let role = bounded(
            timeout,
            "lookup role",
            self.state.credentials().find_role(user.role_id),
        )
        .await?
        .ok_or(AuthError::Forbidden)?;

        if role.grants_any(&self.permissions) {
            Ok(())
        } else {
            info!(user_id = %user.id, role = %role.title, "missing required permission");
            Err(AuthError::Forbidden)
        }
    }
}

/// Middleware: require any of the gate's permissions. Must run after [`authenticate`].
///
/// # Errors
/// [`AuthError::Unauthenticated`] if no principal was attached, [`AuthError::Forbidden`]
/// when the caller's role grants none of the permissions.
pub async fn require_permission(
    State(gate): State<PermissionGate>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let principal = request
        .extensions()
        .get::<Principal>()
        .cloned()
        .ok_or(AuthError::Unauthenticated)?;
    gate.check(&principal).await?;
    Ok(next.run(request).await)
}
