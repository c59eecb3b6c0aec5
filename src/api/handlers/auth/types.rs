//! Request/response types for auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::models::Session;

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub role: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestOtpRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub email: String,
    pub otp: String,
    pub password: String,
    pub full_name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: Uuid,
    pub email: String,
}

/// Public view of a session; the refresh hash never leaves the server.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<Session> for SessionSummary {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            created_at: session.created_at,
            expires_at: session.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn register_request_reads_camel_case() -> Result<()> {
        let request: RegisterRequest = serde_json::from_str(
            r#"{"email":"a@lexicard.dev","otp":"123456","password":"pw","fullName":"Ada"}"#,
        )?;
        assert_eq!(request.full_name, "Ada");
        assert_eq!(request.address, None);
        Ok(())
    }

    #[test]
    fn missing_fields_default_to_empty() -> Result<()> {
        let request: LoginRequest = serde_json::from_str("{}")?;
        assert!(request.email.is_empty());
        assert!(request.password.is_empty());
        Ok(())
    }

    #[test]
    fn login_response_writes_camel_case() -> Result<()> {
        let value = serde_json::to_value(LoginResponse {
            access_token: "jwt".to_string(),
            role: "User".to_string(),
        })?;
        let token = value
            .get("accessToken")
            .and_then(serde_json::Value::as_str)
            .context("missing accessToken")?;
        assert_eq!(token, "jwt");
        Ok(())
    }

    #[test]
    fn session_summary_hides_hash() -> Result<()> {
        let now = Utc::now();
        let summary = SessionSummary::from(Session {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            refresh_token_hash: "secret-hash".to_string(),
            user_agent: Some("lexicard-web".to_string()),
            ip_address: None,
            created_at: now,
            expires_at: now,
            is_revoked: false,
        });
        let json = serde_json::to_string(&summary)?;
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("userAgent"));
        Ok(())
    }
}
