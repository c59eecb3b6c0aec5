use crate::{
    api::{
        self,
        email::{EmailSender, HttpEmailSender, LogEmailSender, MailWorkerConfig},
        handlers::auth::AuthConfig,
    },
    cli::{
        commands::{auth, mail},
        globals::GlobalArgs,
        telemetry,
    },
};
use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub redis_url: Option<String>,
    pub auth: auth::Options,
    pub mail: mail::Options,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(self.auth.frontend_base_url.clone())
            .with_access_token_ttl_seconds(self.auth.access_token_ttl_seconds)
            .with_refresh_token_ttl_days(self.auth.refresh_token_ttl_days)
            .with_max_sessions(self.auth.max_sessions)
            .with_otp_expiration_minutes(self.auth.otp_expiration_minutes)
            .with_otp_resend_limit_minutes(self.auth.otp_resend_limit_minutes)
            .with_store_timeout(Duration::from_millis(self.auth.store_timeout_ms))
    }

    fn mail_config(&self) -> MailWorkerConfig {
        MailWorkerConfig::new()
            .with_max_attempts(self.mail.max_attempts)
            .with_backoff_base_seconds(self.mail.backoff_base_seconds)
            .with_backoff_max_seconds(self.mail.backoff_max_seconds)
    }

    fn mail_sender(&self) -> Result<Arc<dyn EmailSender>> {
        Ok(match &self.mail.transport {
            mail::Transport::Log => Arc::new(LogEmailSender),
            mail::Transport::Http {
                endpoint,
                api_key,
                from,
            } => Arc::new(HttpEmailSender::new(
                endpoint.clone(),
                api_key.clone(),
                from.clone(),
            )?),
        })
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if a backing service is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let globals = GlobalArgs::new(
        args.auth.access_token_secret.clone(),
        args.auth.refresh_token_secret.clone(),
        args.auth.cookie_secret.clone(),
    );

    debug!("Global args: {:?}", globals);

    let auth_config = args.auth_config();
    let backends = api::Backends {
        dsn: args.dsn.clone(),
        redis_url: args.redis_url.clone(),
        mail_sender: args.mail_sender()?,
        mail_config: args.mail_config(),
    };

    let result = api::new(args.port, &globals, auth_config, backends).await;
    telemetry::shutdown_tracer();
    result
}
