//! Outbound email: an in-process queue drained by a background worker.
//!
//! Handlers call [`MailQueue::submit`], which never blocks and never fails the request.
//! The worker hands each message to an [`EmailSender`] on its own task and retries
//! failures with exponential backoff and jitter until `max_attempts` is reached; after
//! that the message is dropped and the failure logged.
//!
//! Two senders ship with the crate:
//!
//! - [`LogEmailSender`] logs the message instead of sending it (local development).
//! - [`HttpEmailSender`] posts `{from, to, subject, text}` to a mail API with a bearer key.
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::sleep;
use tracing::{error, info, info_span, warn, Instrument};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub body: String,
}

/// Email delivery abstraction used by the dispatch worker.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to have it retried.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            body = %message.body,
            "email send stub"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct MailApiRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Sender backed by an HTTP mail API.
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    from: String,
}

impl HttpEmailSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: String, api_key: SecretString, from: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build mail API client")?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let span = info_span!("mail.send", http.method = "POST", url = %self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&MailApiRequest {
                from: &self.from,
                to: &message.to_email,
                subject: &message.subject,
                text: &message.body,
            })
            .send()
            .instrument(span)
            .await
            .context("mail API request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("mail API responded with {status}");
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MailWorkerConfig {
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl MailWorkerConfig {
    /// Default worker config: 5 max attempts and 1s->60s exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let max_attempts = self.max_attempts.max(1);
        let backoff_base = if self.backoff_base.is_zero() {
            Duration::from_secs(1)
        } else {
            self.backoff_base
        };
        let backoff_max = if self.backoff_max < backoff_base {
            backoff_base
        } else {
            self.backoff_max
        };
        Self {
            max_attempts,
            backoff_base,
            backoff_max,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }
}

impl Default for MailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side of the dispatch queue.
#[derive(Clone, Debug)]
pub struct MailQueue {
    tx: UnboundedSender<EmailMessage>,
}

impl MailQueue {
    /// A queue and the receiver a worker drains.
    #[must_use]
    pub fn channel() -> (Self, UnboundedReceiver<EmailMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Hand `message` to the worker. A stopped worker is logged, not reported.
    pub fn submit(&self, message: EmailMessage) {
        if let Err(err) = self.tx.send(message) {
            error!(to_email = %err.0.to_email, "mail worker is gone, dropping message");
        }
    }
}

/// Spawn the dispatch worker and return the queue that feeds it.
pub fn spawn_dispatch_worker(
    sender: Arc<dyn EmailSender>,
    config: MailWorkerConfig,
) -> (MailQueue, tokio::task::JoinHandle<()>) {
    let (queue, rx) = MailQueue::channel();
    let handle = tokio::spawn(run_worker(rx, sender, config.normalize()));
    (queue, handle)
}

async fn run_worker(
    mut rx: UnboundedReceiver<EmailMessage>,
    sender: Arc<dyn EmailSender>,
    config: MailWorkerConfig,
) {
    while let Some(message) = rx.recv().await {
        // One task per message so a backing-off delivery never stalls the queue.
        tokio::spawn(deliver(sender.clone(), message, config));
    }
    info!("mail queue closed, dispatch worker exiting");
}

async fn deliver(sender: Arc<dyn EmailSender>, message: EmailMessage, config: MailWorkerConfig) {
    let mut attempt = 1;
    loop {
        match sender.send(&message).await {
            Ok(()) => return,
            Err(err) if attempt >= config.max_attempts() => {
                error!(
                    to_email = %message.to_email,
                    attempts = attempt,
                    "email delivery failed permanently: {err:#}"
                );
                return;
            }
            Err(err) => {
                let delay = backoff_delay(attempt, config.backoff_base(), config.backoff_max());
                warn!(
                    to_email = %message.to_email,
                    attempt,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "email delivery failed: {err:#}"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}
