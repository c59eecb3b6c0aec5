use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_MAIL_ENDPOINT: &str = "mail-endpoint";
pub const ARG_MAIL_API_KEY: &str = "mail-api-key";
pub const ARG_MAIL_FROM: &str = "mail-from";
pub const ARG_MAIL_MAX_ATTEMPTS: &str = "mail-max-attempts";
pub const ARG_MAIL_BACKOFF_BASE_SECONDS: &str = "mail-backoff-base-seconds";
pub const ARG_MAIL_BACKOFF_MAX_SECONDS: &str = "mail-backoff-max-seconds";

/// Where outgoing mail goes.
#[derive(Debug, Clone)]
pub enum Transport {
    /// Log messages instead of sending them.
    Log,
    Http {
        endpoint: String,
        api_key: SecretString,
        from: String,
    },
}

#[derive(Debug, Clone)]
pub struct Options {
    pub transport: Transport,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

impl Options {
    /// Parse mail arguments from matches.
    ///
    /// # Errors
    /// Returns an error if an endpoint is configured without an API key.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let transport = match matches.get_one::<String>(ARG_MAIL_ENDPOINT) {
            Some(endpoint) => {
                let api_key = matches
                    .get_one::<String>(ARG_MAIL_API_KEY)
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| {
                        anyhow!("--{ARG_MAIL_API_KEY} is required with --{ARG_MAIL_ENDPOINT}")
                    })?;
                Transport::Http {
                    endpoint: endpoint.clone(),
                    api_key: SecretString::from(api_key.clone()),
                    from: matches
                        .get_one::<String>(ARG_MAIL_FROM)
                        .cloned()
                        .unwrap_or_else(|| "Lexicard <no-reply@lexicard.dev>".to_string()),
                }
            }
            None => Transport::Log,
        };

        Ok(Self {
            transport,
            max_attempts: matches
                .get_one::<u32>(ARG_MAIL_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(5),
            backoff_base_seconds: matches
                .get_one::<u64>(ARG_MAIL_BACKOFF_BASE_SECONDS)
                .copied()
                .unwrap_or(1),
            backoff_max_seconds: matches
                .get_one::<u64>(ARG_MAIL_BACKOFF_MAX_SECONDS)
                .copied()
                .unwrap_or(60),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAIL_ENDPOINT)
                .long(ARG_MAIL_ENDPOINT)
                .help("HTTP mail API endpoint; messages are only logged when unset")
                .env("LEXICARD_MAIL_ENDPOINT"),
        )
        .arg(
            Arg::new(ARG_MAIL_API_KEY)
                .long(ARG_MAIL_API_KEY)
                .help("Bearer API key for the mail endpoint")
                .env("LEXICARD_MAIL_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_MAIL_FROM)
                .long(ARG_MAIL_FROM)
                .help("Sender address")
                .env("LEXICARD_MAIL_FROM")
                .default_value("Lexicard <no-reply@lexicard.dev>"),
        )
        .arg(
            Arg::new(ARG_MAIL_MAX_ATTEMPTS)
                .long(ARG_MAIL_MAX_ATTEMPTS)
                .help("Delivery attempts per message before giving up")
                .env("LEXICARD_MAIL_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_MAIL_BACKOFF_BASE_SECONDS)
                .long(ARG_MAIL_BACKOFF_BASE_SECONDS)
                .help("Base delay for mail retry backoff")
                .env("LEXICARD_MAIL_BACKOFF_BASE_SECONDS")
                .default_value("1")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_MAIL_BACKOFF_MAX_SECONDS)
                .long(ARG_MAIL_BACKOFF_MAX_SECONDS)
                .help("Max delay for mail retry backoff")
                .env("LEXICARD_MAIL_BACKOFF_MAX_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
}
