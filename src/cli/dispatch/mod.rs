//! Map validated CLI arguments to the action the binary executes.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, mail, ARG_DSN, ARG_PORT, ARG_REDIS_URL};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let redis_url = matches
        .get_one::<String>(ARG_REDIS_URL)
        .cloned()
        .filter(|url| !url.trim().is_empty());

    Ok(Action::Server(Args {
        port,
        dsn,
        redis_url,
        auth: auth::Options::parse(matches)?,
        mail: mail::Options::parse(matches)?,
    }))
}
