//! Attempt contexts and proxy descriptor parsing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::failure::AttemptOutcome;
use crate::{AppError, Result};

/// Schemes accepted in a raw proxy string.
const SUPPORTED_SCHEMES: [&str; 4] = ["http", "https", "socks4", "socks5"];

/// Normalized proxy connection details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyDescriptor {
    /// Proxy server address including scheme, e.g. `http://10.0.0.1:8080`.
    pub server: String,
    /// Optional proxy username.
    pub username: Option<String>,
    /// Optional proxy password.
    pub password: Option<String>,
}

impl ProxyDescriptor {
    /// Parse a raw proxy connection string.
    ///
    /// Accepted shapes (optionally prefixed with `scheme://`):
    /// `host:port`, `user:pass@host:port`, `host:port:user:pass`.
    /// The literal `direct` (case-insensitive) yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the string has an unsupported scheme,
    /// an empty host, or a missing or non-numeric port.
    pub fn parse(raw: &str) -> Result<Option<Self>> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("direct") {
            return Ok(None);
        }

        let (scheme, rest) = match raw.split_once("://") {
            Some((scheme, rest)) => {
                let scheme = scheme.to_ascii_lowercase();
                if !SUPPORTED_SCHEMES.contains(&scheme.as_str()) {
                    return Err(AppError::Config(format!(
                        "unsupported proxy scheme '{scheme}'"
                    )));
                }
                (scheme, rest)
            }
            None => ("http".to_owned(), raw),
        };

        let (host, port, username, password) = if let Some((auth, address)) = rest.rsplit_once('@')
        {
            let (host, port) = split_address(address, raw)?;
            let (user, pass) = match auth.split_once(':') {
                Some((user, pass)) => (user, Some(pass)),
                None => (auth, None),
            };
            (host, port, non_empty(user), pass.and_then(non_empty))
        } else {
            let parts: Vec<&str> = rest.split(':').collect();
            match parts.as_slice() {
                [host, port] => (*host, parse_port(port, raw)?, None, None),
                [host, port, user, pass] => (
                    *host,
                    parse_port(port, raw)?,
                    non_empty(user),
                    non_empty(pass),
                ),
                _ => {
                    return Err(AppError::Config(format!(
                        "unrecognised proxy format '{raw}'"
                    )))
                }
            }
        };

        if host.is_empty() {
            return Err(AppError::Config(format!("proxy '{raw}' has an empty host")));
        }

        Ok(Some(Self {
            server: format!("{scheme}://{host}:{port}"),
            username,
            password,
        }))
    }
}

fn split_address<'a>(address: &'a str, raw: &str) -> Result<(&'a str, u16)> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| AppError::Config(format!("proxy '{raw}' is missing a port")))?;
    Ok((host, parse_port(port, raw)?))
}

fn parse_port(port: &str, raw: &str) -> Result<u16> {
    port.trim()
        .parse::<u16>()
        .map_err(|_| AppError::Config(format!("proxy '{raw}' has an invalid port '{port}'")))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_owned())
    }
}

/// One unit of scheduler work: a single proxy/identity pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptContext {
    /// Zero-based position in the run.
    pub index: usize,
    /// Parsed proxy, or `None` for a direct connection.
    pub proxy: Option<ProxyDescriptor>,
}

impl AttemptContext {
    /// Human-readable label used in logs.
    #[must_use]
    pub fn label(&self) -> &str {
        self.proxy
            .as_ref()
            .map_or("direct", |proxy| proxy.server.as_str())
    }
}

/// Build the attempt list from a raw newline-delimited proxy list.
///
/// Blank lines are ignored. An empty list yields exactly one direct
/// ("no proxy") context.
///
/// # Errors
///
/// Returns `AppError::Config` if any non-blank line fails to parse; the
/// caller treats this as fatal for the whole run.
pub fn build_contexts(raw_proxies: &str) -> Result<Vec<AttemptContext>> {
    let lines: Vec<&str> = raw_proxies
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        return Ok(vec![AttemptContext {
            index: 0,
            proxy: None,
        }]);
    }

    lines
        .into_iter()
        .enumerate()
        .map(|(index, line)| {
            Ok(AttemptContext {
                index,
                proxy: ProxyDescriptor::parse(line)?,
            })
        })
        .collect()
}

/// Persisted summary of one finished attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// Unique record identifier.
    pub id: String,
    /// Scheduler run this attempt belonged to.
    pub run_id: String,
    /// Zero-based position in the run.
    pub cycle_index: usize,
    /// Proxy server used, if any.
    pub proxy_server: Option<String>,
    /// Username of the generated identity, if one was produced.
    pub username: Option<String>,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
    /// When the attempt began.
    pub started_at: DateTime<Utc>,
    /// When the environment was released.
    pub finished_at: DateTime<Utc>,
}

impl AttemptRecord {
    /// Start a record for `context` within `run_id`.
    #[must_use]
    pub fn begin(run_id: &str, context: &AttemptContext) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.to_owned(),
            cycle_index: context.index,
            proxy_server: context.proxy.as_ref().map(|proxy| proxy.server.clone()),
            username: None,
            outcome: AttemptOutcome::Completed,
            started_at: now,
            finished_at: now,
        }
    }

    /// Stamp the final outcome.
    #[must_use]
    pub fn finish(mut self, outcome: AttemptOutcome) -> Self {
        self.outcome = outcome;
        self.finished_at = Utc::now();
        self
    }
}
