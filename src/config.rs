use std::{fmt, str::FromStr, time::Duration};

use crate::{
    error::ConfigError,
    source::{EnvFile, ProcessEnv, Source, SourceChain},
};

pub(crate) const TOKEN_VAR: &str = "DISCORD_BOT_TOKEN";
const PORT_VAR: &str = "PORT";
const LOG_VAR: &str = "RUST_LOG";
const MAX_RETRIES_VAR: &str = "GATEWAY_MAX_RETRIES";
const RETRY_BASE_VAR: &str = "GATEWAY_RETRY_BASE_MS";
const RETRY_MAX_VAR: &str = "GATEWAY_RETRY_MAX_MS";
const SHUTDOWN_TIMEOUT_VAR: &str = "SHUTDOWN_TIMEOUT_SECS";

const ENV_FILE: &str = ".env";

pub(crate) const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_PORT: u16 = 10000;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_BASE_MS: u64 = 500;
const DEFAULT_RETRY_MAX_MS: u64 = 30_000;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Bot token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct Token(String);

impl Token {
    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// How often and how patiently a failed gateway handshake is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub(crate) max_retries: u32,
    pub(crate) base_delay: Duration,
    pub(crate) max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_MS),
        }
    }
}

/// Startup parameters. Built once, never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Configuration {
    token: Token,
    health_port: u16,
    log_filter: String,
    retry: RetryPolicy,
    shutdown_timeout: Duration,
}

impl Configuration {
    /// Loads from the process environment, falling back to `./.env`.
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let env_file = EnvFile::open(ENV_FILE)?;
        Self::from_source(&SourceChain::new().with(ProcessEnv).with(env_file))
    }

    pub(crate) fn from_source(source: &impl Source) -> Result<Self, ConfigError> {
        let token = source
            .get(TOKEN_VAR)?
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(TOKEN_VAR.to_string()))?;

        let log_filter = source
            .get(LOG_VAR)?
            .filter(|filter| !filter.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let retry = RetryPolicy {
            max_retries: parse_or(source, MAX_RETRIES_VAR, DEFAULT_MAX_RETRIES)?,
            base_delay: Duration::from_millis(parse_or(
                source,
                RETRY_BASE_VAR,
                DEFAULT_RETRY_BASE_MS,
            )?),
            max_delay: Duration::from_millis(parse_or(
                source,
                RETRY_MAX_VAR,
                DEFAULT_RETRY_MAX_MS,
            )?),
        };
        if retry.max_delay < retry.base_delay {
            return Err(ConfigError::InvalidEnvVar {
                key: RETRY_MAX_VAR.to_string(),
                value: retry.max_delay.as_millis().to_string(),
                reason: format!("must not be smaller than {}", RETRY_BASE_VAR),
            });
        }

        Ok(Self {
            token: Token(token),
            health_port: parse_or(source, PORT_VAR, DEFAULT_PORT)?,
            log_filter,
            retry,
            shutdown_timeout: Duration::from_secs(parse_or(
                source,
                SHUTDOWN_TIMEOUT_VAR,
                DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            )?),
        })
    }

    pub(crate) fn token(&self) -> &Token {
        &self.token
    }

    pub(crate) fn health_port(&self) -> u16 {
        self.health_port
    }

    pub(crate) fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub(crate) fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub(crate) fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}

/// Parses an optional variable. Absent or blank means `default`.
fn parse_or<T>(source: &impl Source, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match source.get(key)? {
        Some(value) if !value.trim().is_empty() => {
            value
                .trim()
                .parse()
                .map_err(|err: T::Err| ConfigError::InvalidEnvVar {
                    key: key.to_string(),
                    value: value.clone(),
                    reason: err.to_string(),
                })
        }
        _ => Ok(default),
    }
}
