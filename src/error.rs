use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum ConfigError {
    /// Required variable is unset or empty in every source.
    ///
    /// Check `.env.example` for the variables the bot needs.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Variable is present but its value cannot be used.
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidEnvVar {
        key: String,
        value: String,
        reason: String,
    },

    /// The `.env` file exists but could not be read or parsed.
    #[error("Could not read env file {0}: {1}")]
    EnvFile(String, #[source] dotenv::Error),
}

/// Fatal startup and runtime failures. Each one ends the process with its own
/// exit code.
#[derive(Error, Debug)]
pub(crate) enum BotError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The gateway refused the credential. Retrying will not help.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The gateway could not be reached, or the connection was lost.
    #[error("connection error after {attempts} attempt(s): {reason}")]
    Connection { attempts: u32, reason: String },

    /// An established session ended without being asked to.
    #[error("connection error: session lost: {0}")]
    ConnectionLost(String),
}

impl BotError {
    /// sysexits(3) codes: EX_CONFIG, EX_NOPERM, EX_UNAVAILABLE.
    pub(crate) fn exit_code(&self) -> u8 {
        match self {
            BotError::Configuration(_) => 78,
            BotError::Authentication(_) => 77,
            BotError::Connection { .. } | BotError::ConnectionLost(_) => 69,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_exits_non_zero() {
        let errors = [
            BotError::Configuration(ConfigError::MissingEnvVar("DISCORD_BOT_TOKEN".into())),
            BotError::Authentication("401 Unauthorized".into()),
            BotError::Connection {
                attempts: 6,
                reason: "timed out".into(),
            },
            BotError::ConnectionLost("reset by peer".into()),
        ];

        for err in errors {
            assert_ne!(err.exit_code(), 0, "{}", err);
        }
    }

    #[test]
    fn message_names_the_category() {
        let err = BotError::from(ConfigError::MissingEnvVar("DISCORD_BOT_TOKEN".into()));
        assert_eq!(
            err.to_string(),
            "configuration error: Missing required environment variable: DISCORD_BOT_TOKEN"
        );

        let err = BotError::Authentication("401 Unauthorized".into());
        assert!(err.to_string().starts_with("authentication error"));
    }
}
