use std::{collections::HashMap, env, io, path::Path};

use crate::error::ConfigError;

/// Somewhere a configuration value can be looked up by key.
///
/// `Ok(Some(""))` means the key is present but empty, which is different from
/// the key being absent: a present key stops the lookup in a [`SourceChain`].
/// So does an error, a key that is present but unreadable never falls through
/// to a later source.
pub(crate) trait Source {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError>;
}

/// The process environment, read-only.
pub(crate) struct ProcessEnv;

impl Source for ProcessEnv {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match env::var_os(key) {
            None => Ok(None),
            Some(value) => value
                .into_string()
                .map(Some)
                .map_err(|value| ConfigError::InvalidEnvVar {
                    key: key.to_string(),
                    value: value.to_string_lossy().into_owned(),
                    reason: "not valid unicode".to_string(),
                }),
        }
    }
}

impl Source for HashMap<String, String> {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(HashMap::get(self, key).cloned())
    }
}

/// Key/value pairs parsed out of a `.env`-style file.
///
/// The file is only parsed; nothing is written into the process environment.
#[derive(Debug, Default)]
pub(crate) struct EnvFile {
    vars: HashMap<String, String>,
}

impl EnvFile {
    /// Parses `path`. A file that does not exist is treated as empty.
    pub(crate) fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let iter = match dotenv::from_path_iter(path) {
            Ok(iter) => iter,
            Err(dotenv::Error::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => return Err(ConfigError::EnvFile(path.display().to_string(), err)),
        };

        let mut vars = HashMap::new();
        for item in iter {
            let (key, value) =
                item.map_err(|err| ConfigError::EnvFile(path.display().to_string(), err))?;
            // first definition wins, like dotenv does when it loads into the environment
            vars.entry(key).or_insert(value);
        }

        Ok(Self { vars })
    }
}

impl Source for EnvFile {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.vars.get(key).cloned())
    }
}

/// Ordered list of sources. The first source that has a key decides its value.
#[derive(Default)]
pub(crate) struct SourceChain {
    sources: Vec<Box<dyn Source + Send + Sync>>,
}

impl SourceChain {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, source: impl Source + Send + Sync + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl Source for SourceChain {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        for source in &self.sources {
            if let Some(value) = source.get(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("gateway-bot-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(".env");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn first_source_with_key_wins() {
        let chain = SourceChain::new()
            .with(map(&[("TOKEN", "from-env")]))
            .with(map(&[("TOKEN", "from-file"), ("PORT", "8080")]));

        assert_eq!(chain.get("TOKEN").unwrap().as_deref(), Some("from-env"));
        assert_eq!(chain.get("PORT").unwrap().as_deref(), Some("8080"));
        assert_eq!(chain.get("MISSING").unwrap(), None);
    }

    #[test]
    fn empty_value_still_shadows_later_sources() {
        let chain = SourceChain::new()
            .with(map(&[("TOKEN", "")]))
            .with(map(&[("TOKEN", "from-file")]));

        assert_eq!(chain.get("TOKEN").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn missing_env_file_is_empty() {
        let file = EnvFile::open("/definitely/not/here/.env").unwrap();
        assert!(file.vars.is_empty());
        assert_eq!(file.get("DISCORD_BOT_TOKEN").unwrap(), None);
    }

    #[test]
    fn env_file_is_parsed_without_touching_the_environment() {
        let key = "GATEWAY_BOT_SOURCE_TEST_ONLY_IN_FILE";
        let path = scratch_file("parse", &format!("{}=abc123\nPORT=9000\n", key));

        let file = EnvFile::open(&path).unwrap();

        assert_eq!(file.get(key).unwrap().as_deref(), Some("abc123"));
        assert_eq!(file.get("PORT").unwrap().as_deref(), Some("9000"));
        assert!(env::var(key).is_err());
    }

    #[test]
    fn first_definition_in_env_file_wins() {
        let path = scratch_file("dupes", "TOKEN=first\nTOKEN=second\n");
        let file = EnvFile::open(&path).unwrap();
        assert_eq!(file.get("TOKEN").unwrap().as_deref(), Some("first"));
    }

    #[test]
    fn malformed_env_file_is_an_error() {
        let path = scratch_file("malformed", "THIS LINE IS NOT AN ASSIGNMENT\n");
        assert!(matches!(
            EnvFile::open(&path),
            Err(ConfigError::EnvFile(_, _))
        ));
    }
}
