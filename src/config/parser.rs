//! Configuration and input file loading.
//!
//! This module loads the tool configuration from YAML and the environment,
//! and reads the JSON input files (definitions, ignore lists, usage records).

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::definitions::{Definitions, ResourceSelector};
use crate::error::{ConfigError, Result};

use super::spec::ToolConfig;

/// Environment variable overriding `broker.url`.
pub const ENV_URL: &str = "BROKERDEFS_URL";
/// Environment variable overriding `broker.username`.
pub const ENV_USERNAME: &str = "BROKERDEFS_USERNAME";
/// Environment variable overriding `broker.password`.
pub const ENV_PASSWORD: &str = "BROKERDEFS_PASSWORD";

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["brokerdefs.yaml", "brokerdefs.yml"];

/// Configuration parser for loading tool configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving the `.env` file.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads the configuration: defaults, then the YAML file, then `.env`,
    /// then environment overrides.
    ///
    /// Without an explicit path, the first default file found walking up
    /// from the working directory is used; finding none is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, a file cannot be
    /// parsed, or the result fails validation.
    pub fn load(&self, explicit: Option<&Path>) -> Result<ToolConfig> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(std::env::current_dir()?),
        };

        let mut config = match &path {
            Some(path) => self.load_file(path)?,
            None => {
                debug!("No configuration file found, using defaults");
                ToolConfig::default()
            }
        };

        let env_base = self
            .base_path
            .clone()
            .or_else(|| path.as_deref().and_then(Path::parent).map(Path::to_path_buf));
        Self::load_dotenv(env_base.as_deref())?;

        Self::apply_env_overrides(&mut config, |name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ToolConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = read_file(path)?;
        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ToolConfig> {
        debug!("Parsing YAML configuration");

        if content.trim().is_empty() {
            return Ok(ToolConfig::default());
        }

        serde_yaml::from_str(content).map_err(|e| {
            ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            }
            .into()
        })
    }

    /// Applies environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides(config: &mut ToolConfig, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_URL) {
            debug!("Overriding broker.url from environment");
            config.broker.url = url;
        }

        if let Some(username) = lookup(ENV_USERNAME) {
            debug!("Overriding broker.username from environment");
            config.broker.username = username;
        }

        if let Some(password) = lookup(ENV_PASSWORD) {
            debug!("Overriding broker.password from environment");
            config.broker.password = password;
        }
    }

    /// Loads the .env file in `base` (or the working directory) if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    fn load_dotenv(base: Option<&Path>) -> Result<()> {
        let env_path = base.map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ConfigError::parse(
                    format!("Failed to load .env file: {e}"),
                    env_path.display().to_string(),
                )
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Finds a configuration file in `start_dir` or its parents.
#[must_use]
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start_dir.as_ref().to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Some(config_path);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Loads a definitions snapshot from a JSON file.
///
/// # Errors
///
/// Returns an error if the file is missing or is not a definitions document.
pub fn load_definitions(path: impl AsRef<Path>) -> Result<Definitions> {
    let path = path.as_ref();
    let document: Value = read_json(path)?;
    Definitions::check_sections(&document)?;

    serde_json::from_value(document).map_err(|e| {
        ConfigError::parse(format!("Invalid definitions: {e}"), path.display().to_string()).into()
    })
}

/// Loads an ignore list (a JSON array of selectors).
///
/// # Errors
///
/// Returns an error if the file is missing or malformed.
pub fn load_ignore_list(path: impl AsRef<Path>) -> Result<Vec<ResourceSelector>> {
    read_json(path.as_ref())
}

/// Loads observed usage records (a JSON array of selectors).
///
/// # Errors
///
/// Returns an error if the file is missing or malformed.
pub fn load_usage(path: impl AsRef<Path>) -> Result<Vec<ResourceSelector>> {
    read_json(path.as_ref())
}

fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }

    std::fs::read_to_string(path).map_err(|e| {
        ConfigError::parse(format!("Failed to read file: {e}"), path.display().to_string()).into()
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!("Reading {}", path.display());
    let content = read_file(path)?;

    serde_json::from_str(&content).map_err(|e| {
        ConfigError::parse(format!("JSON parse error: {e}"), path.display().to_string()).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrokerDefsError;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_parse_partial_config() {
        let yaml = r"
broker:
  url: https://rabbit.internal:15671
deploy:
  no_deletions: true
  ignore:
    - vhost: /
      queue: external
";
        let config = ConfigParser::new().parse_yaml(yaml, None).expect("config");

        assert_eq!(config.broker.url, "https://rabbit.internal:15671");
        assert_eq!(config.broker.username, "guest");
        assert_eq!(config.broker.max_retries, 3);
        assert!(config.deploy.no_deletions);
        assert_eq!(config.deploy.ignore[0].queue.as_deref(), Some("external"));
        assert!((config.audit.queue_threshold - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = ConfigParser::new().parse_yaml("  \n", None).expect("config");

        assert_eq!(config, ToolConfig::default());
    }

    #[test]
    fn test_invalid_yaml_reports_location() {
        let err = ConfigParser::new()
            .parse_yaml("broker: [", Some(Path::new("brokerdefs.yaml")))
            .expect_err("invalid");

        assert!(err.to_string().contains("brokerdefs.yaml"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [(ENV_URL, "http://b:15672"), (ENV_PASSWORD, "s3cret")]
            .into_iter()
            .collect();
        let mut config = ToolConfig::default();

        ConfigParser::apply_env_overrides(&mut config, |name| {
            vars.get(name).map(ToString::to_string)
        });

        assert_eq!(config.broker.url, "http://b:15672");
        assert_eq!(config.broker.username, "guest");
        assert_eq!(config.broker.password, "s3cret");
    }

    #[test]
    fn test_explicit_config_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "deploy:\n  stagger_ms: 5\n").expect("write");

        let config = ConfigParser::new()
            .with_base_path(dir.path())
            .load(Some(&path))
            .expect("load");

        assert_eq!(config.deploy.stagger_ms, 5);
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = TempDir::new().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(dir.path().join("brokerdefs.yml"), "").expect("write");

        let found = find_config_file(&nested).expect("found");

        assert_eq!(found, dir.path().join("brokerdefs.yml"));
    }

    #[test]
    fn test_load_definitions() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("definitions.json");
        std::fs::write(&path, r#"{"vhosts":[{"name":"/"}],"rabbit_version":"3.13.0"}"#)
            .expect("write");

        let definitions = load_definitions(&path).expect("definitions");

        assert_eq!(definitions.vhosts.len(), 1);
        assert!(definitions.queues.is_empty());
    }

    #[test]
    fn test_load_definitions_rejects_non_array_section() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("definitions.json");
        std::fs::write(&path, r#"{"exchanges":{"name":"ex1"}}"#).expect("write");

        let err = load_definitions(&path).expect_err("invalid section");

        assert!(err.to_string().contains("'exchanges' is not an array"));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = TempDir::new().expect("tempdir");
        let missing = load_usage(dir.path().join("nope.json")).expect_err("missing");
        assert!(matches!(
            missing,
            BrokerDefsError::Config(ConfigError::FileNotFound { .. })
        ));

        let path = dir.path().join("ignore.json");
        std::fs::write(&path, r#"[{"queue":"q"}]"#).expect("write");
        let malformed = load_ignore_list(&path).expect_err("no vhost");
        assert!(matches!(
            malformed,
            BrokerDefsError::Config(ConfigError::ParseError { .. })
        ));
    }
}
