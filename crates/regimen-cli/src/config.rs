//! Configuration file management for regimen.
//!
//! Provides a TOML-based config file at `~/.config/regimen/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use regimen_core::generate::client::{
    DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
};
use regimen_core::generate::{GenerationConfig, ValidationPolicy};
use regimen_core::worker::WorkerConfig;
use regimen_db::config::DbConfig;

pub const API_KEY_ENV: &str = "REGIMEN_API_KEY";
pub const BASE_URL_ENV: &str = "REGIMEN_API_BASE_URL";
pub const MODEL_ENV: &str = "REGIMEN_MODEL";
pub const TIMEOUT_ENV: &str = "REGIMEN_GENERATION_TIMEOUT_SECS";
pub const TEMPERATURE_ENV: &str = "REGIMEN_TEMPERATURE";
pub const MAX_TOKENS_ENV: &str = "REGIMEN_MAX_TOKENS";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub worker: WorkerSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_backoff_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationPolicy>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the regimen config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/regimen` or `~/.config/regimen`,
/// never the platform-specific `dirs::config_dir()`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("regimen");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("regimen")
}

/// Return the path to the regimen config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load the config file at `path`. A missing file is `Ok(None)`; an
/// unreadable or malformed one is an error.
pub fn load_config_from(path: &Path) -> Result<Option<ConfigFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file to `path`, creating parent dirs as
/// needed. Sets file permissions to 0600 on Unix since it may hold an API
/// key.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct RegimenConfig {
    pub db_config: DbConfig,
    /// `None` until a key is configured; only the worker needs one.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub worker: WorkerConfig,
}

impl RegimenConfig {
    /// Resolve from the process environment and the default config file.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file = load_config_from(&config_path())?;
        Self::resolve_with(cli_db_url, file.as_ref(), |key| std::env::var(key).ok())
    }

    /// Resolve using the chain: CLI flag > env var > config file > default.
    ///
    /// `env` looks up an environment variable by name.
    pub fn resolve_with(
        cli_db_url: Option<&str>,
        file: Option<&ConfigFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let db_url = cli_db_url
            .map(str::to_string)
            .or_else(|| env(DbConfig::URL_ENV))
            .or_else(|| file.map(|f| f.database.url.clone()))
            .unwrap_or_else(|| DbConfig::DEFAULT_URL.to_string());

        let generation = file.map(|f| f.generation.clone()).unwrap_or_default();
        let worker = file.map(|f| f.worker.clone()).unwrap_or_default();

        let api_key = env(API_KEY_ENV)
            .or(generation.api_key)
            .filter(|k| !k.trim().is_empty());
        let base_url = env(BASE_URL_ENV)
            .or(generation.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = env(MODEL_ENV)
            .or(generation.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let temperature = parse_env::<f32>(&env, TEMPERATURE_ENV)?
            .or(generation.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE);
        let max_tokens = parse_env::<u32>(&env, MAX_TOKENS_ENV)?
            .or(generation.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let defaults = WorkerConfig::default();
        let timeout = parse_env::<u64>(&env, TIMEOUT_ENV)?
            .or(generation.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.generation_timeout);
        let worker = WorkerConfig {
            poll_interval: worker
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            error_backoff: worker
                .error_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.error_backoff),
            generation_timeout: timeout,
            validation: worker.validation.unwrap_or(defaults.validation),
            recover_on_start: defaults.recover_on_start,
        };

        if !(0.0..=2.0).contains(&temperature) {
            bail!("temperature must be between 0.0 and 2.0, got {temperature}");
        }
        if worker.poll_interval.is_zero()
            || worker.error_backoff.is_zero()
            || worker.generation_timeout.is_zero()
        {
            bail!("poll interval, error backoff and generation timeout must be greater than zero");
        }

        Ok(Self {
            db_config: DbConfig::new(db_url),
            api_key,
            base_url,
            model,
            temperature,
            max_tokens,
            worker,
        })
    }

    /// Settings for the generation client. Fails when no API key is set.
    pub fn generation_config(&self) -> Result<GenerationConfig> {
        let Some(api_key) = self.api_key.clone() else {
            bail!(
                "API key not found; set {API_KEY_ENV} or add generation.api_key to {}",
                config_path().display()
            );
        };
        let mut config = GenerationConfig::new(api_key);
        config.base_url = self.base_url.clone();
        config.model = self.model.clone();
        config.temperature = self.temperature;
        config.max_tokens = self.max_tokens;
        Ok(config)
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value {raw:?} for {key}"))
        })
        .transpose()
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn file() -> ConfigFile {
        ConfigFile {
            database: DatabaseSection {
                url: "postgresql://filehost:5432/filedb".to_string(),
            },
            generation: GenerationSection {
                api_key: Some("file-key".to_string()),
                model: Some("file-model".to_string()),
                timeout_secs: Some(60),
                ..Default::default()
            },
            worker: WorkerSection {
                poll_interval_secs: Some(2),
                error_backoff_secs: None,
                validation: Some(ValidationPolicy::CatalogOnly),
            },
        }
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("regimen").join("config.toml");

        let original = file();
        save_config_to(&path, &original).unwrap();
        let loaded = load_config_from(&path).unwrap().expect("file exists");
        assert_eq!(loaded, original);
    }

    #[cfg(unix)]
    #[test]
    fn save_config_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        save_config_to(&path, &file()).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn missing_config_file_is_none() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(load_config_from(&tmp.path().join("nope.toml")).unwrap().is_none());
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[database\nurl = ").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn minimal_file_only_needs_database_section() {
        let parsed: ConfigFile =
            toml::from_str("[database]\nurl = \"postgresql://h:5432/db\"\n").unwrap();
        assert_eq!(parsed.generation, GenerationSection::default());
        assert_eq!(parsed.worker, WorkerSection::default());
    }

    #[test]
    fn validation_policy_reads_snake_case() {
        let parsed: ConfigFile = toml::from_str(
            "[database]\nurl = \"x\"\n[worker]\nvalidation = \"catalog_only\"\n",
        )
        .unwrap();
        assert_eq!(parsed.worker.validation, Some(ValidationPolicy::CatalogOnly));
    }

    #[test]
    fn cli_flag_overrides_env_and_file() {
        let env = env_from(&[(DbConfig::URL_ENV, "postgresql://env:5432/envdb")]);
        let config =
            RegimenConfig::resolve_with(Some("postgresql://cli:5432/clidb"), Some(&file()), env)
                .unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");
    }

    #[test]
    fn env_overrides_file() {
        let env = env_from(&[
            (DbConfig::URL_ENV, "postgresql://env:5432/envdb"),
            (API_KEY_ENV, "env-key"),
            (MODEL_ENV, "env-model"),
            (TIMEOUT_ENV, "30"),
        ]);
        let config = RegimenConfig::resolve_with(None, Some(&file()), env).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(config.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.model, "env-model");
        assert_eq!(config.worker.generation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn file_overrides_defaults() {
        let config = RegimenConfig::resolve_with(None, Some(&file()), env_from(&[])).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://filehost:5432/filedb");
        assert_eq!(config.api_key.as_deref(), Some("file-key"));
        assert_eq!(config.model, "file-model");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.worker.poll_interval, Duration::from_secs(2));
        assert_eq!(config.worker.error_backoff, Duration::from_secs(10));
        assert_eq!(config.worker.generation_timeout, Duration::from_secs(60));
        assert_eq!(config.worker.validation, ValidationPolicy::CatalogOnly);
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = RegimenConfig::resolve_with(None, None, env_from(&[])).unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert!(config.api_key.is_none());
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.worker, WorkerConfig::default());
    }

    #[test]
    fn generation_config_requires_api_key() {
        let config = RegimenConfig::resolve_with(None, None, env_from(&[])).unwrap();
        let err = config.generation_config().unwrap_err();
        assert!(err.to_string().contains("API key not found"), "{err}");

        let config =
            RegimenConfig::resolve_with(None, None, env_from(&[(API_KEY_ENV, "k")])).unwrap();
        let generation = config.generation_config().unwrap();
        assert_eq!(generation.api_key, "k");
        assert_eq!(generation.model, "gpt-4o-mini");
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let config =
            RegimenConfig::resolve_with(None, None, env_from(&[(API_KEY_ENV, "  ")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn invalid_numeric_env_is_an_error() {
        let err = RegimenConfig::resolve_with(None, None, env_from(&[(MAX_TOKENS_ENV, "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains(MAX_TOKENS_ENV), "{err}");
    }

    #[test]
    fn out_of_range_temperature_is_an_error() {
        let err = RegimenConfig::resolve_with(None, None, env_from(&[(TEMPERATURE_ENV, "3.5")]))
            .unwrap_err();
        assert!(err.to_string().contains("temperature"), "{err}");
    }

    #[test]
    fn zero_error_backoff_in_file_is_an_error() {
        let mut zero = file();
        zero.worker.error_backoff_secs = Some(0);
        let err = RegimenConfig::resolve_with(None, Some(&zero), env_from(&[])).unwrap_err();
        assert!(err.to_string().contains("error backoff"), "{err}");
    }

    #[test]
    fn zero_poll_interval_in_file_is_an_error() {
        let mut zero = file();
        zero.worker.poll_interval_secs = Some(0);
        assert!(RegimenConfig::resolve_with(None, Some(&zero), env_from(&[])).is_err());
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("regimen/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
