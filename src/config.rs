use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use symposium::llm::OpenAiConfig;
use symposium::scheduler::{
    DEFAULT_CONTEXT_LIMIT, DEFAULT_INTERVAL_SECS, MAX_CONSECUTIVE_ERRORS, MAX_INTERVAL_SECS, MAX_SPEAKING_HISTORY,
    MIN_INTERVAL_SECS, SchedulerSettings,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub scheduler: SchedulerConfig,
    pub generation: GenerationConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
    pub default_interval_secs: u64,
    pub default_context_limit: usize,
    pub max_consecutive_errors: u32,
    pub history_capacity: usize,
    pub error_backoff_secs: u64,
    pub paused_wait_secs: u64,
    pub recent_window_secs: u64,
    pub recent_window_threshold: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: MIN_INTERVAL_SECS,
            max_interval_secs: MAX_INTERVAL_SECS,
            default_interval_secs: DEFAULT_INTERVAL_SECS,
            default_context_limit: DEFAULT_CONTEXT_LIMIT,
            max_consecutive_errors: MAX_CONSECUTIVE_ERRORS,
            history_capacity: MAX_SPEAKING_HISTORY,
            error_backoff_secs: 5,
            paused_wait_secs: 3600,
            recent_window_secs: 3600,
            recent_window_threshold: 50,
        }
    }
}

impl SchedulerConfig {
    pub fn to_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            min_interval_secs: self.min_interval_secs,
            max_interval_secs: self.max_interval_secs,
            default_interval_secs: self.default_interval_secs,
            default_context_limit: self.default_context_limit,
            max_consecutive_errors: self.max_consecutive_errors,
            history_capacity: self.history_capacity,
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            paused_wait: Duration::from_secs(self.paused_wait_secs),
            recent_window: Duration::from_secs(self.recent_window_secs),
            recent_window_threshold: self.recent_window_threshold,
            ..SchedulerSettings::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_ms: u64,
    pub stream: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let defaults = OpenAiConfig::default();
        Self {
            base_url: defaults.base_url,
            api_key_env: defaults.api_key_env,
            timeout_ms: 300000,
            stream: false,
        }
    }
}

impl GenerationConfig {
    pub fn to_openai(&self) -> OpenAiConfig {
        OpenAiConfig {
            base_url: self.base_url.clone(),
            api_key_env: self.api_key_env.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            stream: self.stream,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("symposium")
                .join("symposium.db"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            scheduler: SchedulerConfig::default(),
            generation: GenerationConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.scheduler.min_interval_secs, 10);
        assert!(config.storage.database_path.ends_with("symposium/symposium.db"));
        assert_eq!(config.scheduler.to_settings(), SchedulerSettings::default());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("symposium.yml");
        fs::write(
            &path,
            "log_level: debug\nscheduler:\n  min_interval_secs: 2\ngeneration:\n  base_url: http://llm.test/v1\n  stream: true\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.scheduler.min_interval_secs, 2);
        assert_eq!(config.scheduler.default_interval_secs, 30);

        let openai = config.generation.to_openai();
        assert_eq!(openai.base_url, "http://llm.test/v1");
        assert!(openai.stream);
        assert_eq!(openai.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_to_settings() {
        let scheduler = SchedulerConfig {
            error_backoff_secs: 1,
            paused_wait_secs: 60,
            ..Default::default()
        };
        let settings = scheduler.to_settings();
        assert_eq!(settings.error_backoff, Duration::from_secs(1));
        assert_eq!(settings.paused_wait, Duration::from_secs(60));
        assert_eq!(settings.time_scale, 1.0);
    }
}
