//! ---
//! sc_section: "04-configuration"
//! sc_subsection: "module"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "Shared primitives and utilities for the harness runtime."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::logging::LogFormat;

fn default_work_dir() -> PathBuf {
    PathBuf::from("target/syscheck")
}

fn default_test_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    "127.0.0.1:9464"
        .parse()
        .expect("valid default metrics address")
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    "127.0.0.1:7170".parse().expect("valid default api address")
}

fn default_report_history() -> usize {
    32
}

/// Primary configuration object for the syscheck runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub harness: HarnessConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "SYSCHECK_CONFIG";

    /// Load configuration from disk, respecting the `SYSCHECK_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.harness.validate()?;
        self.api.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Settings governing test dispatch and fixture provisioning.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Optional fixture file opened by the file-access subsystem. When unset
    /// a throwaway fixture is provisioned under `work_dir` for every run.
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_test_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub test_timeout: Duration,
    #[serde(default)]
    pub fail_fast: bool,
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.work_dir.as_os_str().is_empty() {
            return Err(anyhow!("harness work_dir cannot be empty"));
        }
        if self.test_timeout.is_zero() {
            return Err(anyhow!("harness test_timeout must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            fixture_path: None,
            work_dir: default_work_dir(),
            test_timeout: default_test_timeout(),
            fail_fast: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
    /// Number of run reports retained for `/api/reports`.
    #[serde(default = "default_report_history")]
    pub report_history: usize,
}

impl ApiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.report_history == 0 {
            return Err(anyhow!("api report_history must be at least 1"));
        }
        Ok(())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
            report_history: default_report_history(),
        }
    }
}

/// Compute the deterministic SHA-256 content hash of the effective config.
pub fn hash_app_config(config: &AppConfig) -> Result<String> {
    let serialised =
        toml::to_string_pretty(config).with_context(|| "failed to serialise configuration")?;
    let mut hasher = Sha256::new();
    hasher.update(serialised.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().expect("default config validates");
        assert!(config.harness.fixture_path.is_none());
        assert_eq!(config.harness.test_timeout, Duration::from_secs(30));
        assert!(config.api.enabled);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: AppConfig = r#"
            [harness]
            fixture_path = "/tmp/fixture.txt"
            test_timeout = 5

            [logging]
            format = "pretty"
        "#
        .parse()
        .expect("partial config parses");
        assert_eq!(
            config.harness.fixture_path.as_deref(),
            Some(Path::new("/tmp/fixture.txt"))
        );
        assert_eq!(config.harness.test_timeout, Duration::from_secs(5));
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.api.report_history, 32);
    }

    #[test]
    fn rejects_zero_timeout() {
        let parsed = "[harness]\ntest_timeout = 0\n".parse::<AppConfig>();
        assert!(parsed.is_err());
    }

    #[test]
    fn rejects_empty_report_history() {
        let parsed = "[api]\nreport_history = 0\n".parse::<AppConfig>();
        assert!(parsed.is_err());
    }

    #[test]
    fn config_hash_tracks_content() {
        let base = AppConfig::default();
        let mut changed = AppConfig::default();
        changed.harness.fail_fast = true;

        let base_hash = hash_app_config(&base).expect("hash base");
        let changed_hash = hash_app_config(&changed).expect("hash changed");
        assert_eq!(base_hash, hash_app_config(&base).expect("hash stable"));
        assert_ne!(base_hash, changed_hash);
    }

    #[test]
    fn load_prefers_first_existing_candidate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("syscheck.toml");
        fs::write(&path, "[harness]\nfail_fast = true\n").expect("write config");

        let missing = dir.path().join("absent.toml");
        let loaded = AppConfig::load_with_source(&[missing, path.clone()]).expect("load");
        assert_eq!(loaded.source, path);
        assert!(loaded.config.harness.fail_fast);
    }
}
