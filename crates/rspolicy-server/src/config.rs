//! Server settings.
//!
//! Sources are layered, later ones winning:
//!
//! ```text
//! ServerConfig::default()  <  YAML file (optional)  <  RSPOLICY_* environment
//! ```
//!
//! Nested keys use `__` in variable names, so
//! `RSPOLICY_CACHES__POLICY__MAXIMUM_SIZE` sets `caches.policy.maximum_size`.
//! The merged result is validated before it is returned.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use rspolicy_domain::cache::{CacheConfig, ExpiryMode};
use rspolicy_domain::validation::SizeLimit;
use serde::{Deserialize, Serialize};

/// Environment variable prefix.
const ENV_PREFIX: &str = "RSPOLICY";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Cache settings
    #[serde(default)]
    pub caches: CachesSettings,

    /// Policy owner settings
    #[serde(default)]
    pub policies: PolicySettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Settings shared by the policy and enforcer caches.
///
/// These settings can be overridden via environment variables with the
/// `RSPOLICY_` prefix and `__` as the nested key separator:
///
/// - `RSPOLICY_CACHES__ASK_TIMEOUT_MS=500`
/// - `RSPOLICY_CACHES__ENFORCER__MAXIMUM_SIZE=5000`
///
/// # Example YAML Configuration
///
/// ```yaml
/// caches:
///   ask_timeout_ms: 5000
///   retry_delay_ms: 100
///   blocking_lookups: 8
///   policy:
///     maximum_size: 20000
///     expire_after_write_secs: 900
///   enforcer:
///     maximum_size: 20000
///     expire_after_access_secs: 600
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CachesSettings {
    /// Timeout of a request to a policy owner, in milliseconds.
    #[serde(default = "default_ask_timeout_ms")]
    pub ask_timeout_ms: u64,

    /// Delay before the single enforcement reload, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Maximum concurrent enforcer builds on the blocking pool.
    #[serde(default = "default_blocking_lookups")]
    pub blocking_lookups: usize,

    /// Raw policy cache.
    #[serde(default)]
    pub policy: CacheSettings,

    /// Enforcer cache.
    #[serde(default)]
    pub enforcer: CacheSettings,
}

impl Default for CachesSettings {
    fn default() -> Self {
        Self {
            ask_timeout_ms: default_ask_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            blocking_lookups: default_blocking_lookups(),
            policy: CacheSettings::default(),
            enforcer: CacheSettings::default(),
        }
    }
}

impl CachesSettings {
    pub fn ask_timeout(&self) -> Duration {
        Duration::from_millis(self.ask_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_ask_timeout_ms() -> u64 {
    5000
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_blocking_lookups() -> usize {
    8
}

/// Size and expiry of one cache.
///
/// At most one of the `expire_after_*` settings may be set. With none set,
/// entries only leave the cache through size eviction or invalidation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    /// Maximum number of entries
    #[serde(default = "default_maximum_size")]
    pub maximum_size: u64,

    /// Expire entries this many seconds after they were written
    #[serde(default)]
    pub expire_after_write_secs: Option<u64>,

    /// Expire entries not read for this many seconds
    #[serde(default)]
    pub expire_after_access_secs: Option<u64>,

    /// Expire entries this many seconds after creation, regardless of updates
    #[serde(default)]
    pub expire_after_create_secs: Option<u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            maximum_size: default_maximum_size(),
            expire_after_write_secs: None,
            expire_after_access_secs: None,
            expire_after_create_secs: None,
        }
    }
}

fn default_maximum_size() -> u64 {
    20_000
}

impl CacheSettings {
    /// The expiry mode selected by these settings.
    ///
    /// Assumes the settings were validated.
    pub fn expiry(&self) -> ExpiryMode {
        let secs = Duration::from_secs;
        match (
            self.expire_after_write_secs,
            self.expire_after_access_secs,
            self.expire_after_create_secs,
        ) {
            (Some(write), _, _) => ExpiryMode::AfterWrite(secs(write)),
            (None, Some(access), _) => ExpiryMode::AfterAccess(secs(access)),
            (None, None, Some(create)) => ExpiryMode::AfterCreate(secs(create)),
            (None, None, None) => ExpiryMode::Never,
        }
    }

    /// Converts into the domain cache configuration.
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .with_maximum_size(self.maximum_size)
            .with_expiry(self.expiry())
    }

    fn validate(&self, section: &str) -> Result<(), ConfigLoadError> {
        let modes = [
            self.expire_after_write_secs,
            self.expire_after_access_secs,
            self.expire_after_create_secs,
        ];
        if modes.iter().flatten().count() > 1 {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "{section}: expire_after_write_secs, expire_after_access_secs and \
                     expire_after_create_secs are mutually exclusive"
                ),
            });
        }
        if modes.iter().flatten().any(|secs| *secs == 0) {
            return Err(ConfigLoadError::Invalid {
                message: format!("{section}: expiry must be greater than 0"),
            });
        }
        if self.maximum_size == 0 {
            return Err(ConfigLoadError::Invalid {
                message: format!("{section}.maximum_size must be greater than 0"),
            });
        }
        Ok(())
    }
}

/// Settings of the per-policy owners.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PolicySettings {
    /// Maximum serialized size of a policy in bytes
    #[serde(default = "default_max_policy_size_bytes")]
    pub max_policy_size_bytes: usize,

    /// Capacity of each owner's command mailbox
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// An owner without commands for this long stops until the next command
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            max_policy_size_bytes: default_max_policy_size_bytes(),
            mailbox_capacity: default_mailbox_capacity(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl PolicySettings {
    pub fn size_limit(&self) -> SizeLimit {
        SizeLimit::new(self.max_policy_size_bytes)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

fn default_max_policy_size_bytes() -> usize {
    100 * 1024
}

fn default_mailbox_capacity() -> usize {
    64
}

fn default_idle_timeout_ms() -> u64 {
    60_000
}

/// Logging settings. `RUST_LOG` overrides `level` at startup.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// One of trace, debug, info, warn, error (case-insensitive)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// One JSON object per line instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Why settings could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Loads `path` on top of the defaults, then applies the environment.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Self::layered(Some(path))
    }

    /// Applies the environment to the defaults.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        Self::layered(None)
    }

    fn layered(file: Option<&Path>) -> Result<Self, ConfigLoadError> {
        let mut builder = Config::builder().add_source(Config::try_from(&ServerConfig::default())?);
        if let Some(file) = file {
            builder = builder.add_source(File::from(file).format(FileFormat::Yaml));
        }
        let merged: ServerConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        merged.validate()?;
        Ok(merged)
    }

    /// Rejects settings the caches and owners cannot run with.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.caches.ask_timeout_ms == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "caches.ask_timeout_ms must be greater than 0".to_string(),
            });
        }
        if self.caches.blocking_lookups == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "caches.blocking_lookups must be greater than 0".to_string(),
            });
        }
        self.caches.policy.validate("caches.policy")?;
        self.caches.enforcer.validate("caches.enforcer")?;

        if self.policies.mailbox_capacity == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "policies.mailbox_capacity must be greater than 0".to_string(),
            });
        }
        if self.policies.idle_timeout_ms == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "policies.idle_timeout_ms must be greater than 0".to_string(),
            });
        }
        if self.policies.max_policy_size_bytes == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "policies.max_policy_size_bytes must be greater than 0".to_string(),
            });
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level '{}' is not one of {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    #[serial]
    fn test_yaml_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
caches:
  ask_timeout_ms: 250
  retry_delay_ms: 20
  blocking_lookups: 2
  policy:
    maximum_size: 100
    expire_after_write_secs: 60
  enforcer:
    maximum_size: 50
    expire_after_create_secs: 30

policies:
  max_policy_size_bytes: 4096
  mailbox_capacity: 8
  idle_timeout_ms: 1500

logging:
  level: debug
  json: true
"#
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();

        assert_eq!(config.caches.ask_timeout(), Duration::from_millis(250));
        assert_eq!(config.caches.retry_delay(), Duration::from_millis(20));
        assert_eq!(config.caches.blocking_lookups, 2);
        assert_eq!(config.caches.policy.maximum_size, 100);
        assert_eq!(
            config.caches.policy.expiry(),
            ExpiryMode::AfterWrite(Duration::from_secs(60))
        );
        assert_eq!(
            config.caches.enforcer.expiry(),
            ExpiryMode::AfterCreate(Duration::from_secs(30))
        );
        assert_eq!(config.policies.size_limit().max_bytes(), 4096);
        assert_eq!(config.policies.mailbox_capacity, 8);
        assert_eq!(config.policies.idle_timeout(), Duration::from_millis(1500));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
caches:
  ask_timeout_ms: 1000
  retry_delay_ms: 50
"#
        )
        .unwrap();

        std::env::set_var("RSPOLICY_CACHES__ASK_TIMEOUT_MS", "500");
        std::env::set_var("RSPOLICY_LOGGING__LEVEL", "warn");

        let config = ServerConfig::load(file.path());

        std::env::remove_var("RSPOLICY_CACHES__ASK_TIMEOUT_MS");
        std::env::remove_var("RSPOLICY_LOGGING__LEVEL");

        let config = config.unwrap();
        assert_eq!(config.caches.ask_timeout_ms, 500); // Overridden by env
        assert_eq!(config.caches.retry_delay_ms, 50); // From file
        assert_eq!(config.logging.level, "warn"); // Overridden by env
    }

    #[test]
    #[serial]
    fn test_environment_only_starts_from_defaults() {
        std::env::set_var("RSPOLICY_CACHES__ENFORCER__MAXIMUM_SIZE", "42");

        let config = ServerConfig::from_env();

        std::env::remove_var("RSPOLICY_CACHES__ENFORCER__MAXIMUM_SIZE");

        let config = config.unwrap();
        assert_eq!(config.caches.enforcer.maximum_size, 42);
        assert_eq!(config.caches.policy.maximum_size, 20_000);
        assert_eq!(config.caches.ask_timeout_ms, 5000);
    }

    #[test]
    fn test_expiry_modes_are_mutually_exclusive() {
        let mut config = ServerConfig::default();
        config.caches.policy.expire_after_write_secs = Some(60);
        config.caches.policy.expire_after_create_secs = Some(60);

        let err = config.validate().unwrap_err();

        assert!(err.to_string().contains("caches.policy"));
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_validation_rejects_zero_values_and_unknown_level() {
        let mut config = ServerConfig::default();
        config.caches.ask_timeout_ms = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("ask_timeout_ms"));

        let mut config = ServerConfig::default();
        config.caches.enforcer.expire_after_access_secs = Some(0);
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("caches.enforcer"));

        let mut config = ServerConfig::default();
        config.policies.mailbox_capacity = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("mailbox_capacity"));

        let mut config = ServerConfig::default();
        config.policies.idle_timeout_ms = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("idle_timeout_ms"));

        let mut config = ServerConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("logging.level"));
    }

    #[test]
    fn test_missing_and_malformed_files_are_reported() {
        let result = ServerConfig::load("/nonexistent/path/config.yaml");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigLoadError::FileNotFound { .. }));
        assert!(err.to_string().contains("not found"));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: syntax: [").unwrap();

        let err = ServerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Load(_)));
    }

    #[test]
    fn test_defaults_pass_validation() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());

        assert_eq!(config.caches.ask_timeout(), Duration::from_secs(5));
        assert_eq!(config.policies.idle_timeout(), Duration::from_secs(60));
        assert_eq!(config.caches.policy.expiry(), ExpiryMode::Never);
        assert_eq!(config.policies.max_policy_size_bytes, 100 * 1024);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_cache_settings_convert_to_cache_config() {
        let settings = CacheSettings {
            maximum_size: 10,
            expire_after_write_secs: None,
            expire_after_access_secs: Some(5),
            expire_after_create_secs: None,
        };

        let config = settings.to_cache_config();

        assert_eq!(config.maximum_size, 10);
        assert_eq!(config.expiry, ExpiryMode::AfterAccess(Duration::from_secs(5)));
    }
}
