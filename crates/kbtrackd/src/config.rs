//! Daemon configuration loaded from `config.toml`.
//!
//! ```toml
//! sample_retention = 5000
//! connection_timeout_secs = 10
//! device_address = "FC:00:72:C2:AC:AF"
//!
//! [probe_command]
//! program = "/usr/local/bin/kb-battery-probe"
//! args = ["--json"]
//!
//! [tracker]
//! start_threshold = 85
//! stop_threshold = 5
//! ```

use kbtrack_core::{DomainError, TrackerConfig};
use kbtrack_store::DEFAULT_RETENTION;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "KBTRACK_DATA_DIR";

/// Default probe connection timeout.
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;

/// Default interval for `kbtrackd watch`.
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 60;

/// External helper that performs the physical battery read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub tracker: TrackerConfig,
    pub sample_retention: usize,
    pub probe_command: Option<ProbeCommand>,
    pub connection_timeout_secs: u64,
    pub device_address: Option<String>,
    pub watch_interval_secs: u64,
    pub data_dir: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            sample_retention: DEFAULT_RETENTION,
            probe_command: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            device_address: None,
            watch_interval_secs: DEFAULT_WATCH_INTERVAL_SECS,
            data_dir: None,
        }
    }
}

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Invalid(#[from] DomainError),
}

impl DaemonConfig {
    /// Loads the config file at `path`, or the default location when `None`.
    ///
    /// A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        Self::parse(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse { path, source },
            other => other,
        })
    }

    /// Parses and validates TOML text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.tracker.validate()?;
        Ok(config)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs.max(1))
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs.max(1))
    }

    /// Data directory: `--data-dir`, then `KBTRACK_DATA_DIR`, then the config
    /// file, then the platform data directory.
    pub fn data_dir(&self, flag: Option<&Path>) -> PathBuf {
        let env = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
        resolve_data_dir(flag, env, self.data_dir.as_deref())
    }
}

/// `$XDG_CONFIG_HOME/kbtrack/config.toml` or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("kbtrack").join("config.toml"))
}

fn resolve_data_dir(flag: Option<&Path>, env: Option<PathBuf>, configured: Option<&Path>) -> PathBuf {
    if let Some(flag) = flag {
        return flag.to_path_buf();
    }
    if let Some(env) = env.filter(|p| !p.as_os_str().is_empty()) {
        return env;
    }
    if let Some(configured) = configured {
        return configured.to_path_buf();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("kbtrack")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.sample_retention, 5000);
        assert_eq!(config.connection_timeout(), Duration::from_secs(10));
        assert_eq!(config.watch_interval(), Duration::from_secs(60));
        assert!(config.probe_command.is_none());
    }

    #[test]
    fn test_parse_overrides() {
        let config = DaemonConfig::parse(
            r#"
            sample_retention = 200
            device_address = "FC:00:72:C2:AC:AF"

            [probe_command]
            program = "/usr/local/bin/kb-probe"
            args = ["--json"]

            [tracker]
            start_threshold = 90
            "#,
        )
        .unwrap();

        assert_eq!(config.sample_retention, 200);
        assert_eq!(config.device_address.as_deref(), Some("FC:00:72:C2:AC:AF"));
        assert_eq!(config.tracker.start_threshold, 90);
        assert_eq!(config.tracker.stop_threshold, 5);
        let probe = config.probe_command.unwrap();
        assert_eq!(probe.program, PathBuf::from("/usr/local/bin/kb-probe"));
        assert_eq!(probe.args, vec!["--json".to_string()]);
    }

    #[test]
    fn test_parse_rejects_invalid_thresholds() {
        let err = DaemonConfig::parse("[tracker]\nstart_threshold = 4\nstop_threshold = 5\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_parse_rejects_bad_toml() {
        assert!(matches!(
            DaemonConfig::parse("sample_retention = \"lots\""),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn test_data_dir_precedence() {
        let flag = PathBuf::from("/flag");
        let env = PathBuf::from("/env");
        let configured = PathBuf::from("/configured");

        assert_eq!(
            resolve_data_dir(Some(&flag), Some(env.clone()), Some(&configured)),
            flag
        );
        assert_eq!(
            resolve_data_dir(None, Some(env.clone()), Some(&configured)),
            env
        );
        assert_eq!(
            resolve_data_dir(None, Some(PathBuf::new()), Some(&configured)),
            configured
        );
        assert!(resolve_data_dir(None, None, None).ends_with("kbtrack"));
    }
}
