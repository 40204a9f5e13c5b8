//! Operator configuration
//!
//! Built once at startup from the environment and handed to the controllers
//! and the backup/restore orchestrator.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default directory inside the InfluxDB pod that `influxd backup` writes to
pub const DEFAULT_BACKUP_DIR: &str = "/var/lib/influxdb/backup";

/// Default directory inside the InfluxDB pod that restores are staged in
pub const DEFAULT_RESTORE_DIR: &str = "/var/lib/influxdb/restore";

/// Default metrics port
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default upper bound for a single remote command
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 3600;

const ENV_BACKUP_DIR: &str = "INFLUXDB_OPERATOR_BACKUP_DIR";
const ENV_RESTORE_DIR: &str = "INFLUXDB_OPERATOR_RESTORE_DIR";
const ENV_EXEC_TIMEOUT: &str = "INFLUXDB_OPERATOR_EXEC_TIMEOUT_SECS";
const ENV_METRICS_PORT: &str = "INFLUXDB_OPERATOR_METRICS_PORT";
const ENV_STAGING_DIR: &str = "INFLUXDB_OPERATOR_STAGING_DIR";

/// Operator-wide settings
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Directory inside the pod where backups are written
    pub backup_dir: String,
    /// Directory inside the pod where downloaded backups are placed before restore
    pub restore_dir: String,
    /// Deadline for any single exec session; `None` waits forever
    pub exec_timeout: Option<Duration>,
    /// Port for the metrics/health HTTP server
    pub metrics_port: u16,
    /// Parent directory for local staging directories (system temp dir if unset)
    pub staging_dir: Option<PathBuf>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            backup_dir: DEFAULT_BACKUP_DIR.to_string(),
            restore_dir: DEFAULT_RESTORE_DIR.to_string(),
            exec_timeout: Some(Duration::from_secs(DEFAULT_EXEC_TIMEOUT_SECS)),
            metrics_port: DEFAULT_METRICS_PORT,
            staging_dir: None,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration using an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = non_empty(lookup(ENV_BACKUP_DIR)) {
            config.backup_dir = trim_trailing_slash(&dir);
        }
        if let Some(dir) = non_empty(lookup(ENV_RESTORE_DIR)) {
            config.restore_dir = trim_trailing_slash(&dir);
        }
        if let Some(raw) = non_empty(lookup(ENV_EXEC_TIMEOUT)) {
            let secs: u64 = raw.parse().map_err(|e| {
                Error::config(format!("Invalid {} '{}': {}", ENV_EXEC_TIMEOUT, raw, e))
            })?;
            config.exec_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(raw) = non_empty(lookup(ENV_METRICS_PORT)) {
            config.metrics_port = raw.parse().map_err(|e| {
                Error::config(format!("Invalid {} '{}': {}", ENV_METRICS_PORT, raw, e))
            })?;
        }
        if let Some(dir) = non_empty(lookup(ENV_STAGING_DIR)) {
            config.staging_dir = Some(PathBuf::from(dir));
        }

        if !config.backup_dir.starts_with('/') || !config.restore_dir.starts_with('/') {
            return Err(Error::config(
                "Backup and restore directories must be absolute paths",
            ));
        }

        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn trim_trailing_slash(dir: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = OperatorConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.backup_dir, DEFAULT_BACKUP_DIR);
        assert_eq!(config.restore_dir, DEFAULT_RESTORE_DIR);
        assert_eq!(config.metrics_port, DEFAULT_METRICS_PORT);
        assert_eq!(
            config.exec_timeout,
            Some(Duration::from_secs(DEFAULT_EXEC_TIMEOUT_SECS))
        );
    }

    #[test]
    fn test_overrides_and_zero_timeout() {
        let config = OperatorConfig::from_lookup(lookup_from(&[
            (ENV_BACKUP_DIR, "/data/backup/"),
            (ENV_EXEC_TIMEOUT, "0"),
            (ENV_METRICS_PORT, "9090"),
        ]))
        .unwrap();
        assert_eq!(config.backup_dir, "/data/backup");
        assert_eq!(config.exec_timeout, None);
        assert_eq!(config.metrics_port, 9090);
    }

    #[test]
    fn test_rejects_relative_dirs_and_bad_numbers() {
        assert!(OperatorConfig::from_lookup(lookup_from(&[(ENV_RESTORE_DIR, "restore")])).is_err());
        assert!(OperatorConfig::from_lookup(lookup_from(&[(ENV_METRICS_PORT, "http")])).is_err());
    }
}
