//! `influxd backup` / `influxd restore` argument assembly

use chrono::{DateTime, Utc};

use crate::crd::{InfluxdbBackupSpec, InfluxdbRestoreSpec};
use crate::error::{Error, Result};

/// Format of backup identifiers
pub const BACKUP_ID_FORMAT: &str = "%Y%m%d%H%M%S";

/// Backup identifier for a run started at `at`
pub fn backup_id(at: DateTime<Utc>) -> String {
    at.format(BACKUP_ID_FORMAT).to_string()
}

/// What to back up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupOptions {
    pub database: String,
    pub retention: String,
    pub shard: String,
    pub start: String,
    pub end: String,
    pub since: String,
    pub host: String,
}

impl From<&InfluxdbBackupSpec> for BackupOptions {
    fn from(spec: &InfluxdbBackupSpec) -> Self {
        Self {
            database: spec.database.clone(),
            retention: spec.retention.clone(),
            shard: spec.shard.clone(),
            start: spec.start.clone(),
            end: spec.end.clone(),
            since: spec.since.clone(),
            host: spec.host.clone(),
        }
    }
}

/// What to restore and under which names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    pub database: String,
    pub new_database: String,
    pub rp: String,
    pub new_rp: String,
    pub shard: String,
}

impl From<&InfluxdbRestoreSpec> for RestoreOptions {
    fn from(spec: &InfluxdbRestoreSpec) -> Self {
        Self {
            database: spec.database.clone(),
            new_database: spec.restore_to_database.clone(),
            rp: spec.rp.clone(),
            new_rp: spec.new_rp.clone(),
            shard: spec.shard.clone(),
        }
    }
}

/// Arguments for `influxd backup -portable` writing into `target_dir`
///
/// Retention needs a database and shard needs a retention policy. Explicit
/// start/end bounds take precedence over the relative `since` window.
pub fn backup_command(options: &BackupOptions, target_dir: &str) -> Vec<String> {
    let mut args = vec!["influxd".to_string(), "backup".to_string(), "-portable".to_string()];

    if !options.database.is_empty() {
        push_flag(&mut args, "-database", &options.database);
        if !options.retention.is_empty() {
            push_flag(&mut args, "-retention", &options.retention);
            if !options.shard.is_empty() {
                push_flag(&mut args, "-shard", &options.shard);
            }
        }
    }

    if !options.start.is_empty() || !options.end.is_empty() {
        if !options.start.is_empty() {
            push_flag(&mut args, "-start", &options.start);
        }
        if !options.end.is_empty() {
            push_flag(&mut args, "-end", &options.end);
        }
    } else if !options.since.is_empty() {
        push_flag(&mut args, "-since", &options.since);
    }

    if !options.host.is_empty() {
        push_flag(&mut args, "-host", &options.host);
    }

    args.push(target_dir.to_string());
    args
}

/// Reject flag combinations influxd refuses
pub fn validate_restore(options: &RestoreOptions) -> Result<()> {
    if !options.new_database.is_empty() && options.database.is_empty() {
        return Err(Error::validation("restoreToDatabase requires database"));
    }
    if !options.rp.is_empty() && options.database.is_empty() {
        return Err(Error::validation("rp requires database"));
    }
    if !options.new_rp.is_empty() && options.rp.is_empty() {
        return Err(Error::validation("newRp requires rp"));
    }
    if !options.shard.is_empty() && (options.database.is_empty() || options.rp.is_empty()) {
        return Err(Error::validation("shard requires both database and rp"));
    }
    Ok(())
}

/// Arguments for `influxd restore -portable` reading from `source_dir`
pub fn restore_command(options: &RestoreOptions, source_dir: &str) -> Result<Vec<String>> {
    validate_restore(options)?;

    let mut args = vec!["influxd".to_string(), "restore".to_string(), "-portable".to_string()];
    let flags = [
        ("-db", &options.database),
        ("-newdb", &options.new_database),
        ("-rp", &options.rp),
        ("-newrp", &options.new_rp),
        ("-shard", &options.shard),
    ];
    for (flag, value) in flags {
        if !value.is_empty() {
            push_flag(&mut args, flag, value);
        }
    }

    args.push(source_dir.to_string());
    Ok(args)
}

fn push_flag(args: &mut Vec<String>, flag: &str, value: &str) {
    args.push(flag.to_string());
    args.push(value.to_string());
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_backup_id_format() {
        let at = Utc.with_ymd_and_hms(2018, 1, 5, 11, 11, 11).unwrap();
        assert_eq!(backup_id(at), "20180105111111");
    }

    #[test]
    fn test_restore_flags_in_order() {
        let options = RestoreOptions {
            database: "telegraf".to_string(),
            new_database: "telegraf_copy".to_string(),
            rp: "autogen".to_string(),
            new_rp: "restored".to_string(),
            shard: "12".to_string(),
        };
        assert_eq!(
            restore_command(&options, "/var/lib/influxdb/restore/T1").unwrap(),
            vec![
                "influxd", "restore", "-portable", "-db", "telegraf", "-newdb", "telegraf_copy",
                "-rp", "autogen", "-newrp", "restored", "-shard", "12",
                "/var/lib/influxdb/restore/T1",
            ]
        );
    }

    #[test]
    fn test_restore_everything() {
        assert_eq!(
            restore_command(&RestoreOptions::default(), "/restore/T1").unwrap(),
            vec!["influxd", "restore", "-portable", "/restore/T1"]
        );
    }
}
