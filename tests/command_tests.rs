//! Integration tests for influxd command assembly

use influxdb_operator::orchestrator::command::validate_restore;
use influxdb_operator::orchestrator::{backup_command, restore_command, BackupOptions, RestoreOptions};

// ============================================================================
// Test Helpers
// ============================================================================

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

// ============================================================================
// Backup Command Tests
// ============================================================================

#[test]
fn backup_defaults_to_all_databases() {
    let args = backup_command(&BackupOptions::default(), "/backup/1");
    assert_eq!(args, vec!["influxd", "backup", "-portable", "/backup/1"]);
}

#[test]
fn backup_shard_without_retention_is_dropped() {
    let options = BackupOptions {
        database: "d".to_string(),
        shard: "s".to_string(),
        since: "1h".to_string(),
        ..Default::default()
    };
    let args = backup_command(&options, "/backup/1");

    assert_eq!(flag_value(&args, "-database"), Some("d"));
    assert_eq!(flag_value(&args, "-since"), Some("1h"));
    assert!(!has_flag(&args, "-retention"));
    assert!(!has_flag(&args, "-shard"));
}

#[test]
fn backup_retention_without_database_is_dropped() {
    let options = BackupOptions {
        retention: "autogen".to_string(),
        ..Default::default()
    };
    let args = backup_command(&options, "/backup/1");
    assert!(!has_flag(&args, "-retention"));
}

#[test]
fn backup_explicit_window_wins_over_since() {
    let options = BackupOptions {
        start: "A".to_string(),
        end: "B".to_string(),
        since: "1h".to_string(),
        ..Default::default()
    };
    let args = backup_command(&options, "/backup/1");

    assert_eq!(flag_value(&args, "-start"), Some("A"));
    assert_eq!(flag_value(&args, "-end"), Some("B"));
    assert!(!has_flag(&args, "-since"));
}

#[test]
fn backup_full_selection_in_order() {
    let options = BackupOptions {
        database: "telegraf".to_string(),
        retention: "autogen".to_string(),
        shard: "12".to_string(),
        host: "127.0.0.1:8088".to_string(),
        ..Default::default()
    };
    let args = backup_command(&options, "/backup/1");

    assert_eq!(
        args,
        vec![
            "influxd", "backup", "-portable", "-database", "telegraf", "-retention", "autogen",
            "-shard", "12", "-host", "127.0.0.1:8088", "/backup/1",
        ]
    );
}

// ============================================================================
// Restore Command Tests
// ============================================================================

#[test]
fn restore_all_databases() {
    let args = restore_command(&RestoreOptions::default(), "/restore/1").unwrap();
    assert_eq!(args, vec!["influxd", "restore", "-portable", "/restore/1"]);
}

#[test]
fn restore_into_new_database() {
    let options = RestoreOptions {
        database: "telegraf".to_string(),
        new_database: "telegraf_restored".to_string(),
        ..Default::default()
    };
    let args = restore_command(&options, "/restore/1").unwrap();

    assert_eq!(flag_value(&args, "-db"), Some("telegraf"));
    assert_eq!(flag_value(&args, "-newdb"), Some("telegraf_restored"));
    assert_eq!(args.last().map(String::as_str), Some("/restore/1"));
}

#[test]
fn restore_invalid_combinations_are_rejected() {
    let cases = [
        RestoreOptions {
            new_database: "x".to_string(),
            ..Default::default()
        },
        RestoreOptions {
            rp: "autogen".to_string(),
            ..Default::default()
        },
        RestoreOptions {
            database: "d".to_string(),
            new_rp: "r".to_string(),
            ..Default::default()
        },
        RestoreOptions {
            database: "d".to_string(),
            shard: "1".to_string(),
            ..Default::default()
        },
    ];

    for options in cases {
        assert!(validate_restore(&options).is_err(), "{:?}", options);
        assert!(restore_command(&options, "/restore/1").is_err());
    }
}
