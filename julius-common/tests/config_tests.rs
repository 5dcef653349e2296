//! Unit tests for configuration and graceful degradation
//!
//! Covers:
//! - Missing TOML files never stop a run (defaults are used)
//! - Output folder priority: CLI → ENV → TOML → compiled default
//! - Atomic TOML writes
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate JULIUS_OUTPUT_DIR or JULIUS_CONFIG are marked with #[serial].

use julius_common::config::{
    default_config_path, ensure_directory_exists, load_toml_config, write_toml_config,
    CompiledDefaults, LoggingConfig, OutputFolderResolver, TomlConfig, CONFIG_PATH_ENV,
    OUTPUT_DIR_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_compiled_defaults() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.output_dir.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");
    assert!(defaults.log_file.is_none());
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("does-not-exist.toml");

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config, TomlConfig::default());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_unparseable_config_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "output_dir = [this is not toml").unwrap();

    let config = load_toml_config(&path).unwrap();
    assert!(config.output_dir.is_none());
}

#[test]
fn test_config_file_fields_are_read() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        "output_dir = \"/tmp/julius-out\"\n\n[logging]\nlevel = \"debug\"\n",
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.output_dir, Some(PathBuf::from("/tmp/julius-out")));
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.log_file.is_none());
}

#[test]
fn test_partial_logging_section_keeps_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[logging]\nlog_file = \"/tmp/julius.log\"\n").unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.log_file, Some(PathBuf::from("/tmp/julius.log")));
}

#[test]
#[serial]
fn test_resolver_cli_takes_precedence() {
    env::set_var(OUTPUT_DIR_ENV, "/tmp/julius-env");
    let toml = TomlConfig {
        output_dir: Some(PathBuf::from("/tmp/julius-toml")),
        logging: LoggingConfig::default(),
    };

    let resolver = OutputFolderResolver::new(Some(PathBuf::from("/tmp/julius-cli")), toml);
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/julius-cli"));

    env::remove_var(OUTPUT_DIR_ENV);
}

#[test]
#[serial]
fn test_resolver_env_beats_toml() {
    env::set_var(OUTPUT_DIR_ENV, "/tmp/julius-env");
    let toml = TomlConfig {
        output_dir: Some(PathBuf::from("/tmp/julius-toml")),
        logging: LoggingConfig::default(),
    };

    let resolver = OutputFolderResolver::new(None, toml);
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/julius-env"));

    env::remove_var(OUTPUT_DIR_ENV);
}

#[test]
#[serial]
fn test_resolver_toml_then_default() {
    env::remove_var(OUTPUT_DIR_ENV);

    let toml = TomlConfig {
        output_dir: Some(PathBuf::from("/tmp/julius-toml")),
        logging: LoggingConfig::default(),
    };
    let resolver = OutputFolderResolver::new(None, toml);
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/julius-toml"));

    let resolver = OutputFolderResolver::new(None, TomlConfig::default());
    assert_eq!(
        resolver.resolve(),
        CompiledDefaults::for_current_platform().output_dir
    );
}

#[test]
#[serial]
fn test_config_path_env_override() {
    env::set_var(CONFIG_PATH_ENV, "/tmp/julius-custom.toml");
    assert_eq!(
        default_config_path(),
        Some(PathBuf::from("/tmp/julius-custom.toml"))
    );
    env::remove_var(CONFIG_PATH_ENV);
}

#[test]
fn test_atomic_write_round_trips_and_cleans_temp() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("nested").join("config.toml");

    let config = TomlConfig {
        output_dir: Some(PathBuf::from("/reports")),
        logging: LoggingConfig {
            level: "warn".to_string(),
            log_file: None,
        },
    };

    write_toml_config(&config, &target).unwrap();

    assert!(target.exists());
    assert!(!temp_dir.path().join("nested").join("config.toml.tmp").exists());

    let loaded = load_toml_config(&target).unwrap();
    assert_eq!(loaded, config);
}

#[cfg(unix)]
#[test]
fn test_atomic_write_sets_owner_only_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");
    write_toml_config(&TomlConfig::default(), &target).unwrap();

    let mode = std::fs::metadata(&target).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_ensure_directory_exists() {
    let temp_dir = TempDir::new().unwrap();
    let out = temp_dir.path().join("a").join("b");

    ensure_directory_exists(&out).unwrap();
    assert!(out.is_dir());
    // Idempotent
    ensure_directory_exists(&out).unwrap();

    let file = temp_dir.path().join("file.txt");
    std::fs::write(&file, "x").unwrap();
    assert!(ensure_directory_exists(&file).is_err());
}
