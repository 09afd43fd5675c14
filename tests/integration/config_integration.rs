//! Integration tests for Configuration System

use crate::integration::test_utils::{amount, with_env};
use pinrelay::config::{ConfigLoader, ConfigOverrides, Mode, RunConfig};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_defaults_without_any_source() {
    let temp_dir = TempDir::new().unwrap();
    let config = with_env(&temp_dir, &[], || ConfigLoader::load(temp_dir.path()).unwrap());
    assert_eq!(config, RunConfig::default());
}

#[test]
fn test_workspace_file_is_read() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("pinrelay.toml"),
        r#"
mode = "upload"
target_runway_days = 45
max_top_up = "0.5"
provider = "sp-7"
ledger_endpoint = "https://ledger.example"
storage_endpoint = "https://storage.example"

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = with_env(&temp_dir, &[], || ConfigLoader::load(temp_dir.path()).unwrap());
    assert_eq!(config.mode, Mode::Upload);
    assert_eq!(config.target_runway_days, 45);
    assert_eq!(config.max_top_up, Some(amount("0.5")));
    assert_eq!(config.provider.as_deref(), Some("sp-7"));
    assert_eq!(config.logging.level, "debug");
    assert!(config.validate().is_ok());
}

#[test]
fn test_precedence_global_workspace_env_overrides() {
    let temp_dir = TempDir::new().unwrap();
    let global_dir = temp_dir.path().join("xdg").join("pinrelay");
    std::fs::create_dir_all(&global_dir).unwrap();
    std::fs::write(
        global_dir.join("config.toml"),
        "target_runway_days = 10\nprovider = \"global\"\nwork_dir = \"from-global\"\nchannel_dir = \"global-channel\"\n",
    )
    .unwrap();
    std::fs::write(
        temp_dir.path().join("pinrelay.toml"),
        "target_runway_days = 20\nprovider = \"workspace\"\nwork_dir = \"from-workspace\"\n",
    )
    .unwrap();

    let config = with_env(
        &temp_dir,
        &[
            ("PINRELAY_TARGET_RUNWAY_DAYS", "40"),
            ("PINRELAY_PROVIDER", "env"),
        ],
        || {
            let mut overrides = ConfigOverrides::new();
            overrides.set("provider", "flag");
            ConfigLoader::load_with(temp_dir.path(), &overrides).unwrap()
        },
    );

    assert_eq!(config.channel_dir, PathBuf::from("global-channel"));
    assert_eq!(config.work_dir, PathBuf::from("from-workspace"));
    assert_eq!(config.target_runway_days, 40);
    assert_eq!(config.provider.as_deref(), Some("flag"));
}

#[test]
fn test_env_selects_workspace_variant_file() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("pinrelay.toml"), "mode = \"build\"\n").unwrap();
    std::fs::write(
        temp_dir.path().join("pinrelay.staging.toml"),
        "content_path = \"public\"\n",
    )
    .unwrap();

    let config = with_env(&temp_dir, &[("PINRELAY_ENV", "staging")], || {
        ConfigLoader::load(temp_dir.path()).unwrap()
    });
    assert_eq!(config.mode, Mode::Build);
    assert_eq!(config.content_path, PathBuf::from("public"));
}

#[test]
fn test_nested_env_key_sets_logging() {
    let temp_dir = TempDir::new().unwrap();
    let config = with_env(&temp_dir, &[("PINRELAY_LOGGING__FORMAT", "json")], || {
        ConfigLoader::load(temp_dir.path()).unwrap()
    });
    assert_eq!(config.logging.format, "json");
}

#[test]
fn test_invalid_value_is_a_load_error() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("pinrelay.toml"), "mode = \"deploy\"\n").unwrap();
    let result = with_env(&temp_dir, &[], || ConfigLoader::load(temp_dir.path()));
    assert!(result.is_err());
}

#[test]
fn test_global_config_path_follows_xdg() {
    let temp_dir = TempDir::new().unwrap();
    let path = with_env(&temp_dir, &[], ConfigLoader::global_config_path).unwrap();
    assert_eq!(path, temp_dir.path().join("xdg/pinrelay/config.toml"));
}
