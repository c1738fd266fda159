//! Config 单元测试
//!
//! 测试 RON 加载、环境变量覆盖和校验

use std::collections::HashMap;
use std::io::Write;

use crate::util::config::{ConfigError, RuntimeConfig, ENV_LOG, ENV_WORKERS};

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_default_is_valid() {
    let config = RuntimeConfig::default();
    assert!(config.workers >= 1);
    assert_eq!(config.log_level, "info");
    assert!(config.memory_budget.is_none());
    config.validate().unwrap();
}

#[test]
fn test_load_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "(workers: 3, memory_budget: Some(4096))").unwrap();

    let config = RuntimeConfig::load(file.path()).unwrap();
    assert_eq!(config.workers, 3);
    assert_eq!(config.memory_budget, Some(4096));
    assert_eq!(config.guid_capacity, RuntimeConfig::default().guid_capacity);
}

#[test]
fn test_to_ron_loads_back() {
    let mut config = RuntimeConfig::with_workers(5);
    config.idle_timeout_ms = 7;
    let text = config.to_ron().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flowrt.ron");
    std::fs::write(&path, text).unwrap();
    assert_eq!(RuntimeConfig::load(&path).unwrap(), config);
}

#[test]
fn test_load_or_default_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.ron");
    let config = RuntimeConfig::load_or_default(Some(&path)).unwrap();
    assert_eq!(config, RuntimeConfig::default());
    assert_eq!(RuntimeConfig::load_or_default(None).unwrap(), RuntimeConfig::default());
}

#[test]
fn test_load_rejects_garbage() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "(workers: \"many\")").unwrap();
    assert!(matches!(RuntimeConfig::load(file.path()), Err(ConfigError::Parse(_))));
}

#[test]
fn test_load_rejects_zero_workers() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "(workers: 0)").unwrap();
    assert!(matches!(RuntimeConfig::load(file.path()), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_env_overrides() {
    let mut config = RuntimeConfig::with_workers(2);
    config.apply_env_from(env(&[(ENV_WORKERS, " 6 "), (ENV_LOG, "debug")]));
    assert_eq!(config.workers, 6);
    assert_eq!(config.log_level, "debug");
}

#[test]
fn test_env_ignores_unparsable_workers() {
    let mut config = RuntimeConfig::with_workers(2);
    config.apply_env_from(env(&[(ENV_WORKERS, "lots"), (ENV_LOG, "")]));
    assert_eq!(config.workers, 2);
    assert_eq!(config.log_level, "info");
}

#[test]
fn test_validate_log_level() {
    let mut config = RuntimeConfig::default();
    config.log_level = "chatty".into();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_idle_timeout() {
    let mut config = RuntimeConfig::default();
    config.idle_timeout_ms = 25;
    assert_eq!(config.idle_timeout(), std::time::Duration::from_millis(25));
}
