// SPDX-License-Identifier: Apache-2.0

//! Layered configuration: built-in defaults, an optional TOML file,
//! `TAILMATCH_` environment variables, then command line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;

use crate::init::BoxError;
use crate::init::args::StartArgs;
use crate::tail::config::MonitorConfig;
use crate::tail::matcher::MatchRule;
use crate::tail::watcher::WatchMode;

/// Prefix of the environment variables read into [`FileSettings`]. Sections
/// are separated with `__`, e.g. `TAILMATCH_SYSTEM__BUFFER_SIZE`.
pub const ENV_PREFIX: &str = "TAILMATCH_";

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorSection {
    pub paths: Vec<PathBuf>,
    pub patterns: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatcherSection {
    pub rules: Vec<MatchRule>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PositionSection {
    pub store_path: Option<PathBuf>,
    /// Seconds between snapshots
    pub update_interval: Option<u64>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SystemSection {
    pub buffer_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatcherSection {
    pub mode: Option<WatchMode>,
    pub poll_interval_ms: Option<u64>,
}

/// Settings read from the configuration file and the environment.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileSettings {
    pub monitor: MonitorSection,
    pub matcher: MatcherSection,
    pub position: PositionSection,
    pub system: SystemSection,
    pub watcher: WatcherSection,
}

impl FileSettings {
    /// Merge the TOML file at `config_path`, if any, with environment
    /// variables starting with `env_prefix`. The environment wins.
    pub fn load(config_path: Option<&Path>, env_prefix: &str) -> Result<Self, BoxError> {
        let mut figment = Figment::new();
        if let Some(path) = config_path {
            // Toml::file ignores missing files, an explicit path must exist
            if !path.is_file() {
                return Err(format!("config file not found: {}", path.display()).into());
            }
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed(env_prefix).split("__"));

        figment
            .extract()
            .map_err(|e| format!("failed to parse configuration: {}", e).into())
    }

    /// Apply these settings over the built-in defaults
    pub fn apply(self, config: &mut MonitorConfig) {
        if !self.monitor.paths.is_empty() {
            config.directories = self.monitor.paths;
        }
        if let Some(patterns) = self.monitor.patterns {
            config.patterns = patterns;
        }
        if !self.matcher.rules.is_empty() {
            config.rules = self.matcher.rules;
        }
        if let Some(path) = self.position.store_path {
            config.positions_path = path;
        }
        if let Some(secs) = self.position.update_interval {
            config.snapshot_interval = Duration::from_secs(secs);
        }
        if let Some(size) = self.system.buffer_size {
            config.buffer_size = size;
        }
        if let Some(mode) = self.watcher.mode {
            config.watcher.mode = mode;
        }
        if let Some(ms) = self.watcher.poll_interval_ms {
            config.watcher.poll_interval = Duration::from_millis(ms);
        }
    }
}

/// Apply command line flags, the last and strongest layer
fn apply_args(args: &StartArgs, config: &mut MonitorConfig) {
    if !args.paths.is_empty() {
        config.directories = args.paths.clone();
    }
    if !args.patterns.is_empty() {
        config.patterns = args.patterns.clone();
    }
    if !args.rules.is_empty() {
        config.rules = args.rules.clone();
    }
    if let Some(path) = &args.position_store {
        config.positions_path = path.clone();
    }
    if let Some(secs) = args.position_interval {
        config.snapshot_interval = Duration::from_secs(secs);
    }
    if let Some(size) = args.buffer_size {
        config.buffer_size = size;
    }
    if let Some(mode) = args.watch_mode {
        config.watcher.mode = mode.into();
    }
    if let Some(ms) = args.poll_interval_ms {
        config.watcher.poll_interval = Duration::from_millis(ms);
    }
}

/// Build the validated monitor configuration for `tailmatch start`.
pub fn build_monitor_config(args: &StartArgs) -> Result<MonitorConfig, BoxError> {
    build_with_env_prefix(args, ENV_PREFIX)
}

fn build_with_env_prefix(args: &StartArgs, env_prefix: &str) -> Result<MonitorConfig, BoxError> {
    let mut config = MonitorConfig::default();
    FileSettings::load(args.config.as_deref(), env_prefix)?.apply(&mut config);
    apply_args(args, &mut config);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    // Restores the environment on drop. Each test uses its own prefix so
    // tests running in parallel never see each other's variables.
    struct EnvManager {
        original_vars: HashMap<String, Option<String>>,
    }

    impl EnvManager {
        fn new() -> Self {
            Self {
                original_vars: HashMap::new(),
            }
        }

        fn set_var(&mut self, key: &str, value: &str) {
            if !self.original_vars.contains_key(key) {
                self.original_vars
                    .insert(key.to_string(), env::var(key).ok());
            }
            unsafe { env::set_var(key, value) };
        }
    }

    impl Drop for EnvManager {
        fn drop(&mut self) {
            for (key, value) in &self.original_vars {
                match value {
                    Some(v) => unsafe { env::set_var(key, v) },
                    None => unsafe { env::remove_var(key) },
                }
            }
        }
    }

    const TOML: &str = r#"
[monitor]
paths = ["/var/log/app"]
patterns = ["*.log", "*.out"]

[[matcher.rules]]
pattern = "ERROR"
level = "critical"

[[matcher.rules]]
pattern = "WARN"
level = "warning"

[position]
store_path = "/var/lib/tailmatch/positions.json"
update_interval = 10

[system]
buffer_size = 8192

[watcher]
mode = "poll"
poll_interval_ms = 500
"#;

    fn write_config(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("tailmatch.toml");
        fs::write(&path, TOML).unwrap();
        path
    }

    #[test]
    fn test_defaults_with_flags_only() {
        let args = StartArgs {
            paths: vec![PathBuf::from("/var/log")],
            ..Default::default()
        };
        let config = build_with_env_prefix(&args, "TAILMATCH_TEST_DEFAULTS_").unwrap();

        assert_eq!(config.directories, vec![PathBuf::from("/var/log")]);
        assert_eq!(config.patterns, vec!["*.log"]);
        assert!(config.rules.is_empty());
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.positions_path, PathBuf::from("positions.json"));
        assert_eq!(config.snapshot_interval, Duration::from_secs(5));
        assert_eq!(config.watcher.mode, WatchMode::Auto);
    }

    #[test]
    fn test_file_layer() {
        let dir = TempDir::new().unwrap();
        let args = StartArgs {
            config: Some(write_config(&dir)),
            ..Default::default()
        };
        let config = build_with_env_prefix(&args, "TAILMATCH_TEST_FILE_").unwrap();

        assert_eq!(config.directories, vec![PathBuf::from("/var/log/app")]);
        assert_eq!(config.patterns, vec!["*.log", "*.out"]);
        assert_eq!(
            config.rules,
            vec![
                MatchRule::new("ERROR", "critical"),
                MatchRule::new("WARN", "warning")
            ]
        );
        assert_eq!(
            config.positions_path,
            PathBuf::from("/var/lib/tailmatch/positions.json")
        );
        assert_eq!(config.snapshot_interval, Duration::from_secs(10));
        assert_eq!(config.buffer_size, 8192);
        assert_eq!(config.watcher.mode, WatchMode::Poll);
        assert_eq!(config.watcher.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_env_overrides_file_and_flags_override_env() {
        let dir = TempDir::new().unwrap();
        let mut env_manager = EnvManager::new();
        env_manager.set_var("TAILMATCH_TEST_LAYERS_SYSTEM__BUFFER_SIZE", "1024");
        env_manager.set_var("TAILMATCH_TEST_LAYERS_POSITION__UPDATE_INTERVAL", "30");

        let args = StartArgs {
            config: Some(write_config(&dir)),
            position_interval: Some(2),
            ..Default::default()
        };
        let config = build_with_env_prefix(&args, "TAILMATCH_TEST_LAYERS_").unwrap();

        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.snapshot_interval, Duration::from_secs(2));
        // Untouched file values survive
        assert_eq!(config.watcher.mode, WatchMode::Poll);
    }

    #[test]
    fn test_missing_config_file() {
        let dir = TempDir::new().unwrap();
        let args = StartArgs {
            config: Some(dir.path().join("absent.toml")),
            paths: vec![PathBuf::from("/var/log")],
            ..Default::default()
        };
        let err = build_with_env_prefix(&args, "TAILMATCH_TEST_MISSING_").unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_invalid_env_value() {
        let mut env_manager = EnvManager::new();
        env_manager.set_var("TAILMATCH_TEST_BADENV_SYSTEM__BUFFER_SIZE", "lots");

        let args = StartArgs {
            paths: vec![PathBuf::from("/var/log")],
            ..Default::default()
        };
        let err = build_with_env_prefix(&args, "TAILMATCH_TEST_BADENV_").unwrap_err();
        assert!(err.to_string().contains("failed to parse configuration"));
    }

    #[test]
    fn test_validation_runs_last() {
        let args = StartArgs::default();
        let err = build_with_env_prefix(&args, "TAILMATCH_TEST_EMPTY_").unwrap_err();
        assert!(err.to_string().contains("directory"));
    }
}
