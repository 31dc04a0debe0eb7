use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use envsync_core::{DeclaredConfiguration, TargetId};
use envsync_reconcile::{DesiredTarget, ReconcileConfig};
use envsync_remote_memory::RemoteOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local snapshot standing in for the remote configurations.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            logging: LoggingConfig::default(),
            reconcile: ReconcileConfig::default(),
            remote: RemoteConfig::default(),
            targets: Vec::new(),
        }
    }
}

fn default_state_file() -> PathBuf {
    PathBuf::from("envsync-state.json")
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        if self.state_file.as_os_str().is_empty() {
            return Err("state_file must not be empty".into());
        }
        self.reconcile.validate()?;

        let mut ids = BTreeSet::new();
        for target in &self.targets {
            if target.id.trim().is_empty() {
                return Err("targets[].id must not be empty".into());
            }
            if !ids.insert(target.id.as_str()) {
                return Err(format!("target '{}' is declared more than once", target.id));
            }
            let mut keys = BTreeSet::new();
            for var in &target.variables {
                if var.key.is_empty() {
                    return Err(format!("target '{}' has a variable with an empty key", target.id));
                }
                if !keys.insert(var.key.as_str()) {
                    return Err(format!("target '{}' declares key '{}' more than once", target.id, var.key));
                }
            }
        }
        Ok(())
    }

    /// Ledger file kept next to the state file.
    pub fn ledger_file(&self) -> PathBuf {
        ledger_path(&self.state_file)
    }

    pub fn target(&self, id: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.id == id)
    }

    /// Desired state of every configured target.
    pub fn desired_targets(&self) -> Result<Vec<DesiredTarget>, String> {
        self.targets.iter().map(TargetConfig::desired).collect()
    }
}

pub fn ledger_path(state_file: &Path) -> PathBuf {
    state_file.with_extension("ledger.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Behaviour of the local remote backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Simulated update duration; writes inside it conflict.
    #[serde(default)]
    pub update_latency_ms: u64,
}

impl RemoteConfig {
    pub fn options(&self) -> RemoteOptions {
        RemoteOptions {
            update_latency: Duration::from_millis(self.update_latency_ms),
            create_missing: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub id: String,
    #[serde(default)]
    pub scope: Option<String>,
    /// The target's own declared configuration; changes move its staleness token.
    #[serde(default)]
    pub declared: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub variables: Vec<VariableConfig>,
}

impl TargetConfig {
    pub fn target_id(&self) -> Result<TargetId, String> {
        TargetId::new(self.id.as_str()).map_err(|e| e.to_string())
    }

    pub fn declared_configuration(&self) -> DeclaredConfiguration {
        let mut declared = DeclaredConfiguration::new();
        for (name, value) in &self.declared {
            declared.insert(name.as_str(), value.clone());
        }
        declared
    }

    pub fn desired(&self) -> Result<DesiredTarget, String> {
        let mut desired = DesiredTarget::new(self.target_id()?, self.declared_configuration());
        for var in &self.variables {
            desired = desired.with_variable(var.key.as_str(), var.value.as_str());
        }
        Ok(desired)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableConfig {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "envsync.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if !pathbuf.exists() {
                    return Err(format!("config file not found: {p}"));
                }
                builder = builder.add_source(File::from(pathbuf));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., ENVSYNC__RECONCILE__FORCE=true
        builder = builder.add_source(
            Environment::with_prefix("ENVSYNC")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, keys: &[&str]) -> TargetConfig {
        TargetConfig {
            id: id.to_string(),
            scope: None,
            declared: BTreeMap::new(),
            variables: keys
                .iter()
                .map(|k| VariableConfig {
                    key: k.to_string(),
                    value: "v".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.ledger_file(), PathBuf::from("envsync-state.ledger.json"));
    }

    #[test]
    fn test_rejects_duplicate_targets_and_keys() {
        let mut cfg = AppConfig::default();
        cfg.targets = vec![target("F", &["A"]), target("F", &["B"])];
        assert!(cfg.validate().unwrap_err().contains("more than once"));

        cfg.targets = vec![target("F", &["A", "A"])];
        assert!(cfg.validate().unwrap_err().contains("key 'A'"));

        cfg.targets = vec![target("F", &[""])];
        assert!(cfg.validate().is_err());

        cfg.targets = vec![target(" ", &["A"])];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let mut cfg = AppConfig::default();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_desired_targets_keep_variable_order() {
        let mut cfg = AppConfig::default();
        cfg.targets = vec![target("F", &["Z", "A", "M"])];

        let desired = cfg.desired_targets().unwrap();
        let keys: Vec<&str> = desired[0].variables.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["Z", "A", "M"]);
    }

    #[test]
    fn test_declared_table_feeds_token() {
        let mut a = target("F", &[]);
        a.declared.insert("memory".into(), serde_json::json!(128));
        let mut b = a.clone();
        b.declared.insert("memory".into(), serde_json::json!(256));

        assert_ne!(
            a.declared_configuration().staleness_token(),
            b.declared_configuration().staleness_token()
        );
    }
}
