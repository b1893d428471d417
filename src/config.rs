/// ExerciserConfig: what to run and against which backend
///
/// Values come from an optional JSON file named by `EXERCISER_CONFIG`, then
/// from environment variables, which win over the file.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::{GatewayError, Result};
use crate::gateway::StorageGateway;
use crate::memory::InMemoryGateway;
use crate::scenario::ScenarioSettings;

pub const CONFIG_FILE_VAR: &str = "EXERCISER_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Process-local gateway, no account needed
    #[default]
    Memory,
    /// A real storage account or the local emulator
    Azure,
}

impl std::str::FromStr for Backend {
    type Err = GatewayError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "azure" => Ok(Backend::Azure),
            other => Err(GatewayError::ConfigError(format!(
                "unknown backend {other}, expected memory or azure"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExerciserConfig {
    pub backend: Backend,
    pub connection_string: Option<String>,
    pub use_emulator: bool,
    pub block_size: usize,
    pub copy_poll_interval_ms: u64,
    pub copy_timeout_ms: u64,
    /// Scenario allow-list; empty runs the whole catalog
    pub scenarios: Vec<String>,
    pub report_path: Option<PathBuf>,
}

impl Default for ExerciserConfig {
    fn default() -> Self {
        let settings = ScenarioSettings::default();
        Self {
            backend: Backend::Memory,
            connection_string: None,
            use_emulator: false,
            block_size: settings.block_size,
            copy_poll_interval_ms: settings.copy_poll_interval.as_millis() as u64,
            copy_timeout_ms: settings.copy_timeout.as_millis() as u64,
            scenarios: Vec::new(),
            report_path: None,
        }
    }
}

impl ExerciserConfig {
    /// Loads the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads the configuration through `lookup`, which stands in for the
    /// environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup(CONFIG_FILE_VAR) {
            Some(path) => {
                info!("Reading configuration from {}", path);
                let raw = std::fs::read_to_string(&path)?;
                serde_json::from_str(&raw)?
            }
            None => Self::default(),
        };

        if let Some(value) = lookup("AZURE_STORAGE_CONNECTION_STRING") {
            config.connection_string = Some(value);
        }
        if let Some(value) = lookup("AZURE_STORAGE_USE_EMULATOR") {
            config.use_emulator = parse_flag("AZURE_STORAGE_USE_EMULATOR", &value)?;
        }
        match lookup("EXERCISER_BACKEND") {
            Some(value) => config.backend = value.parse()?,
            // credentials alone are enough to pick the real service
            None if config.connection_string.is_some() || config.use_emulator => {
                config.backend = Backend::Azure
            }
            None => {}
        }
        if let Some(value) = lookup("EXERCISER_BLOCK_SIZE") {
            config.block_size = parse_number("EXERCISER_BLOCK_SIZE", &value)?;
        }
        if let Some(value) = lookup("EXERCISER_COPY_POLL_INTERVAL_MS") {
            config.copy_poll_interval_ms = parse_number("EXERCISER_COPY_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("EXERCISER_COPY_TIMEOUT_MS") {
            config.copy_timeout_ms = parse_number("EXERCISER_COPY_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("EXERCISER_SCENARIOS") {
            config.scenarios = value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup("EXERCISER_REPORT_JSON") {
            config.report_path = Some(PathBuf::from(value));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(GatewayError::ConfigError("block size must be positive".to_string()));
        }
        if self.copy_poll_interval_ms == 0 {
            return Err(GatewayError::ConfigError(
                "copy poll interval must be positive".to_string(),
            ));
        }
        if self.copy_timeout_ms < self.copy_poll_interval_ms {
            return Err(GatewayError::ConfigError(format!(
                "copy timeout {}ms is shorter than the poll interval {}ms",
                self.copy_timeout_ms, self.copy_poll_interval_ms
            )));
        }
        if self.backend == Backend::Azure && self.connection_string.is_none() && !self.use_emulator {
            return Err(GatewayError::ConfigError(
                "azure backend needs AZURE_STORAGE_CONNECTION_STRING or AZURE_STORAGE_USE_EMULATOR".to_string(),
            ));
        }
        Ok(())
    }

    pub fn settings(&self) -> ScenarioSettings {
        ScenarioSettings {
            block_size: self.block_size,
            copy_poll_interval: Duration::from_millis(self.copy_poll_interval_ms),
            copy_timeout: Duration::from_millis(self.copy_timeout_ms),
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => Err(GatewayError::ConfigError(format!("{key}: {other} is not a boolean"))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GatewayError::ConfigError(format!("{key}: {value} is not a number")))
}

/// Builds the gateway the configuration asks for
pub fn connect(config: &ExerciserConfig) -> Result<Arc<dyn StorageGateway>> {
    match config.backend {
        Backend::Memory => {
            info!("Using the in-memory gateway");
            Ok(Arc::new(InMemoryGateway::new()))
        }
        #[cfg(feature = "azure")]
        Backend::Azure => Ok(Arc::new(crate::azure::AzureGateway::from_config(config)?)),
        #[cfg(not(feature = "azure"))]
        Backend::Azure => Err(GatewayError::ConfigError(
            "this build has no azure support, rebuild with --features azure".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ExerciserConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.settings(), ScenarioSettings::default());
        assert!(config.scenarios.is_empty());
    }

    #[test]
    fn test_environment_overrides() {
        let config = ExerciserConfig::from_lookup(lookup_from(&[
            ("EXERCISER_BLOCK_SIZE", "4096"),
            ("EXERCISER_COPY_POLL_INTERVAL_MS", "10"),
            ("EXERCISER_COPY_TIMEOUT_MS", "50"),
            ("EXERCISER_SCENARIOS", "container_acl, blob_copy,"),
            ("EXERCISER_REPORT_JSON", "run.json"),
        ]))
        .unwrap();

        assert_eq!(config.block_size, 4096);
        assert_eq!(config.settings().copy_timeout, Duration::from_millis(50));
        assert_eq!(config.scenarios, vec!["container_acl", "blob_copy"]);
        assert_eq!(config.report_path, Some(PathBuf::from("run.json")));
    }

    #[test]
    fn test_connection_string_selects_azure() {
        let config = ExerciserConfig::from_lookup(lookup_from(&[(
            "AZURE_STORAGE_CONNECTION_STRING",
            "AccountName=acct;AccountKey=a2V5",
        )]))
        .unwrap();
        assert_eq!(config.backend, Backend::Azure);

        let forced = ExerciserConfig::from_lookup(lookup_from(&[
            ("AZURE_STORAGE_CONNECTION_STRING", "AccountName=acct;AccountKey=a2V5"),
            ("EXERCISER_BACKEND", "memory"),
        ]))
        .unwrap();
        assert_eq!(forced.backend, Backend::Memory);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for pairs in [
            vec![("EXERCISER_BLOCK_SIZE", "big")],
            vec![("EXERCISER_BLOCK_SIZE", "0")],
            vec![("EXERCISER_COPY_TIMEOUT_MS", "5"), ("EXERCISER_COPY_POLL_INTERVAL_MS", "10")],
            vec![("EXERCISER_BACKEND", "s3")],
            vec![("EXERCISER_BACKEND", "azure")],
            vec![("AZURE_STORAGE_USE_EMULATOR", "maybe")],
        ] {
            let result = ExerciserConfig::from_lookup(lookup_from(&pairs));
            assert!(matches!(result, Err(GatewayError::ConfigError(_))), "{:?}", pairs);
        }
    }

    #[test]
    fn test_config_file_is_overridden_by_environment() {
        let path = env::temp_dir().join(format!("exerciser-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"block_size": 2048, "scenarios": ["blob_copy"]}"#).unwrap();
        let path_str = path.to_string_lossy().to_string();

        let config = ExerciserConfig::from_lookup(lookup_from(&[
            (CONFIG_FILE_VAR, path_str.as_str()),
            ("EXERCISER_SCENARIOS", "container_acl"),
        ]))
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.block_size, 2048);
        assert_eq!(config.scenarios, vec!["container_acl"]);
        assert_eq!(config.copy_timeout_ms, 30_000);
    }

    #[test]
    fn test_connect_memory() {
        let gateway = connect(&ExerciserConfig::default()).unwrap();
        let properties = tokio_test::block_on(gateway.get_service_properties()).unwrap();
        assert!(properties.cors.is_empty());
    }
}
