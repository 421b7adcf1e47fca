//! Settings loading.
//!
//! Sources, later ones winning: built-in defaults, an optional settings file
//! (TOML, YAML or JSON by suffix), inline snippets, then `SOUL__*` environment
//! variables with `__` separating nested keys
//! (`SOUL__ORCHESTRATOR__MAX_RETRIES=5`).

use std::path::{Path, PathBuf};

use agent_core::OrchestratorConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use soulbrowser_event_bus::EventBusConfig;

pub const ENV_PREFIX: &str = "SOUL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    /// Default: "info"
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    /// Default: false
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSettings {
    /// Files `upload_file` is allowed to send.
    pub available_file_paths: Vec<String>,
}

/// Everything the runtime reads at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub orchestrator: OrchestratorConfig,
    pub logging: LoggingSettings,
    pub actions: ActionSettings,
}

impl OrchestratorSettings {
    pub fn event_bus(&self) -> EventBusConfig {
        self.orchestrator.event_bus_config()
    }

    /// Effective settings as YAML, for diagnostics.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Builder over the `config` crate's layered sources.
pub struct SettingsLoader {
    builder: ConfigBuilder<DefaultState>,
    env_prefix: String,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Use a different environment prefix. Mostly for tests.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Add a settings file; a missing file is an error.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Add a settings file when it exists.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    pub fn with_toml_str(mut self, toml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(toml, FileFormat::Toml));
        self
    }

    pub fn load(self) -> Result<OrchestratorSettings, ConfigError> {
        self.builder
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

/// Load settings from `path` (if given and present) plus environment
/// overrides.
pub fn load_settings(path: Option<PathBuf>) -> Result<OrchestratorSettings, ConfigError> {
    let mut loader = SettingsLoader::new();
    if let Some(path) = path {
        loader = loader.with_optional_file(path);
    }
    loader.load()
}
